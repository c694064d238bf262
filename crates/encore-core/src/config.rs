//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. environment variables
//! 2. the `encore.toml` config file
//! 3. defaults
//!
//! `${VAR_NAME}` inside the config file is replaced with the value of the
//! environment variable before parsing.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Main configuration for encore
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP API configuration
    pub api: ApiConfig,

    /// SQLite database configuration
    pub database: DatabaseConfig,

    /// Google Calendar configuration
    pub gcal: GcalConfig,

    /// Outbox dispatcher configuration
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bearer key for the admin routes; admin routes are open when unset
    #[serde(skip_serializing)]
    pub admin_key: Option<String>,

    /// Port for HTTP API server
    pub port: u16,

    /// Allowed CORS origins; permissive when unset
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            admin_key: None,
            port: default_api_port(),
            allowed_origins: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcalConfig {
    /// Whether calendar writes are pushed to Google Calendar
    pub enabled: bool,

    /// Target calendar id
    pub calendar_id: String,

    /// Path to the service-account key file (JSON)
    pub service_account_path: Option<String>,

    /// Base URL of the Calendar v3 API
    pub api_base: String,

    /// Overrides the `token_uri` found in the service-account key
    pub token_uri: Option<String>,

    /// OAuth scope requested for the bearer token
    pub scope: String,

    /// Length of timed events; Google requires an end time
    pub event_duration_minutes: i64,

    /// Timeout for every outbound request
    pub request_timeout_secs: u64,
}

impl Default for GcalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            calendar_id: "primary".to_string(),
            service_account_path: None,
            api_base: "https://www.googleapis.com/calendar/v3".to_string(),
            token_uri: None,
            scope: "https://www.googleapis.com/auth/calendar".to_string(),
            event_duration_minutes: 120,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How often the dispatcher looks for due jobs
    pub poll_interval_secs: u64,

    /// Attempts before a job is parked as failed
    pub max_attempts: u32,

    /// First retry delay; doubles on every further failure
    pub backoff_base_secs: u64,

    /// Upper bound for the retry delay
    pub max_backoff_secs: u64,

    /// Jobs claimed per poll
    pub batch_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_attempts: 8,
            backoff_base_secs: 10,
            max_backoff_secs: 3600,
            batch_size: 20,
        }
    }
}

fn default_api_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "data/encore.db".to_string()
}

impl Config {
    /// Replaces `${VAR_NAME}` with the environment variable's value.
    ///
    /// Unset variables expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();

        Ok(cfg)
    }

    fn from_toml_str(content: &str) -> Result<Self> {
        let expanded_content = Self::expand_env_vars(content);
        toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load from `./encore.toml` when present, otherwise from the environment only.
    pub fn load() -> Result<Self> {
        if Path::new("encore.toml").exists() {
            return Self::from_toml_file("encore.toml");
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Environment variables win over file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("ADMIN_KEY") {
            if !key.is_empty() {
                self.api.admin_key = Some(key);
            }
        }
        if let Ok(port) = std::env::var("API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }
        if let Ok(origins) = std::env::var("API_ALLOWED_ORIGINS") {
            self.api.allowed_origins = Some(
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            self.database.path = path;
        }

        if let Ok(enabled) = std::env::var("GCAL_ENABLED") {
            self.gcal.enabled = enabled.to_lowercase() == "true";
        }
        if let Ok(id) = std::env::var("GCAL_CALENDAR_ID") {
            if !id.is_empty() {
                self.gcal.calendar_id = id;
            }
        }
        if let Ok(path) = std::env::var("GCAL_SERVICE_ACCOUNT") {
            self.gcal.service_account_path = Some(path);
        }

        if let Ok(attempts) = std::env::var("SYNC_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.parse() {
                self.sync.max_attempts = n;
            }
        }
        if let Ok(secs) = std::env::var("SYNC_POLL_INTERVAL_SECS") {
            if let Ok(n) = secs.parse() {
                self.sync.poll_interval_secs = n;
            }
        }

        // An unset `${ADMIN_KEY}` expands to "", which means no key.
        if self.api.admin_key.as_deref().is_some_and(str::is_empty) {
            self.api.admin_key = None;
        }
    }

    /// Checks the settings that would only fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.gcal.enabled && self.gcal.service_account_path.is_none() {
            return Err(Error::Config(
                "gcal.enabled requires gcal.service_account_path (GCAL_SERVICE_ACCOUNT)".to_string(),
            ));
        }
        if self.sync.max_attempts == 0 {
            return Err(Error::Config("sync.max_attempts must be at least 1".to_string()));
        }
        if self.gcal.event_duration_minutes <= 0 {
            return Err(Error::Config(
                "gcal.event_duration_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_api_config_default() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 3000);
        assert!(config.admin_key.is_none());
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.path, "data/encore.db");
    }

    #[test]
    fn test_gcal_config_default() {
        let config = GcalConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.calendar_id, "primary");
        assert_eq!(config.event_duration_minutes, 120);
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("ENCORE_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${ENCORE_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        let result = Config::expand_env_vars("prefix_${ENCORE_NONEXISTENT_VAR}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("ENCORE_TEST_VAR");
        }
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
[gcal]
enabled = true
calendar_id = "concerts@group.calendar.google.com"
service_account_path = "/etc/encore/key.json"

[sync]
max_attempts = 3
"#,
        )
        .unwrap();

        assert!(config.gcal.enabled);
        assert_eq!(config.gcal.calendar_id, "concerts@group.calendar.google.com");
        assert_eq!(config.gcal.scope, "https://www.googleapis.com/auth/calendar");
        assert_eq!(config.sync.max_attempts, 3);
        assert_eq!(config.sync.backoff_base_secs, 10);
        assert_eq!(config.api.port, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npath = \"/tmp/encore-test.db\"").unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert!(config.database.path.ends_with(".db"));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml_str("[api\nport = 1").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_enabled_gcal_requires_key() {
        let mut config = Config::default();
        config.gcal.enabled = true;
        assert!(config.validate().is_err());
    }
}
