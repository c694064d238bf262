//! Service-account bearer tokens
//!
//! A token is looked up in memory, then in the `tokens` table, and only
//! requested from Google when both are missing or about to expire.

use chrono::{DateTime, Duration, Utc};
use encore_core::{GcalConfig, Store, StoredToken};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::{GcalError, Result};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_NAME: &str = "google";
/// Tokens this close to expiry count as expired.
const EXPIRY_SKEW_SECS: i64 = 60;
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// The fields of a Google service-account key file we use.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GcalError::Key(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let key: Self = serde_json::from_str(content)
            .map_err(|e| GcalError::Key(format!("invalid key file: {}", e)))?;
        if key.client_email.is_empty() || key.private_key.is_empty() {
            return Err(GcalError::Key(
                "client_email and private_key are required".to_string(),
            ));
        }
        Ok(key)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Lazily refreshed bearer token for the Calendar API.
///
/// Concurrent callers that all find an expired token may each refresh it;
/// the last one written wins.
pub struct TokenCache {
    store: Store,
    key: ServiceAccountKey,
    http: reqwest::Client,
    scope: String,
    token_uri: String,
    cached: RwLock<Option<StoredToken>>,
}

impl TokenCache {
    pub fn new(store: Store, key: ServiceAccountKey, http: reqwest::Client, config: &GcalConfig) -> Self {
        let token_uri = config
            .token_uri
            .clone()
            .unwrap_or_else(|| key.token_uri.clone());
        Self {
            store,
            key,
            http,
            scope: config.scope.clone(),
            token_uri,
            cached: RwLock::new(None),
        }
    }

    /// A bearer token valid for at least another minute.
    pub async fn get_token(&self) -> Result<String> {
        let now = Utc::now();
        let skew = Duration::seconds(EXPIRY_SKEW_SECS);

        if let Some(token) = self.memory() {
            if token.is_fresh(now, skew) {
                return Ok(token.access_token);
            }
        }

        if let Some(token) = self.store.load_token(TOKEN_NAME)? {
            if token.is_fresh(now, skew) {
                debug!("Using persisted token expiring {}", token.expires_at);
                let access_token = token.access_token.clone();
                self.remember(token);
                return Ok(access_token);
            }
        }

        let token = self.refresh(now).await?;
        let access_token = token.access_token.clone();
        self.remember(token);
        Ok(access_token)
    }

    /// Forget the current token so the next [`TokenCache::get_token`] refreshes.
    pub fn invalidate(&self) -> Result<()> {
        if let Ok(mut guard) = self.cached.write() {
            *guard = None;
        }
        if self.store.delete_token(TOKEN_NAME)? {
            debug!("Dropped persisted token");
        }
        Ok(())
    }

    fn memory(&self) -> Option<StoredToken> {
        match self.cached.read() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }

    fn remember(&self, token: StoredToken) {
        if let Ok(mut guard) = self.cached.write() {
            *guard = Some(token);
        }
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| GcalError::Key(format!("invalid private key: {}", e)))?;
        Ok(jsonwebtoken::encode(&header, &claims, &key)?)
    }

    #[instrument(skip(self, now), fields(token_uri = %self.token_uri))]
    async fn refresh(&self, now: DateTime<Utc>) -> Result<StoredToken> {
        let assertion = self.assertion(now)?;

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Token exchange failed: {} - {}", status, body);
            return Err(GcalError::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponse = response.json().await?;
        let token = StoredToken {
            name: TOKEN_NAME.to_string(),
            access_token: body.access_token,
            expires_at: now + Duration::seconds(body.expires_in),
        };
        self.store.save_token(&token)?;
        info!("Obtained service-account token expiring {}", token.expires_at);
        Ok(token)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) const TEST_PRIVATE_KEY: &str = include_str!("testdata/service-account-key.pem");

    pub(crate) fn test_key(token_uri: &str) -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "encore@test-project.iam.gserviceaccount.com".to_string(),
            private_key: TEST_PRIVATE_KEY.to_string(),
            private_key_id: Some("test-key".to_string()),
            token_uri: token_uri.to_string(),
        }
    }

    pub(crate) async fn mount_token_endpoint(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    /// Persist `access_token` as if an earlier run had fetched it.
    pub(crate) fn persist_token(store: &Store, access_token: &str) {
        store
            .save_token(&StoredToken {
                name: TOKEN_NAME.to_string(),
                access_token: access_token.to_string(),
                expires_at: Utc::now() + Duration::minutes(50),
            })
            .unwrap();
    }

    fn cache(store: &Store, server: &MockServer) -> TokenCache {
        let key = test_key(&format!("{}/token", server.uri()));
        TokenCache::new(store.clone(), key, reqwest::Client::new(), &GcalConfig::default())
    }

    #[tokio::test]
    async fn test_second_call_reuses_token() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 1).await;
        let store = Store::in_memory().unwrap();
        let cache = cache(&store, &server);

        assert_eq!(cache.get_token().await.unwrap(), "ya29.fresh");
        assert_eq!(cache.get_token().await.unwrap(), "ya29.fresh");
    }

    #[tokio::test]
    async fn test_persisted_token_survives_restart() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 0).await;
        let store = Store::in_memory().unwrap();
        store
            .save_token(&StoredToken {
                name: TOKEN_NAME.to_string(),
                access_token: "ya29.persisted".to_string(),
                expires_at: Utc::now() + Duration::minutes(30),
            })
            .unwrap();

        let cache = cache(&store, &server);
        assert_eq!(cache.get_token().await.unwrap(), "ya29.persisted");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once_and_persisted() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 1).await;
        let store = Store::in_memory().unwrap();
        store
            .save_token(&StoredToken {
                name: TOKEN_NAME.to_string(),
                access_token: "ya29.stale".to_string(),
                expires_at: Utc::now() + Duration::seconds(30),
            })
            .unwrap();

        let cache = cache(&store, &server);
        let before = Utc::now();
        assert_eq!(cache.get_token().await.unwrap(), "ya29.fresh");

        let saved = store.load_token(TOKEN_NAME).unwrap().unwrap();
        assert_eq!(saved.access_token, "ya29.fresh");
        assert!(saved.expires_at > before + Duration::minutes(59));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 1).await;
        let store = Store::in_memory().unwrap();
        persist_token(&store, "ya29.revoked");

        let cache = cache(&store, &server);
        assert_eq!(cache.get_token().await.unwrap(), "ya29.revoked");

        cache.invalidate().unwrap();
        assert!(store.load_token(TOKEN_NAME).unwrap().is_none());
        assert_eq!(cache.get_token().await.unwrap(), "ya29.fresh");
        assert_eq!(cache.get_token().await.unwrap(), "ya29.fresh");
    }

    #[tokio::test]
    async fn test_rejected_exchange_is_typed_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;
        let store = Store::in_memory().unwrap();

        let err = cache(&store, &server).get_token().await.unwrap_err();
        assert!(matches!(err, GcalError::TokenExchange { status: 400, .. }));
        assert!(store.load_token(TOKEN_NAME).unwrap().is_none());
    }

    #[test]
    fn test_key_file_parsing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            serde_json::json!({
                "type": "service_account",
                "client_email": "encore@test-project.iam.gserviceaccount.com",
                "private_key": TEST_PRIVATE_KEY,
            })
        )
        .unwrap();

        let key = ServiceAccountKey::from_file(file.path()).unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert!(key.private_key_id.is_none());
    }

    #[test]
    fn test_key_without_email_is_rejected() {
        let json = serde_json::json!({ "client_email": "", "private_key": "x" }).to_string();
        assert!(matches!(
            ServiceAccountKey::from_json(&json),
            Err(GcalError::Key(_))
        ));
    }

    #[test]
    fn test_assertion_is_signed_jwt() {
        let store = Store::in_memory().unwrap();
        let cache = TokenCache::new(
            store,
            test_key(DEFAULT_TOKEN_URI),
            reqwest::Client::new(),
            &GcalConfig::default(),
        );
        let jwt = cache.assertion(Utc::now()).unwrap();
        assert_eq!(jwt.split('.').count(), 3);
    }
}
