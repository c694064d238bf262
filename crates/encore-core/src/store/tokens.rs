//! Persisted bearer tokens

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Store, format_timestamp};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub name: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    /// True while the token stays valid for at least `skew` more.
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: chrono::Duration) -> bool {
        self.expires_at - skew > now
    }
}

impl Store {
    pub fn load_token(&self, name: &str) -> Result<Option<StoredToken>> {
        self.read(|conn| {
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT access_token, expires_at FROM tokens WHERE name = ?1",
                    params![name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((access_token, expires_at)) = row else {
                return Ok(None);
            };
            let expires_at = DateTime::parse_from_rfc3339(&expires_at)
                .map_err(|e| Error::Config(format!("bad expiry for token `{}`: {}", name, e)))?
                .with_timezone(&Utc);
            Ok(Some(StoredToken {
                name: name.to_string(),
                access_token,
                expires_at,
            }))
        })
    }

    /// Insert or replace the token row named `token.name`.
    pub fn save_token(&self, token: &StoredToken) -> Result<()> {
        self.read(|conn| {
            conn.execute(
                "INSERT INTO tokens (name, access_token, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                    access_token = excluded.access_token,
                    expires_at = excluded.expires_at",
                params![token.name, token.access_token, format_timestamp(token.expires_at)],
            )?;
            debug!("Saved token `{}` expiring {}", token.name, token.expires_at);
            Ok(())
        })
    }

    /// Drop the token row; returns `false` when there was none.
    pub fn delete_token(&self, name: &str) -> Result<bool> {
        self.read(|conn| {
            let deleted = conn.execute("DELETE FROM tokens WHERE name = ?1", params![name])?;
            Ok(deleted > 0)
        })
    }
}
