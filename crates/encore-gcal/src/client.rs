//! Google Calendar v3 events client

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{GcalError, Result};
use crate::token::TokenCache;
use crate::transform::GoogleEvent;

#[derive(Debug, Deserialize)]
struct InsertedEvent {
    id: String,
}

/// Pushes events to one calendar.
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    base_url: String,
    calendar_id: String,
}

impl GoogleCalendarClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenCache>, base_url: &str, calendar_id: &str) -> Self {
        Self {
            http,
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            calendar_id: calendar_id.to_string(),
        }
    }

    /// HTTP client with the configured request timeout.
    pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?)
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(&self.calendar_id)
        )
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), urlencoding::encode(event_id))
    }

    /// Send an authorized request; a rejected token is replaced once and the request repeated.
    async fn send(&self, build: impl Fn(&str) -> reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let token = self.tokens.get_token().await?;
        match check(build(&token).send().await?).await {
            Err(GcalError::Unauthorized(body)) => {
                warn!("Bearer token rejected, fetching a new one: {}", body);
                self.tokens.invalidate()?;
                let token = self.tokens.get_token().await?;
                check(build(&token).send().await?).await
            }
            result => result,
        }
    }

    /// Create the event and return its remote id.
    #[instrument(skip(self, event), fields(summary = %event.summary), level = "info")]
    pub async fn insert(&self, event: &GoogleEvent) -> Result<String> {
        let url = self.events_url();
        let response = self
            .send(|token| self.http.post(&url).bearer_auth(token).json(event))
            .await?;

        let inserted: InsertedEvent = response.json().await?;
        info!("Inserted remote event {}", inserted.id);
        Ok(inserted.id)
    }

    /// Replace an existing event. Fails with [`GcalError::EventGone`] on 404/410.
    #[instrument(skip(self, event), level = "info")]
    pub async fn update(&self, event_id: &str, event: &GoogleEvent) -> Result<()> {
        let url = self.event_url(event_id);
        self.send(|token| self.http.put(&url).bearer_auth(token).json(event))
            .await?;
        debug!("Updated remote event {}", event_id);
        Ok(())
    }

    /// Update `event_id`, inserting a new event when the remote one is gone.
    ///
    /// Returns the id the event now lives under.
    pub async fn upsert(&self, event_id: Option<&str>, event: &GoogleEvent) -> Result<String> {
        match event_id {
            Some(id) => match self.update(id, event).await {
                Ok(()) => Ok(id.to_string()),
                Err(GcalError::EventGone(_)) => {
                    info!("Remote event {} is gone, inserting a new one", id);
                    self.insert(event).await
                }
                Err(e) => Err(e),
            },
            None => self.insert(event).await,
        }
    }

    /// Delete an event; one that is already gone counts as deleted.
    #[instrument(skip(self), level = "info")]
    pub async fn delete(&self, event_id: &str) -> Result<()> {
        let url = self.event_url(event_id);
        match self.send(|token| self.http.delete(&url).bearer_auth(token)).await {
            Ok(_) => {
                info!("Deleted remote event {}", event_id);
                Ok(())
            }
            Err(GcalError::EventGone(_)) => {
                debug!("Remote event {} already gone", event_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 => Err(GcalError::Unauthorized(body)),
        404 | 410 => Err(GcalError::EventGone(body)),
        code => Err(GcalError::Api { status: code, body }),
    }
}
