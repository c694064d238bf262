//! Background worker that drains the sync outbox
//!
//! A single task polls due jobs, pushes the latest local state of each
//! calendar and retries failures with exponential backoff. Jobs that keep
//! failing are parked as `failed` until the calendar is edited again.

use chrono::{DateTime, Utc};
use encore_core::{Config, GcalConfig, Store, SyncAction, SyncConfig, SyncJob};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::GoogleCalendarClient;
use crate::error::{GcalError, Result};
use crate::token::{ServiceAccountKey, TokenCache};
use crate::transform::to_google;

/// Handle of a running dispatcher
pub struct DispatcherHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stop after the current batch
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

pub struct Dispatcher {
    store: Store,
    client: GoogleCalendarClient,
    sync: SyncConfig,
    event_duration: chrono::Duration,
}

impl Dispatcher {
    pub fn new(store: Store, client: GoogleCalendarClient, gcal: &GcalConfig, sync: SyncConfig) -> Self {
        Self {
            store,
            client,
            sync,
            event_duration: chrono::Duration::minutes(gcal.event_duration_minutes),
        }
    }

    /// Build the token cache and API client described by `config`.
    pub fn from_config(store: Store, config: &Config) -> Result<Self> {
        let gcal = &config.gcal;
        let key_path = gcal.service_account_path.as_deref().ok_or_else(|| {
            GcalError::Key("gcal.service_account_path is not set".to_string())
        })?;
        let key = ServiceAccountKey::from_file(key_path)?;
        info!("Loaded service account {}", key.client_email);

        let http = GoogleCalendarClient::http_client(gcal.request_timeout_secs)?;
        let tokens = Arc::new(TokenCache::new(store.clone(), key, http.clone(), gcal));
        let client = GoogleCalendarClient::new(http, tokens, &gcal.api_base, &gcal.calendar_id);
        Ok(Self::new(store, client, gcal, config.sync.clone()))
    }

    /// Run the polling loop on its own task.
    pub fn start(self) -> DispatcherHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let interval = Duration::from_secs(self.sync.poll_interval_secs.max(1));

        let handle = tokio::spawn(async move {
            info!("Sync dispatcher started (every {:?})", interval);
            loop {
                match self.process_due().await {
                    Ok(0) => {}
                    Ok(n) => debug!("Processed {} sync jobs", n),
                    Err(e) => error!("Sync poll failed: {}", e),
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.recv() => {
                        info!("Sync dispatcher received shutdown");
                        break;
                    }
                }
            }
            info!("Sync dispatcher stopped");
        });

        DispatcherHandle {
            shutdown_tx,
            handle,
        }
    }

    /// Run every job that is due now; returns how many were attempted.
    pub async fn process_due(&self) -> Result<usize> {
        self.process_due_at(Utc::now()).await
    }

    async fn process_due_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let jobs = self.store.due_sync_jobs(now, self.sync.batch_size)?;
        for job in &jobs {
            self.run_job(job, now).await?;
        }
        Ok(jobs.len())
    }

    async fn run_job(&self, job: &SyncJob, now: DateTime<Utc>) -> Result<()> {
        match self.push(job).await {
            Ok(()) => {
                if self.store.complete_sync_job(job)? {
                    debug!("Sync of calendar #{} complete", job.calendar_id);
                } else {
                    debug!("Calendar #{} changed during sync, keeping newer job", job.calendar_id);
                }
            }
            Err(e) => {
                let attempts = job.attempts + 1;
                let message = e.to_string();
                if e.is_permanent() || attempts >= self.sync.max_attempts {
                    error!(
                        calendar_id = job.calendar_id,
                        attempts,
                        "Giving up on {} sync: {}",
                        job.action,
                        message
                    );
                    self.store.fail_sync_job(job, &message, None)?;
                } else {
                    let retry_at = now + backoff(&self.sync, attempts);
                    warn!(
                        calendar_id = job.calendar_id,
                        attempts,
                        "{} sync failed, retrying at {}: {}",
                        job.action,
                        retry_at,
                        message
                    );
                    self.store.fail_sync_job(job, &message, Some(retry_at))?;
                }
            }
        }
        Ok(())
    }

    async fn push(&self, job: &SyncJob) -> Result<()> {
        match job.action {
            SyncAction::Delete => match job.google_id.as_deref() {
                Some(event_id) => self.client.delete(event_id).await,
                None => {
                    debug!("Calendar #{} was never synced, nothing to delete", job.calendar_id);
                    Ok(())
                }
            },
            SyncAction::Upsert => {
                let Some(aggregate) = self.store.find_calendar_aggregate(job.calendar_id)? else {
                    debug!("Calendar #{} no longer exists, skipping upsert", job.calendar_id);
                    return Ok(());
                };
                let event = to_google(&aggregate, self.event_duration)?;
                let known = aggregate.calendar.google_id.as_deref();
                let event_id = self.client.upsert(known, &event).await?;

                if known != Some(event_id.as_str())
                    && !self.store.set_google_id(job.calendar_id, Some(&event_id))?
                {
                    // Deleted locally while the insert was in flight.
                    self.client.delete(&event_id).await?;
                }
                Ok(())
            }
        }
    }
}

/// `base * 2^(attempts - 1)`, capped at `max_backoff_secs`.
fn backoff(sync: &SyncConfig, attempts: u32) -> chrono::Duration {
    let factor = 2u64.saturating_pow(attempts.saturating_sub(1));
    let secs = sync
        .backoff_base_secs
        .saturating_mul(factor)
        .min(sync.max_backoff_secs)
        .min(u64::from(u32::MAX));
    chrono::Duration::seconds(secs as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::SyncHook;
    use crate::token::tests::{mount_token_endpoint, persist_token, test_key};
    use chrono::NaiveDate;
    use encore_core::store::CALENDAR_PIECES;
    use encore_core::{Calendar, JobStatus, Piece};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EVENTS_PATH: &str = "/calendars/primary/events";

    fn store() -> Store {
        let store = Store::in_memory().unwrap();
        store.register_hook(Arc::new(SyncHook::new())).unwrap();
        store
    }

    async fn dispatcher(store: &Store, server: &MockServer, sync: SyncConfig) -> Dispatcher {
        mount_token_endpoint(server, 1).await;
        let gcal = GcalConfig::default();
        let http = reqwest::Client::new();
        let tokens = TokenCache::new(
            store.clone(),
            test_key(&format!("{}/token", server.uri())),
            http.clone(),
            &gcal,
        );
        let client = GoogleCalendarClient::new(http, Arc::new(tokens), &server.uri(), &gcal.calendar_id);
        Dispatcher::new(store.clone(), client, &gcal, sync)
    }

    fn recital() -> Calendar {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(19, 30, 0)
            .unwrap();
        Calendar::new("Recital", start, "America/Chicago")
    }

    async fn bodies(server: &MockServer, http_method: &str) -> Vec<serde_json::Value> {
        server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.method.as_str() == http_method && r.url.path().starts_with(EVENTS_PATH))
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_sync() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EVENTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "evt1" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("{}/evt1", EVENTS_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "evt1" })))
            .expect(2)
            .mount(&server)
            .await;

        let store = store();
        let dispatcher = dispatcher(&store, &server, SyncConfig::default()).await;

        let calendar = store.create(recital()).unwrap();
        let p1 = store.create(Piece::new("Bach", "Partita No. 2")).unwrap();
        let p2 = store.create(Piece::new("Ravel", "Gaspard de la nuit")).unwrap();
        store.link(&CALENDAR_PIECES, calendar.id, p1.id, Some(1)).unwrap();
        store.link(&CALENDAR_PIECES, calendar.id, p2.id, Some(0)).unwrap();

        assert_eq!(dispatcher.process_due().await.unwrap(), 1);
        let inserted = bodies(&server, "POST").await;
        assert_eq!(
            inserted[0]["description"],
            "Ravel: Gaspard de la nuit\nBach: Partita No. 2"
        );
        assert_eq!(store.get::<Calendar>(calendar.id).unwrap().google_id.as_deref(), Some("evt1"));
        assert!(store.sync_jobs(None).unwrap().is_empty());

        let mut moved = store.get::<Calendar>(calendar.id).unwrap();
        moved.date_time = NaiveDate::from_ymd_opt(2024, 5, 2)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap();
        store.update(calendar.id, moved).unwrap();
        assert_eq!(store.sync_jobs(None).unwrap().len(), 1);

        assert_eq!(dispatcher.process_due().await.unwrap(), 1);
        let updated = bodies(&server, "PUT").await;
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["start"]["dateTime"], "2024-05-02T20:00:00-05:00");

        store.unlink(&CALENDAR_PIECES, calendar.id, p1.id).unwrap();
        dispatcher.process_due().await.unwrap();
        let updated = bodies(&server, "PUT").await;
        assert_eq!(updated[1]["description"], "Ravel: Gaspard de la nuit");
    }

    #[tokio::test]
    async fn test_delete_removes_remote_event() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/evt9", EVENTS_PATH)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = store();
        let dispatcher = dispatcher(&store, &server, SyncConfig::default()).await;
        let calendar = store.create(recital()).unwrap();
        store.set_google_id(calendar.id, Some("evt9")).unwrap();
        store.delete::<Calendar>(calendar.id).unwrap();

        assert_eq!(dispatcher.process_due().await.unwrap(), 1);
        assert!(store.sync_jobs(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoked_token_does_not_fail_the_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EVENTS_PATH))
            .and(header("Authorization", "Bearer ya29.revoked"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(EVENTS_PATH))
            .and(header("Authorization", "Bearer ya29.fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "evt7" })))
            .expect(1)
            .mount(&server)
            .await;

        let store = store();
        persist_token(&store, "ya29.revoked");
        let dispatcher = dispatcher(&store, &server, SyncConfig::default()).await;
        let calendar = store.create(recital()).unwrap();

        assert_eq!(dispatcher.process_due().await.unwrap(), 1);
        assert!(store.sync_jobs(None).unwrap().is_empty());
        assert_eq!(store.get::<Calendar>(calendar.id).unwrap().google_id.as_deref(), Some("evt7"));
    }

    #[tokio::test]
    async fn test_failures_back_off_then_dead_letter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EVENTS_PATH))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let store = store();
        let sync = SyncConfig {
            max_attempts: 2,
            ..Default::default()
        };
        let dispatcher = dispatcher(&store, &server, sync).await;
        let calendar = store.create(recital()).unwrap();

        let now = Utc::now();
        dispatcher.process_due_at(now).await.unwrap();
        let job = store.sync_job_for_calendar(calendar.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert_eq!(dispatcher.process_due_at(now).await.unwrap(), 0);

        dispatcher
            .process_due_at(now + chrono::Duration::hours(1))
            .await
            .unwrap();
        let job = store.sync_job_for_calendar(calendar.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.last_error.unwrap().contains("503"));

        // A local edit revives the dead letter.
        store.update(calendar.id, recital()).unwrap();
        let job = store.sync_job_for_calendar(calendar.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let sync = SyncConfig {
            backoff_base_secs: 10,
            max_backoff_secs: 60,
            ..Default::default()
        };
        assert_eq!(backoff(&sync, 1).num_seconds(), 10);
        assert_eq!(backoff(&sync, 2).num_seconds(), 20);
        assert_eq!(backoff(&sync, 3).num_seconds(), 40);
        assert_eq!(backoff(&sync, 4).num_seconds(), 60);
        assert_eq!(backoff(&sync, 40).num_seconds(), 60);
    }
}
