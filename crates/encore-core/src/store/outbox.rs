//! Pending remote-sync records
//!
//! One row per calendar. Enqueueing again replaces the action, bumps
//! `revision` and resets the retry state, so a worker that finishes an
//! older revision leaves the newer request in place.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use super::Store;
use crate::{Error, Result};

/// What the dispatcher should do remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Upsert,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    /// Gave up after the configured number of attempts
    Failed,
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                match value.as_str()? {
                    $($text => Ok(Self::$variant),)+
                    other => Err(FromSqlError::Other(
                        format!("unknown {} `{}`", stringify!($ty), other).into(),
                    )),
                }
            }
        }
    };
}

text_enum!(SyncAction { Upsert => "upsert", Delete => "delete" });
text_enum!(JobStatus { Pending => "pending", Failed => "failed" });

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncJob {
    pub id: i64,
    pub calendar_id: i64,
    pub action: SyncAction,
    /// Remote id known when the job was written
    pub google_id: Option<String>,
    pub attempts: u32,
    pub revision: i64,
    pub status: JobStatus,
    pub next_attempt_at: String,
    pub last_error: Option<String>,
    pub updated_at: String,
}

const JOB_COLUMNS: &str = "id, calendar_id, action, google_id, attempts, revision, status, \
                           next_attempt_at, last_error, updated_at";

impl SyncJob {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            calendar_id: row.get("calendar_id")?,
            action: row.get("action")?,
            google_id: row.get("google_id")?,
            attempts: row.get("attempts")?,
            revision: row.get("revision")?,
            status: row.get("status")?,
            next_attempt_at: row.get("next_attempt_at")?,
            last_error: row.get("last_error")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Fixed-width UTC timestamp; sorts the same as text and as time.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Queue a sync for `calendar_id` on `conn`, coalescing with any queued job.
///
/// A queued delete stays a delete. A known remote id is never replaced by
/// `None`.
pub fn enqueue_sync_job(
    conn: &Connection,
    calendar_id: i64,
    action: SyncAction,
    google_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let now = format_timestamp(now);
    conn.execute(
        "INSERT INTO sync_jobs
            (calendar_id, action, google_id, attempts, revision, status, next_attempt_at, updated_at)
         VALUES (?1, ?2, ?3, 0, 1, 'pending', ?4, ?4)
         ON CONFLICT(calendar_id) DO UPDATE SET
            action = CASE WHEN sync_jobs.action = 'delete' THEN 'delete' ELSE excluded.action END,
            google_id = COALESCE(excluded.google_id, sync_jobs.google_id),
            attempts = 0,
            revision = sync_jobs.revision + 1,
            status = 'pending',
            next_attempt_at = excluded.next_attempt_at,
            last_error = NULL,
            updated_at = excluded.updated_at",
        params![calendar_id, action, google_id, now],
    )?;
    debug!("Queued {} sync for calendar #{}", action, calendar_id);
    Ok(())
}

impl Store {
    /// Queue an upsert for one calendar outside of any other write.
    pub fn enqueue_sync(&self, calendar_id: i64) -> Result<SyncJob> {
        self.read(|conn| {
            let google_id: Option<Option<String>> = conn
                .query_row(
                    "SELECT google_id FROM calendars WHERE id = ?1",
                    params![calendar_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(google_id) = google_id else {
                return Err(Error::not_found("calendar", calendar_id));
            };
            enqueue_sync_job(conn, calendar_id, SyncAction::Upsert, google_id.as_deref(), Utc::now())?;
            job_for_calendar(conn, calendar_id)?
                .ok_or_else(|| Error::not_found("sync_job", calendar_id))
        })
    }

    /// Reconciliation pass: queue every calendar and revive dead letters.
    ///
    /// Returns the number of jobs now pending.
    pub fn enqueue_all_calendars(&self) -> Result<usize> {
        self.write(|conn, _| {
            let now = Utc::now();
            let mut stmt = conn.prepare("SELECT id, google_id FROM calendars ORDER BY id")?;
            let calendars = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for (id, google_id) in &calendars {
                enqueue_sync_job(conn, *id, SyncAction::Upsert, google_id.as_deref(), now)?;
            }
            conn.execute(
                "UPDATE sync_jobs SET status = 'pending', attempts = 0, next_attempt_at = ?1, updated_at = ?1
                 WHERE status = 'failed'",
                params![format_timestamp(now)],
            )?;
            let pending: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sync_jobs WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )?;
            info!("Queued resync of {} calendars", calendars.len());
            Ok(pending as usize)
        })
    }

    /// Pending jobs whose retry time has come, oldest first.
    pub fn due_sync_jobs(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<SyncJob>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sync_jobs
                 WHERE status = 'pending' AND next_attempt_at <= ?1
                 ORDER BY next_attempt_at, id LIMIT ?2",
                JOB_COLUMNS
            ))?;
            let jobs = stmt
                .query_map(params![format_timestamp(now), limit], SyncJob::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(jobs)
        })
    }

    /// Every queued job, optionally filtered by status.
    pub fn sync_jobs(&self, status: Option<JobStatus>) -> Result<Vec<SyncJob>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sync_jobs WHERE ?1 IS NULL OR status = ?1 ORDER BY id",
                JOB_COLUMNS
            ))?;
            let jobs = stmt
                .query_map(params![status], SyncJob::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(jobs)
        })
    }

    pub fn sync_job_for_calendar(&self, calendar_id: i64) -> Result<Option<SyncJob>> {
        self.read(|conn| job_for_calendar(conn, calendar_id))
    }

    /// Remove a finished job unless it was re-queued meanwhile.
    ///
    /// Returns `false` when a newer revision is waiting.
    pub fn complete_sync_job(&self, job: &SyncJob) -> Result<bool> {
        self.read(|conn| {
            let removed = conn.execute(
                "DELETE FROM sync_jobs WHERE id = ?1 AND revision = ?2",
                params![job.id, job.revision],
            )?;
            Ok(removed > 0)
        })
    }

    /// Record a failed attempt. `retry_at = None` parks the job as failed.
    ///
    /// Returns `false` when a newer revision replaced the job meanwhile.
    pub fn fail_sync_job(&self, job: &SyncJob, error: &str, retry_at: Option<DateTime<Utc>>) -> Result<bool> {
        self.read(|conn| {
            let now = format_timestamp(Utc::now());
            let (status, next) = match retry_at {
                Some(at) => (JobStatus::Pending, format_timestamp(at)),
                None => (JobStatus::Failed, job.next_attempt_at.clone()),
            };
            let updated = conn.execute(
                "UPDATE sync_jobs
                 SET attempts = attempts + 1, status = ?3, next_attempt_at = ?4,
                     last_error = ?5, updated_at = ?6
                 WHERE id = ?1 AND revision = ?2",
                params![job.id, job.revision, status, next, error, now],
            )?;
            Ok(updated > 0)
        })
    }
}

fn job_for_calendar(conn: &Connection, calendar_id: i64) -> Result<Option<SyncJob>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM sync_jobs WHERE calendar_id = ?1", JOB_COLUMNS),
            params![calendar_id],
            SyncJob::from_row,
        )
        .optional()?)
}
