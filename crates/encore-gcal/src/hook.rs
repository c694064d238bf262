//! Queues remote syncs from local writes
//!
//! Runs inside the store's write transaction and only writes `sync_jobs`
//! rows; the dispatcher does the network work later.

use chrono::Utc;
use encore_core::store::{
    CALENDAR_COLLABORATORS, CALENDAR_PIECES, calendars_linked_to, enqueue_sync_job,
};
use encore_core::{Change, EntityKind, RecordKey, SyncAction, WriteHook, WriteOp};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

#[derive(Debug, Default)]
pub struct SyncHook;

impl SyncHook {
    pub fn new() -> Self {
        Self
    }
}

fn google_id(conn: &Connection, calendar_id: i64) -> encore_core::Result<Option<String>> {
    let id: Option<Option<String>> = conn
        .query_row(
            "SELECT google_id FROM calendars WHERE id = ?1",
            params![calendar_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id.flatten())
}

fn queue_upsert(conn: &Connection, calendar_id: i64) -> encore_core::Result<()> {
    let google_id = google_id(conn, calendar_id)?;
    enqueue_sync_job(conn, calendar_id, SyncAction::Upsert, google_id.as_deref(), Utc::now())
}

/// Queue every calendar that shows `child` through a join table.
fn queue_linked(conn: &Connection, change: &Change, child: i64) -> encore_core::Result<()> {
    let table = match change.kind {
        EntityKind::Piece => &CALENDAR_PIECES,
        EntityKind::Collaborator => &CALENDAR_COLLABORATORS,
        _ => return Ok(()),
    };
    let calendars = calendars_linked_to(conn, table, child)?;
    debug!("{} touches {} calendars", change, calendars.len());
    for calendar_id in calendars {
        queue_upsert(conn, calendar_id)?;
    }
    Ok(())
}

impl WriteHook for SyncHook {
    fn name(&self) -> &'static str {
        "gcal-sync"
    }

    fn before_delete(&self, conn: &Connection, change: &Change) -> encore_core::Result<()> {
        match (change.kind, change.key) {
            // The remote id is gone with the row, so capture it now.
            (EntityKind::Calendar, RecordKey::Id(id)) => {
                let google_id = google_id(conn, id)?;
                enqueue_sync_job(conn, id, SyncAction::Delete, google_id.as_deref(), Utc::now())
            }
            // Join rows cascade away without hooks.
            (EntityKind::Piece | EntityKind::Collaborator, RecordKey::Id(id)) => {
                queue_linked(conn, change, id)
            }
            _ => Ok(()),
        }
    }

    fn after_write(&self, conn: &Connection, change: &Change) -> encore_core::Result<()> {
        match (change.kind, change.op, change.key) {
            (EntityKind::Calendar, WriteOp::Create | WriteOp::Update, RecordKey::Id(id)) => {
                queue_upsert(conn, id)
            }
            (
                EntityKind::CalendarPiece | EntityKind::CalendarCollaborator,
                _,
                RecordKey::Link(calendar_id, _),
            ) => queue_upsert(conn, calendar_id),
            (
                EntityKind::Piece | EntityKind::Collaborator,
                WriteOp::Update,
                RecordKey::Id(id),
            ) => queue_linked(conn, change, id),
            _ => Ok(()),
        }
    }
}
