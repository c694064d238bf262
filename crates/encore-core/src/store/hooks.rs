//! Post-write callbacks
//!
//! The store calls every registered [`WriteHook`] inside the transaction of
//! the write that triggered it. A hook error rolls the write back, so hooks
//! must only touch the local database.

use rusqlite::Connection;
use std::fmt;

use super::EntityKind;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Identity of the written row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKey {
    Id(i64),
    /// Join row: (parent id, child id)
    Link(i64, i64),
}

/// A single row mutation as seen by hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub kind: EntityKind,
    pub op: WriteOp,
    pub key: RecordKey,
}

impl Change {
    pub fn record(kind: EntityKind, op: WriteOp, id: i64) -> Self {
        Self {
            kind,
            op,
            key: RecordKey::Id(id),
        }
    }

    pub fn link(kind: EntityKind, op: WriteOp, parent: i64, child: i64) -> Self {
        Self {
            kind,
            op,
            key: RecordKey::Link(parent, child),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key {
            RecordKey::Id(id) => write!(f, "{} {}#{}", self.op, self.kind, id),
            RecordKey::Link(parent, child) => {
                write!(f, "{} {}#{}:{}", self.op, self.kind, parent, child)
            }
        }
    }
}

/// Callback invoked by the store around each write.
pub trait WriteHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs before a delete executes, while dependent rows still exist.
    fn before_delete(&self, _conn: &Connection, _change: &Change) -> Result<()> {
        Ok(())
    }

    /// Runs after the write, in the same transaction.
    fn after_write(&self, conn: &Connection, change: &Change) -> Result<()>;
}
