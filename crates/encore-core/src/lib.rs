//! encore-core: storage layer of the encore site backend
//!
//! Configuration, the error type, record definitions and the SQLite store
//! with its write hooks, sync outbox and token table.

pub mod config;
pub mod error;
pub mod model;
pub mod store;

pub use config::{ApiConfig, Config, DatabaseConfig, GcalConfig, SyncConfig};
pub use error::{Error, Result};
pub use model::{
    Acclaim, Bio, Calendar, CalendarAggregate, Collaborator, Disc, EventStart, LinkedCollaborator,
    LinkedPiece, Music, Photo, Piece, Product, Program,
};
pub use store::{
    Change, Entity, EntityKind, JobStatus, ListQuery, RecordKey, Store, StoredToken, SyncAction,
    SyncJob, WriteHook, WriteOp,
};
