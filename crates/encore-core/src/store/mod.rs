//! SQLite-backed entity store
//!
//! One connection behind a mutex. Every write runs in its own transaction
//! together with the registered [`WriteHook`]s, so side records such as sync
//! jobs commit or roll back with the row that caused them.

mod entity;
mod hooks;
mod links;
mod outbox;
mod schema;
mod tokens;

pub use entity::{Cmp, Entity, EntityKind, Filter, ListQuery, MAX_PAGE_SIZE};
pub(crate) use entity::opt_text;
pub use hooks::{Change, RecordKey, WriteHook, WriteOp};
pub use links::{
    CALENDAR_COLLABORATORS, CALENDAR_PIECES, Link, LinkTable, PROGRAM_PIECES, calendars_linked_to,
};
pub use outbox::{JobStatus, SyncAction, SyncJob, enqueue_sync_job, format_timestamp};
pub use tokens::StoredToken;

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Shared handle to the database; cheap to clone.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    hooks: Arc<RwLock<Vec<Arc<dyn WriteHook>>>>,
}

/// Snapshot of the registered hooks for one write.
pub(crate) struct Hooks(Vec<Arc<dyn WriteHook>>);

impl Hooks {
    pub(crate) fn before_delete(&self, conn: &Connection, change: &Change) -> Result<()> {
        for hook in &self.0 {
            hook.before_delete(conn, change).map_err(|e| hook_error(hook.name(), change, e))?;
        }
        Ok(())
    }

    pub(crate) fn after_write(&self, conn: &Connection, change: &Change) -> Result<()> {
        for hook in &self.0 {
            hook.after_write(conn, change).map_err(|e| hook_error(hook.name(), change, e))?;
        }
        Ok(())
    }
}

fn hook_error(hook: &'static str, change: &Change, err: Error) -> Error {
    warn!(hook, %change, "Write hook failed, rolling back: {}", err);
    Error::Hook {
        hook,
        message: err.to_string(),
    }
}

impl Store {
    /// Open (or create) the database file at `db_path`
    pub fn open(db_path: &str) -> Result<Self> {
        debug!("Opening database at: {}", db_path);
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Journal mode: {}", mode);
        let store = Self::from_connection(conn)?;
        info!("Store initialized at {}", db_path);
        Ok(store)
    }

    /// Create an in-memory store (useful for testing)
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            hooks: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// Add a hook that runs on every subsequent write.
    pub fn register_hook(&self, hook: Arc<dyn WriteHook>) -> Result<()> {
        info!("Registering write hook: {}", hook.name());
        self.hooks.write().map_err(|_| Error::LockPoisoned)?.push(hook);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Runs `f` in a transaction; commits only when `f` succeeds.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&Connection, &Hooks) -> Result<T>) -> Result<T> {
        let hooks = Hooks(self.hooks.read().map_err(|_| Error::LockPoisoned)?.clone());
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&tx, &hooks)?;
        tx.commit()?;
        Ok(out)
    }

    /// List records of `E`
    pub fn list<E: Entity>(&self, query: &ListQuery) -> Result<Vec<E>> {
        let (sql, values) = query.to_sql::<E>()?;
        self.read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params_from_iter(values), |row| E::from_row(row))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            debug!("Listed {} {} rows", records.len(), E::KIND);
            Ok(records)
        })
    }

    /// Load a record by id
    pub fn find<E: Entity>(&self, id: i64) -> Result<Option<E>> {
        self.read(|conn| fetch::<E>(conn, id))
    }

    /// Load a record by id, failing with [`Error::NotFound`]
    pub fn get<E: Entity>(&self, id: i64) -> Result<E> {
        self.find::<E>(id)?
            .ok_or_else(|| Error::not_found(E::KIND.as_str(), id))
    }

    /// Count all records of `E`
    pub fn count<E: Entity>(&self) -> Result<usize> {
        self.read(|conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", E::TABLE), [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// Insert a record; its `id` is ignored and assigned by the database.
    pub fn create<E: Entity>(&self, record: E) -> Result<E> {
        record.validate()?;
        let placeholders = (1..=E::COLUMNS.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            E::TABLE,
            E::COLUMNS.join(", "),
            placeholders
        );

        self.write(|conn, hooks| {
            conn.execute(&sql, params_from_iter(record.to_values()))?;
            let id = conn.last_insert_rowid();
            hooks.after_write(conn, &Change::record(E::KIND, WriteOp::Create, id))?;
            debug!("Created {} #{}", E::KIND, id);
            fetch::<E>(conn, id)?.ok_or_else(|| Error::not_found(E::KIND.as_str(), id))
        })
    }

    /// Replace the writable columns of record `id`.
    pub fn update<E: Entity>(&self, id: i64, mut record: E) -> Result<E> {
        record.set_id(id);
        record.validate()?;
        let assignments = E::COLUMNS
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{} = ?{}", col, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            E::TABLE,
            assignments,
            E::COLUMNS.len() + 1
        );

        self.write(|conn, hooks| {
            let mut values = record.to_values();
            values.push(id.into());
            let updated = conn.execute(&sql, params_from_iter(values))?;
            if updated == 0 {
                return Err(Error::not_found(E::KIND.as_str(), id));
            }
            hooks.after_write(conn, &Change::record(E::KIND, WriteOp::Update, id))?;
            debug!("Updated {} #{}", E::KIND, id);
            fetch::<E>(conn, id)?.ok_or_else(|| Error::not_found(E::KIND.as_str(), id))
        })
    }

    /// Delete record `id`; join rows referencing it cascade.
    pub fn delete<E: Entity>(&self, id: i64) -> Result<()> {
        self.write(|conn, hooks| {
            if !exists(conn, E::TABLE, id)? {
                return Err(Error::not_found(E::KIND.as_str(), id));
            }
            let change = Change::record(E::KIND, WriteOp::Delete, id);
            hooks.before_delete(conn, &change)?;
            conn.execute(&format!("DELETE FROM {} WHERE id = ?1", E::TABLE), params![id])?;
            hooks.after_write(conn, &change)?;
            debug!("Deleted {} #{}", E::KIND, id);
            Ok(())
        })
    }

    /// Record the remote event id of a calendar without firing hooks.
    ///
    /// Returns `false` when the calendar no longer exists.
    pub fn set_google_id(&self, calendar_id: i64, google_id: Option<&str>) -> Result<bool> {
        self.read(|conn| {
            let updated = conn.execute(
                "UPDATE calendars SET google_id = ?1 WHERE id = ?2",
                params![google_id, calendar_id],
            )?;
            Ok(updated > 0)
        })
    }

    /// Look up a product by its unique SKU
    pub fn product_by_sku(&self, sku: &str) -> Result<crate::model::Product> {
        use crate::model::Product;
        self.read(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM products WHERE sku = ?1", Product::select_columns()),
                params![sku],
                |row| Product::from_row(row),
            )
            .optional()?
            .ok_or_else(|| Error::not_found(Product::KIND.as_str(), sku))
        })
    }
}

pub(crate) fn fetch<E: Entity>(conn: &Connection, id: i64) -> Result<Option<E>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?1", E::select_columns(), E::TABLE);
    Ok(conn.query_row(&sql, params![id], |row| E::from_row(row)).optional()?)
}

pub(crate) fn exists(conn: &Connection, table: &str, id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(&format!("SELECT 1 FROM {} WHERE id = ?1", table), params![id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Acclaim, Calendar, Piece, Product};
    use chrono::NaiveDateTime;
    use std::sync::Mutex as StdMutex;

    /// Records every change it sees.
    #[derive(Default)]
    struct Recorder {
        seen: StdMutex<Vec<Change>>,
        fail: bool,
    }

    impl WriteHook for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn after_write(&self, _conn: &Connection, change: &Change) -> Result<()> {
            self.seen.lock().unwrap().push(*change);
            if self.fail {
                return Err(Error::Config("boom".into()));
            }
            Ok(())
        }
    }

    fn recital() -> Calendar {
        Calendar::new(
            "Recital",
            NaiveDateTime::parse_from_str("2024-05-01T19:30:00", crate::model::DATE_TIME_FORMAT)
                .unwrap(),
            "America/Chicago",
        )
    }

    #[test]
    fn test_crud_round_trip() -> Result<()> {
        let store = Store::in_memory()?;

        let created = store.create(Piece::new("Bach", "Partita No. 2"))?;
        assert!(created.id > 0);

        let mut edited = created.clone();
        edited.piece = "Partita No. 2 in C minor".into();
        let updated = store.update(created.id, edited)?;
        assert_eq!(updated.piece, "Partita No. 2 in C minor");
        assert_eq!(store.get::<Piece>(created.id)?, updated);

        store.delete::<Piece>(created.id)?;
        assert!(store.find::<Piece>(created.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_missing_rows_are_not_found() -> Result<()> {
        let store = Store::in_memory()?;
        assert!(matches!(store.get::<Piece>(42), Err(Error::NotFound { .. })));
        assert!(matches!(
            store.update(42, Piece::new("Bach", "Chaconne")),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(store.delete::<Piece>(42), Err(Error::NotFound { .. })));
        Ok(())
    }

    #[test]
    fn test_list_search_and_paging() -> Result<()> {
        let store = Store::in_memory()?;
        store.create(Piece::new("Bach", "Partita No. 2"))?;
        store.create(Piece::new("Beethoven", "Sonata Op. 111"))?;
        store.create(Piece::new("Chopin", "Ballade No. 4"))?;

        let hits = store.list::<Piece>(&ListQuery::search("sonata"))?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].composer, "Beethoven");

        let page = store.list::<Piece>(&ListQuery {
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        })?;
        let composers: Vec<_> = page.iter().map(|p| p.composer.as_str()).collect();
        assert_eq!(composers, ["Beethoven", "Chopin"]);

        let desc = store.list::<Piece>(&ListQuery::default().ordered_by("composer", true))?;
        assert_eq!(desc[0].composer, "Chopin");
        Ok(())
    }

    #[test]
    fn test_filters() -> Result<()> {
        let store = Store::in_memory()?;
        store.create(Acclaim {
            id: 0,
            quote: "Dazzling".into(),
            author: "Tribune".into(),
            website: None,
            short: true,
        })?;
        store.create(Acclaim {
            id: 0,
            quote: "A long and thoughtful review".into(),
            author: "Times".into(),
            website: None,
            short: false,
        })?;

        let short = store.list::<Acclaim>(
            &ListQuery::default().with_filter(Filter::new("short", Cmp::Eq, true)),
        )?;
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].quote, "Dazzling");
        Ok(())
    }

    #[test]
    fn test_unique_sku_is_constraint_error() -> Result<()> {
        let store = Store::in_memory()?;
        let product = Product {
            id: 0,
            sku: "CD-001".into(),
            name: "Debut album".into(),
            description: None,
            category: "cd".into(),
            price_cents: 1500,
            image_url: None,
        };
        store.create(product.clone())?;
        assert!(matches!(store.create(product), Err(Error::Constraint(_))));
        assert_eq!(store.product_by_sku("CD-001")?.price_cents, 1500);
        Ok(())
    }

    #[test]
    fn test_validation_runs_before_insert() -> Result<()> {
        let store = Store::in_memory()?;
        let mut calendar = recital();
        calendar.timezone = "Nowhere/Special".into();
        assert!(matches!(store.create(calendar), Err(Error::Validation { .. })));
        assert_eq!(store.count::<Calendar>()?, 0);
        Ok(())
    }

    #[test]
    fn test_google_id_is_not_writable_through_update() -> Result<()> {
        let store = Store::in_memory()?;
        let created = store.create(recital())?;
        assert!(store.set_google_id(created.id, Some("evt123"))?);

        let mut edited = created.clone();
        edited.google_id = None;
        let updated = store.update(created.id, edited)?;
        assert_eq!(updated.google_id.as_deref(), Some("evt123"));
        Ok(())
    }

    #[test]
    fn test_hooks_see_each_write() -> Result<()> {
        let store = Store::in_memory()?;
        let recorder = Arc::new(Recorder::default());
        store.register_hook(recorder.clone())?;

        let piece = store.create(Piece::new("Bach", "Chaconne"))?;
        store.update(piece.id, piece.clone())?;
        store.delete::<Piece>(piece.id)?;

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                Change::record(EntityKind::Piece, WriteOp::Create, piece.id),
                Change::record(EntityKind::Piece, WriteOp::Update, piece.id),
                Change::record(EntityKind::Piece, WriteOp::Delete, piece.id),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_failing_hook_rolls_back_write() -> Result<()> {
        let store = Store::in_memory()?;
        store.register_hook(Arc::new(Recorder {
            fail: true,
            ..Default::default()
        }))?;

        let err = store.create(Piece::new("Bach", "Chaconne")).unwrap_err();
        assert!(matches!(err, Error::Hook { hook: "recorder", .. }));
        assert_eq!(store.count::<Piece>()?, 0);
        Ok(())
    }
}
