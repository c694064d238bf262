//! Ordered many-to-many join rows

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Change, Entity, EntityKind, Hooks, Store, WriteOp, exists, fetch};
use crate::model::{
    Calendar, CalendarAggregate, Collaborator, LinkedCollaborator, LinkedPiece, Piece, Program,
};
use crate::{Error, Result};

/// Mapping of one join table.
#[derive(Debug)]
pub struct LinkTable {
    pub kind: EntityKind,
    pub table: &'static str,
    pub parent_kind: EntityKind,
    pub parent_table: &'static str,
    pub parent_column: &'static str,
    pub child_kind: EntityKind,
    pub child_table: &'static str,
    pub child_column: &'static str,
}

pub const CALENDAR_PIECES: LinkTable = LinkTable {
    kind: EntityKind::CalendarPiece,
    table: "calendar_pieces",
    parent_kind: EntityKind::Calendar,
    parent_table: Calendar::TABLE,
    parent_column: "calendar_id",
    child_kind: EntityKind::Piece,
    child_table: Piece::TABLE,
    child_column: "piece_id",
};

pub const CALENDAR_COLLABORATORS: LinkTable = LinkTable {
    kind: EntityKind::CalendarCollaborator,
    table: "calendar_collaborators",
    parent_kind: EntityKind::Calendar,
    parent_table: Calendar::TABLE,
    parent_column: "calendar_id",
    child_kind: EntityKind::Collaborator,
    child_table: Collaborator::TABLE,
    child_column: "collaborator_id",
};

pub const PROGRAM_PIECES: LinkTable = LinkTable {
    kind: EntityKind::ProgramPiece,
    table: "program_pieces",
    parent_kind: EntityKind::Program,
    parent_table: Program::TABLE,
    parent_column: "program_id",
    child_kind: EntityKind::Piece,
    child_table: Piece::TABLE,
    child_column: "piece_id",
};

/// A join row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub parent_id: i64,
    pub child_id: i64,
    pub order: i64,
}

impl LinkTable {
    fn find(&self, conn: &Connection, parent: i64, child: i64) -> Result<Option<Link>> {
        let sql = format!(
            "SELECT sort_order FROM {} WHERE {} = ?1 AND {} = ?2",
            self.table, self.parent_column, self.child_column
        );
        let order: Option<i64> = conn
            .query_row(&sql, params![parent, child], |row| row.get(0))
            .optional()?;
        Ok(order.map(|order| Link {
            parent_id: parent,
            child_id: child,
            order,
        }))
    }

    fn list(&self, conn: &Connection, parent: i64) -> Result<Vec<Link>> {
        let sql = format!(
            "SELECT {child}, sort_order FROM {table} WHERE {parent} = ?1 ORDER BY sort_order, {child}",
            child = self.child_column,
            table = self.table,
            parent = self.parent_column,
        );
        let mut stmt = conn.prepare(&sql)?;
        let links = stmt
            .query_map(params![parent], |row| {
                Ok(Link {
                    parent_id: parent,
                    child_id: row.get(0)?,
                    order: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn insert(&self, conn: &Connection, hooks: &Hooks, parent: i64, child: i64, order: Option<i64>) -> Result<Link> {
        if !exists(conn, self.parent_table, parent)? {
            return Err(Error::not_found(self.parent_kind.as_str(), parent));
        }
        if !exists(conn, self.child_table, child)? {
            return Err(Error::not_found(self.child_kind.as_str(), child));
        }
        let order = match order {
            Some(order) => order,
            None => self.next_order(conn, parent)?,
        };
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, sort_order) VALUES (?1, ?2, ?3)",
                self.table, self.parent_column, self.child_column
            ),
            params![parent, child, order],
        )?;
        hooks.after_write(conn, &Change::link(self.kind, WriteOp::Create, parent, child))?;
        Ok(Link {
            parent_id: parent,
            child_id: child,
            order,
        })
    }

    fn remove(&self, conn: &Connection, hooks: &Hooks, parent: i64, child: i64) -> Result<()> {
        let change = Change::link(self.kind, WriteOp::Delete, parent, child);
        hooks.before_delete(conn, &change)?;
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
                self.table, self.parent_column, self.child_column
            ),
            params![parent, child],
        )?;
        hooks.after_write(conn, &change)
    }

    fn set_order(&self, conn: &Connection, hooks: &Hooks, parent: i64, child: i64, order: i64) -> Result<()> {
        conn.execute(
            &format!(
                "UPDATE {} SET sort_order = ?3 WHERE {} = ?1 AND {} = ?2",
                self.table, self.parent_column, self.child_column
            ),
            params![parent, child, order],
        )?;
        hooks.after_write(conn, &Change::link(self.kind, WriteOp::Update, parent, child))
    }

    fn next_order(&self, conn: &Connection, parent: i64) -> Result<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM {} WHERE {} = ?1",
            self.table, self.parent_column
        );
        Ok(conn.query_row(&sql, params![parent], |row| row.get(0))?)
    }

    fn not_linked(&self, parent: i64, child: i64) -> Error {
        Error::not_found(self.kind.as_str(), format!("{}:{}", parent, child))
    }
}

/// Ids of the parents linking `child` through `table`.
pub fn calendars_linked_to(conn: &Connection, table: &LinkTable, child: i64) -> Result<Vec<i64>> {
    let sql = format!(
        "SELECT {parent} FROM {table} WHERE {child} = ?1 ORDER BY {parent}",
        parent = table.parent_column,
        table = table.table,
        child = table.child_column,
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params![child], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

fn linked_pieces(conn: &Connection, table: &LinkTable, parent: i64) -> Result<Vec<LinkedPiece>> {
    let sql = format!(
        "SELECT p.id AS id, p.composer AS composer, p.piece AS piece, l.sort_order AS sort_order
         FROM {} l JOIN pieces p ON p.id = l.piece_id
         WHERE l.{} = ?1
         ORDER BY l.sort_order, p.id",
        table.table, table.parent_column
    );
    let mut stmt = conn.prepare(&sql)?;
    let pieces = stmt
        .query_map(params![parent], |row| {
            Ok(LinkedPiece {
                order: row.get("sort_order")?,
                piece: Piece::from_row(row)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(pieces)
}

fn linked_collaborators(conn: &Connection, calendar_id: i64) -> Result<Vec<LinkedCollaborator>> {
    let mut stmt = conn.prepare(
        "SELECT c.id AS id, c.name AS name, c.instrument AS instrument, l.sort_order AS sort_order
         FROM calendar_collaborators l JOIN collaborators c ON c.id = l.collaborator_id
         WHERE l.calendar_id = ?1
         ORDER BY l.sort_order, c.id",
    )?;
    let collaborators = stmt
        .query_map(params![calendar_id], |row| {
            Ok(LinkedCollaborator {
                order: row.get("sort_order")?,
                collaborator: Collaborator::from_row(row)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(collaborators)
}

/// Load a calendar with pieces and collaborators in display order.
pub(crate) fn load_aggregate(conn: &Connection, calendar_id: i64) -> Result<Option<CalendarAggregate>> {
    let Some(calendar) = fetch::<Calendar>(conn, calendar_id)? else {
        return Ok(None);
    };
    Ok(Some(CalendarAggregate {
        calendar,
        pieces: linked_pieces(conn, &CALENDAR_PIECES, calendar_id)?,
        collaborators: linked_collaborators(conn, calendar_id)?,
    }))
}

impl Store {
    /// Attach `child` to `parent`; `order` defaults to the end of the list.
    pub fn link(&self, table: &LinkTable, parent: i64, child: i64, order: Option<i64>) -> Result<Link> {
        self.write(|conn, hooks| {
            let link = table.insert(conn, hooks, parent, child, order)?;
            debug!("Linked {} {}:{} at {}", table.kind, parent, child, link.order);
            Ok(link)
        })
    }

    /// Move an existing join row to `order`.
    pub fn set_link_order(&self, table: &LinkTable, parent: i64, child: i64, order: i64) -> Result<Link> {
        self.write(|conn, hooks| {
            if table.find(conn, parent, child)?.is_none() {
                return Err(table.not_linked(parent, child));
            }
            table.set_order(conn, hooks, parent, child, order)?;
            Ok(Link {
                parent_id: parent,
                child_id: child,
                order,
            })
        })
    }

    /// Detach `child` from `parent`.
    pub fn unlink(&self, table: &LinkTable, parent: i64, child: i64) -> Result<()> {
        self.write(|conn, hooks| {
            if table.find(conn, parent, child)?.is_none() {
                return Err(table.not_linked(parent, child));
            }
            table.remove(conn, hooks, parent, child)?;
            debug!("Unlinked {} {}:{}", table.kind, parent, child);
            Ok(())
        })
    }

    /// Renumber the children of `parent` to follow `child_ids` (0-based).
    ///
    /// `child_ids` must name exactly the currently linked children.
    pub fn reorder_links(&self, table: &LinkTable, parent: i64, child_ids: &[i64]) -> Result<Vec<Link>> {
        self.write(|conn, hooks| {
            if !exists(conn, table.parent_table, parent)? {
                return Err(Error::not_found(table.parent_kind.as_str(), parent));
            }
            let mut current: Vec<i64> = table.list(conn, parent)?.iter().map(|l| l.child_id).collect();
            let mut requested = child_ids.to_vec();
            current.sort_unstable();
            requested.sort_unstable();
            if current != requested {
                return Err(Error::validation(
                    table.kind.as_str(),
                    "reorder must list every linked id exactly once",
                ));
            }
            for (order, child) in child_ids.iter().enumerate() {
                table.set_order(conn, hooks, parent, *child, order as i64)?;
            }
            table.list(conn, parent)
        })
    }

    /// Join rows of `parent`, in order.
    pub fn links(&self, table: &LinkTable, parent: i64) -> Result<Vec<Link>> {
        self.read(|conn| {
            if !exists(conn, table.parent_table, parent)? {
                return Err(Error::not_found(table.parent_kind.as_str(), parent));
            }
            table.list(conn, parent)
        })
    }

    pub fn calendar_pieces(&self, calendar_id: i64) -> Result<Vec<LinkedPiece>> {
        self.read(|conn| linked_pieces(conn, &CALENDAR_PIECES, calendar_id))
    }

    pub fn calendar_collaborators(&self, calendar_id: i64) -> Result<Vec<LinkedCollaborator>> {
        self.read(|conn| linked_collaborators(conn, calendar_id))
    }

    pub fn program_pieces(&self, program_id: i64) -> Result<Vec<LinkedPiece>> {
        self.read(|conn| {
            if !exists(conn, Program::TABLE, program_id)? {
                return Err(Error::not_found(Program::KIND.as_str(), program_id));
            }
            linked_pieces(conn, &PROGRAM_PIECES, program_id)
        })
    }

    pub fn find_calendar_aggregate(&self, calendar_id: i64) -> Result<Option<CalendarAggregate>> {
        self.read(|conn| load_aggregate(conn, calendar_id))
    }

    pub fn calendar_aggregate(&self, calendar_id: i64) -> Result<CalendarAggregate> {
        self.find_calendar_aggregate(calendar_id)?
            .ok_or_else(|| Error::not_found(Calendar::KIND.as_str(), calendar_id))
    }

    /// Replace the calendar's pieces with the program's, in program order.
    pub fn apply_program(&self, calendar_id: i64, program_id: i64) -> Result<CalendarAggregate> {
        self.write(|conn, hooks| {
            if !exists(conn, Calendar::TABLE, calendar_id)? {
                return Err(Error::not_found(Calendar::KIND.as_str(), calendar_id));
            }
            if !exists(conn, Program::TABLE, program_id)? {
                return Err(Error::not_found(Program::KIND.as_str(), program_id));
            }
            for link in CALENDAR_PIECES.list(conn, calendar_id)? {
                CALENDAR_PIECES.remove(conn, hooks, calendar_id, link.child_id)?;
            }
            for link in PROGRAM_PIECES.list(conn, program_id)? {
                CALENDAR_PIECES.insert(conn, hooks, calendar_id, link.child_id, Some(link.order))?;
            }
            debug!("Applied program #{} to calendar #{}", program_id, calendar_id);
            load_aggregate(conn, calendar_id)?
                .ok_or_else(|| Error::not_found(Calendar::KIND.as_str(), calendar_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DATE_TIME_FORMAT;
    use chrono::NaiveDateTime;

    fn setup() -> Result<(Store, Calendar, Piece, Piece)> {
        let store = Store::in_memory()?;
        let calendar = store.create(Calendar::new(
            "Recital",
            NaiveDateTime::parse_from_str("2024-05-01T19:30:00", DATE_TIME_FORMAT).unwrap(),
            "America/Chicago",
        ))?;
        let p1 = store.create(Piece::new("Bach", "Partita No. 2"))?;
        let p2 = store.create(Piece::new("Ravel", "Gaspard de la nuit"))?;
        Ok((store, calendar, p1, p2))
    }

    #[test]
    fn test_aggregate_follows_order_field() -> Result<()> {
        let (store, calendar, p1, p2) = setup()?;
        store.link(&CALENDAR_PIECES, calendar.id, p1.id, Some(1))?;
        store.link(&CALENDAR_PIECES, calendar.id, p2.id, Some(0))?;

        let aggregate = store.calendar_aggregate(calendar.id)?;
        let titles: Vec<_> = aggregate.pieces.iter().map(|p| p.piece.piece.as_str()).collect();
        assert_eq!(titles, ["Gaspard de la nuit", "Partita No. 2"]);
        Ok(())
    }

    #[test]
    fn test_aggregate_orders_collaborators() -> Result<()> {
        let (store, calendar, _, _) = setup()?;
        let violin = store.create(Collaborator::new("Ana Li", "violin"))?;
        let cello = store.create(Collaborator::new("Sam Ortiz", "cello"))?;
        let piano = store.create(Collaborator::new("Mei Tan", "piano"))?;
        store.link(&CALENDAR_COLLABORATORS, calendar.id, violin.id, Some(1))?;
        store.link(&CALENDAR_COLLABORATORS, calendar.id, cello.id, Some(0))?;
        store.link(&CALENDAR_COLLABORATORS, calendar.id, piano.id, Some(2))?;

        let names = |aggregate: &CalendarAggregate| -> Vec<String> {
            aggregate
                .collaborators
                .iter()
                .map(|c| c.collaborator.name.clone())
                .collect()
        };
        let aggregate = store.calendar_aggregate(calendar.id)?;
        assert_eq!(names(&aggregate), ["Sam Ortiz", "Ana Li", "Mei Tan"]);
        assert_eq!(aggregate.collaborators[0].order, 0);

        store.set_link_order(&CALENDAR_COLLABORATORS, calendar.id, piano.id, -1)?;
        let aggregate = store.calendar_aggregate(calendar.id)?;
        assert_eq!(names(&aggregate), ["Mei Tan", "Sam Ortiz", "Ana Li"]);
        assert_eq!(store.calendar_collaborators(calendar.id)?[0].collaborator.name, "Mei Tan");
        Ok(())
    }

    #[test]
    fn test_link_appends_by_default() -> Result<()> {
        let (store, calendar, p1, p2) = setup()?;
        assert_eq!(store.link(&CALENDAR_PIECES, calendar.id, p1.id, None)?.order, 0);
        assert_eq!(store.link(&CALENDAR_PIECES, calendar.id, p2.id, None)?.order, 1);
        Ok(())
    }

    #[test]
    fn test_duplicate_link_is_constraint_error() -> Result<()> {
        let (store, calendar, p1, _) = setup()?;
        store.link(&CALENDAR_PIECES, calendar.id, p1.id, None)?;
        assert!(matches!(
            store.link(&CALENDAR_PIECES, calendar.id, p1.id, None),
            Err(Error::Constraint(_))
        ));
        Ok(())
    }

    #[test]
    fn test_link_to_missing_child_is_not_found() -> Result<()> {
        let (store, calendar, _, _) = setup()?;
        assert!(matches!(
            store.link(&CALENDAR_PIECES, calendar.id, 999, None),
            Err(Error::NotFound { entity: "piece", .. })
        ));
        Ok(())
    }

    #[test]
    fn test_reorder_requires_full_set() -> Result<()> {
        let (store, calendar, p1, p2) = setup()?;
        store.link(&CALENDAR_PIECES, calendar.id, p1.id, None)?;
        store.link(&CALENDAR_PIECES, calendar.id, p2.id, None)?;

        assert!(store.reorder_links(&CALENDAR_PIECES, calendar.id, &[p2.id]).is_err());

        let links = store.reorder_links(&CALENDAR_PIECES, calendar.id, &[p2.id, p1.id])?;
        assert_eq!(links[0].child_id, p2.id);
        assert_eq!(links[1].child_id, p1.id);
        Ok(())
    }

    #[test]
    fn test_deleting_piece_cascades_links() -> Result<()> {
        let (store, calendar, p1, p2) = setup()?;
        store.link(&CALENDAR_PIECES, calendar.id, p1.id, None)?;
        store.link(&CALENDAR_PIECES, calendar.id, p2.id, None)?;

        store.delete::<Piece>(p1.id)?;
        let pieces = store.calendar_pieces(calendar.id)?;
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].piece.id, p2.id);
        Ok(())
    }

    #[test]
    fn test_apply_program_replaces_pieces() -> Result<()> {
        let (store, calendar, p1, p2) = setup()?;
        store.link(&CALENDAR_PIECES, calendar.id, p1.id, None)?;

        let program = store.create(Program {
            id: 0,
            name: "French program".into(),
        })?;
        store.link(&PROGRAM_PIECES, program.id, p2.id, None)?;

        let aggregate = store.apply_program(calendar.id, program.id)?;
        assert_eq!(aggregate.pieces.len(), 1);
        assert_eq!(aggregate.pieces[0].piece.id, p2.id);
        Ok(())
    }

    #[test]
    fn test_calendars_linked_to() -> Result<()> {
        let (store, calendar, p1, _) = setup()?;
        store.link(&CALENDAR_PIECES, calendar.id, p1.id, None)?;
        let ids = store.read(|conn| calendars_linked_to(conn, &CALENDAR_PIECES, p1.id))?;
        assert_eq!(ids, vec![calendar.id]);
        Ok(())
    }
}
