//! Explicit schema/mapping tables for stored records
//!
//! Every entity declares its table, writable columns and search columns.
//! The generic CRUD code in [`crate::store`] builds its SQL from these.

use rusqlite::Row;
use rusqlite::types::Value;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

use crate::{Error, Result};

/// Every record type the store knows, including join rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Calendar,
    Piece,
    Collaborator,
    Program,
    Music,
    Disc,
    Acclaim,
    Bio,
    Photo,
    Product,
    CalendarPiece,
    CalendarCollaborator,
    ProgramPiece,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Piece => "piece",
            Self::Collaborator => "collaborator",
            Self::Program => "program",
            Self::Music => "music",
            Self::Disc => "disc",
            Self::Acclaim => "acclaim",
            Self::Bio => "bio",
            Self::Photo => "photo",
            Self::Product => "product",
            Self::CalendarPiece => "calendar_piece",
            Self::CalendarCollaborator => "calendar_collaborator",
            Self::ProgramPiece => "program_piece",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record with an integer primary key stored in its own table.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Sized + 'static {
    const KIND: EntityKind;
    const TABLE: &'static str;
    /// Columns written on create/update, in the order of [`Entity::to_values`].
    const COLUMNS: &'static [&'static str];
    /// Columns that are read but never written through CRUD.
    const READ_ONLY_COLUMNS: &'static [&'static str] = &[];
    /// Columns matched by the `q` list parameter.
    const SEARCH_COLUMNS: &'static [&'static str] = &[];
    const ORDER_BY: &'static str = "id";
    const ORDER_DESC: bool = false;

    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    /// Reads a row selected with [`Entity::select_columns`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn to_values(&self) -> Vec<Value>;

    /// Checks a column constraint cannot express.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn select_columns() -> String {
        std::iter::once("id")
            .chain(Self::COLUMNS.iter().copied())
            .chain(Self::READ_ONLY_COLUMNS.iter().copied())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn has_column(name: &str) -> bool {
        name == "id" || Self::COLUMNS.contains(&name) || Self::READ_ONLY_COLUMNS.contains(&name)
    }
}

/// Comparison used by [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Column predicate added by typed callers, never by request input.
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: &'static str,
    pub cmp: Cmp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: &'static str, cmp: Cmp, value: impl Into<Value>) -> Self {
        Self {
            column,
            cmp,
            value: value.into(),
        }
    }
}

/// List parameters accepted from query strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// Free-text search over the entity's search columns
    pub q: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub order_by: Option<String>,
    #[serde(default)]
    pub desc: Option<bool>,
    #[serde(skip)]
    pub filters: Vec<Filter>,
}

/// Hard cap for `limit`.
pub const MAX_PAGE_SIZE: u32 = 500;

impl ListQuery {
    pub fn search(q: impl Into<String>) -> Self {
        Self {
            q: Some(q.into()),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn ordered_by(mut self, column: impl Into<String>, desc: bool) -> Self {
        self.order_by = Some(column.into());
        self.desc = Some(desc);
        self
    }

    /// Builds `SELECT ... WHERE ... ORDER BY ... LIMIT ... OFFSET ...` for `E`.
    pub(crate) fn to_sql<E: Entity>(&self) -> Result<(String, Vec<Value>)> {
        let mut sql = format!("SELECT {} FROM {}", E::select_columns(), E::TABLE);
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        for filter in &self.filters {
            if !E::has_column(filter.column) {
                return Err(Error::validation(
                    E::KIND.as_str(),
                    format!("unknown filter column `{}`", filter.column),
                ));
            }
            values.push(filter.value.clone());
            clauses.push(format!("{} {} ?{}", filter.column, filter.cmp.as_sql(), values.len()));
        }

        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            if !E::SEARCH_COLUMNS.is_empty() {
                values.push(Value::Text(format!("%{}%", escape_like(q))));
                let n = values.len();
                let any = E::SEARCH_COLUMNS
                    .iter()
                    .map(|col| format!("{} LIKE ?{} ESCAPE '\\'", col, n))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                clauses.push(format!("({})", any));
            }
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let (order_by, desc) = match self.order_by.as_deref() {
            Some(column) if E::has_column(column) => (column, self.desc.unwrap_or(false)),
            Some(column) => {
                return Err(Error::validation(
                    E::KIND.as_str(),
                    format!("cannot order by unknown column `{}`", column),
                ));
            }
            None => (E::ORDER_BY, self.desc.unwrap_or(E::ORDER_DESC)),
        };
        let dir = if desc { "DESC" } else { "ASC" };
        sql.push_str(&format!(" ORDER BY {} {}", order_by, dir));
        if order_by != "id" {
            sql.push_str(&format!(", id {}", dir));
        }

        let limit = self.limit.map(|l| l.min(MAX_PAGE_SIZE)).unwrap_or(MAX_PAGE_SIZE);
        values.push(Value::Integer(i64::from(limit)));
        sql.push_str(&format!(" LIMIT ?{}", values.len()));
        values.push(Value::Integer(i64::from(self.offset.unwrap_or(0))));
        sql.push_str(&format!(" OFFSET ?{}", values.len()));

        Ok((sql, values))
    }
}

fn escape_like(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Optional text that treats empty strings as absent.
pub(crate) fn opt_text(value: &Option<String>) -> Value {
    match value.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Value::Text(s.to_string()),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Piece;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_list_sql_with_search_and_paging() {
        let query = ListQuery {
            q: Some("Bach".into()),
            limit: Some(10),
            offset: Some(20),
            ..Default::default()
        };
        let (sql, values) = query.to_sql::<Piece>().unwrap();

        assert!(sql.starts_with("SELECT id, composer, piece FROM pieces WHERE (composer LIKE ?1"));
        assert!(sql.ends_with("LIMIT ?2 OFFSET ?3"));
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], Value::Text("%Bach%".into()));
    }

    #[test]
    fn test_unknown_order_column_is_rejected() {
        let query = ListQuery::default().ordered_by("1; DROP TABLE pieces", false);
        assert!(matches!(
            query.to_sql::<Piece>(),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_limit_is_capped() {
        let query = ListQuery {
            limit: Some(100_000),
            ..Default::default()
        };
        let (_, values) = query.to_sql::<Piece>().unwrap();
        assert_eq!(values[0], Value::Integer(i64::from(MAX_PAGE_SIZE)));
    }
}
