//! Stored records
//!
//! Plain structs with serde derives; the [`Entity`](crate::store::Entity)
//! impls next to each struct are the mapping to SQLite.

mod calendar;
mod media;
mod repertoire;
mod shop;

pub use calendar::{
    Calendar, CalendarAggregate, EventStart, LinkedCollaborator, LinkedPiece,
};
pub use media::{Acclaim, Bio, Disc, Music, Photo};
pub use repertoire::{Collaborator, Piece, Program};
pub use shop::Product;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Row;
use rusqlite::types::Type;

/// Wall-clock format used for stored date-times; sorts lexicographically.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

fn conversion_error(
    row: &Row<'_>,
    column: &str,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    let idx = row.as_ref().column_index(column).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn get_date_time(row: &Row<'_>, column: &str) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(column)?;
    NaiveDateTime::parse_from_str(&raw, DATE_TIME_FORMAT).map_err(|e| conversion_error(row, column, e))
}

pub(crate) fn get_opt_date(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(row, column, e)))
        .transpose()
}

pub(crate) fn format_date_time(value: &NaiveDateTime) -> String {
    value.format(DATE_TIME_FORMAT).to_string()
}
