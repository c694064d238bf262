//! Calendar aggregate to Google event payload

use chrono::{Duration, NaiveDateTime, SecondsFormat, TimeZone};
use chrono_tz::Tz;
use encore_core::{CalendarAggregate, EventStart, LinkedCollaborator, LinkedPiece};
use serde::{Deserialize, Serialize};

use crate::error::{GcalError, Result};

/// Request body for events.insert / events.update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEvent {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
}

/// Either `date` (all-day) or `dateTime` + `timeZone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    fn date(date: chrono::NaiveDate) -> Self {
        Self {
            date: Some(date.format("%Y-%m-%d").to_string()),
            date_time: None,
            time_zone: None,
        }
    }

    fn date_time(at: chrono::DateTime<Tz>) -> Self {
        Self {
            date: None,
            date_time: Some(at.to_rfc3339_opts(SecondsFormat::Secs, false)),
            time_zone: Some(at.timezone().name().to_string()),
        }
    }
}

/// Build the remote representation of `aggregate`.
///
/// Pure: the same aggregate always yields the same payload. Timed events
/// last `duration`; all-day events end on the following day.
pub fn to_google(aggregate: &CalendarAggregate, duration: Duration) -> Result<GoogleEvent> {
    let calendar = &aggregate.calendar;
    let start = calendar
        .start()
        .map_err(|e| GcalError::Transform(e.to_string()))?;

    let (start, end) = match start {
        EventStart::Date(date) => {
            let next = date
                .succ_opt()
                .ok_or_else(|| GcalError::Transform(format!("no day after {}", date)))?;
            (EventDateTime::date(date), EventDateTime::date(next))
        }
        EventStart::DateTime { local, timezone } => {
            let start = resolve_local(local, timezone)?;
            (EventDateTime::date_time(start), EventDateTime::date_time(start + duration))
        }
    };

    Ok(GoogleEvent {
        summary: calendar.name.clone(),
        location: non_empty(calendar.location.as_deref()),
        description: describe(aggregate),
        start,
        end,
    })
}

/// Ambiguous wall times take the earlier instant; times skipped by a DST
/// jump move forward one hour.
fn resolve_local(local: NaiveDateTime, tz: Tz) -> Result<chrono::DateTime<Tz>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .ok_or_else(|| GcalError::Transform(format!("{} does not exist in {}", local, tz.name())))
}

fn describe(aggregate: &CalendarAggregate) -> Option<String> {
    let mut blocks = Vec::new();

    let mut collaborators: Vec<&LinkedCollaborator> = aggregate.collaborators.iter().collect();
    collaborators.sort_by_key(|c| (c.order, c.collaborator.id));
    let lines: Vec<String> = collaborators
        .iter()
        .map(|c| join_non_empty(&c.collaborator.name, ", ", &c.collaborator.instrument))
        .collect();
    if !lines.is_empty() {
        blocks.push(lines.join("\n"));
    }

    let mut pieces: Vec<&LinkedPiece> = aggregate.pieces.iter().collect();
    pieces.sort_by_key(|p| (p.order, p.piece.id));
    let lines: Vec<String> = pieces
        .iter()
        .map(|p| join_non_empty(&p.piece.composer, ": ", &p.piece.piece))
        .collect();
    if !lines.is_empty() {
        blocks.push(lines.join("\n"));
    }

    let calendar = &aggregate.calendar;
    blocks.extend(non_empty(calendar.description.as_deref()));
    blocks.extend(non_empty(calendar.website.as_deref()));

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}

fn join_non_empty(first: &str, sep: &str, second: &str) -> String {
    match (first.trim(), second.trim()) {
        ("", s) => s.to_string(),
        (f, "") => f.to_string(),
        (f, s) => format!("{}{}{}", f, sep, s),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
