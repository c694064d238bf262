//! Calendar events and their ordered pieces/collaborators

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rusqlite::Row;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use super::{Collaborator, Piece, format_date_time, get_date_time};
use crate::store::{Entity, EntityKind, opt_text};
use crate::{Error, Result};

/// A performance or other dated event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
    #[serde(default)]
    pub id: i64,
    /// Event title
    pub name: String,
    /// Local wall-clock start in `timezone`; only the date is used for all-day events
    pub date_time: NaiveDateTime,
    #[serde(default)]
    pub all_day: bool,
    /// IANA zone name, e.g. `America/Chicago`
    pub timezone: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub use_place_photo: bool,
    #[serde(default)]
    pub photo_reference: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Remote event id; written only by the sync dispatcher
    #[serde(default)]
    pub google_id: Option<String>,
}

/// Start of an event as the remote calendar needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStart {
    Date(NaiveDate),
    DateTime { local: NaiveDateTime, timezone: Tz },
}

impl Calendar {
    pub fn new(name: impl Into<String>, date_time: NaiveDateTime, timezone: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            date_time,
            all_day: false,
            timezone: timezone.into(),
            location: None,
            description: None,
            website: None,
            use_place_photo: false,
            photo_reference: None,
            image_url: None,
            google_id: None,
        }
    }

    /// All-day event on `date`.
    pub fn all_day(name: impl Into<String>, date: NaiveDate, timezone: impl Into<String>) -> Self {
        let mut calendar = Self::new(name, date.and_time(chrono::NaiveTime::MIN), timezone);
        calendar.all_day = true;
        calendar
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|_| {
            Error::validation(
                Self::KIND.as_str(),
                format!("unknown timezone `{}`", self.timezone),
            )
        })
    }

    /// True while the event's date has not passed in its own timezone.
    ///
    /// Events stay upcoming for the whole of their local day.
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        let today = match self.tz() {
            Ok(tz) => now.with_timezone(&tz).date_naive(),
            Err(_) => now.date_naive(),
        };
        self.date_time.date() >= today
    }

    pub fn start(&self) -> Result<EventStart> {
        if self.all_day {
            return Ok(EventStart::Date(self.date_time.date()));
        }
        Ok(EventStart::DateTime {
            local: self.date_time,
            timezone: self.tz()?,
        })
    }
}

impl Entity for Calendar {
    const KIND: EntityKind = EntityKind::Calendar;
    const TABLE: &'static str = "calendars";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "date_time",
        "all_day",
        "timezone",
        "location",
        "description",
        "website",
        "use_place_photo",
        "photo_reference",
        "image_url",
    ];
    const READ_ONLY_COLUMNS: &'static [&'static str] = &["google_id"];
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "location", "description"];
    const ORDER_BY: &'static str = "date_time";
    const ORDER_DESC: bool = true;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            date_time: get_date_time(row, "date_time")?,
            all_day: row.get("all_day")?,
            timezone: row.get("timezone")?,
            location: row.get("location")?,
            description: row.get("description")?,
            website: row.get("website")?,
            use_place_photo: row.get("use_place_photo")?,
            photo_reference: row.get("photo_reference")?,
            image_url: row.get("image_url")?,
            google_id: row.get("google_id")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        let date_time = if self.all_day {
            self.date_time.date().and_time(chrono::NaiveTime::MIN)
        } else {
            self.date_time
        };
        vec![
            Value::Text(self.name.trim().to_string()),
            Value::Text(format_date_time(&date_time)),
            Value::from(self.all_day),
            Value::Text(self.timezone.trim().to_string()),
            opt_text(&self.location),
            opt_text(&self.description),
            opt_text(&self.website),
            Value::from(self.use_place_photo),
            opt_text(&self.photo_reference),
            opt_text(&self.image_url),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation(Self::KIND.as_str(), "name is required"));
        }
        self.tz().map(|_| ())
    }
}

/// A piece attached to a calendar or program, with its display position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedPiece {
    pub order: i64,
    #[serde(flatten)]
    pub piece: Piece,
}

/// A collaborator attached to a calendar, with its display position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedCollaborator {
    pub order: i64,
    #[serde(flatten)]
    pub collaborator: Collaborator,
}

/// A calendar with its pieces and collaborators, each sorted by `order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarAggregate {
    #[serde(flatten)]
    pub calendar: Calendar,
    pub pieces: Vec<LinkedPiece>,
    pub collaborators: Vec<LinkedCollaborator>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, super::super::DATE_TIME_FORMAT).unwrap()
    }

    #[test]
    fn test_timed_start() {
        let calendar = Calendar::new("Recital", dt("2024-05-01T19:30:00"), "America/Chicago");
        let start = calendar.start().unwrap();
        assert_eq!(
            start,
            EventStart::DateTime {
                local: dt("2024-05-01T19:30:00"),
                timezone: chrono_tz::America::Chicago,
            }
        );
    }

    #[test]
    fn test_all_day_start_ignores_time() {
        let mut calendar = Calendar::new("Masterclass", dt("2024-05-02T10:00:00"), "Europe/Berlin");
        calendar.all_day = true;
        assert_eq!(
            calendar.start().unwrap(),
            EventStart::Date(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap())
        );
    }

    #[test]
    fn test_upcoming_uses_the_event_timezone() {
        // 03:00 UTC on May 2 is still the evening of May 1 in Chicago.
        let now = DateTime::parse_from_rfc3339("2024-05-02T03:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let chicago = Calendar::new("Recital", dt("2024-05-01T19:30:00"), "America/Chicago");
        assert!(chicago.is_upcoming(now));

        let berlin = Calendar::new("Recital", dt("2024-05-01T19:30:00"), "Europe/Berlin");
        assert!(!berlin.is_upcoming(now));

        let tokyo = Calendar::new("Recital", dt("2024-05-02T10:00:00"), "Asia/Tokyo");
        assert!(tokyo.is_upcoming(now));
    }

    #[test]
    fn test_unknown_timezone_fails_validation() {
        let calendar = Calendar::new("Recital", dt("2024-05-01T19:30:00"), "Mars/Olympus");
        assert!(matches!(calendar.validate(), Err(Error::Validation { .. })));
    }

    #[test]
    fn test_empty_optional_text_is_stored_as_null() {
        let calendar = Calendar::new("Recital", dt("2024-05-01T19:30:00"), "UTC").with_location("  ");
        assert_eq!(calendar.to_values()[4], Value::Null);
    }

    #[test]
    fn test_aggregate_json_is_flat() {
        let aggregate = CalendarAggregate {
            calendar: Calendar::new("Recital", dt("2024-05-01T19:30:00"), "UTC"),
            pieces: vec![LinkedPiece {
                order: 0,
                piece: Piece::new("Bach", "Partita No. 2"),
            }],
            collaborators: Vec::new(),
        };
        let json = serde_json::to_value(&aggregate).unwrap();
        assert_eq!(json["name"], "Recital");
        assert_eq!(json["pieces"][0]["composer"], "Bach");
        assert_eq!(json["pieces"][0]["order"], 0);
    }
}
