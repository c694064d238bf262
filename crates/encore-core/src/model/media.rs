//! Site content: biography, press, recordings, photos

use chrono::NaiveDate;
use rusqlite::Row;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use super::{DATE_FORMAT, get_opt_date};
use crate::store::{Entity, EntityKind, opt_text};
use crate::{Error, Result};

macro_rules! entity_id {
    () => {
        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    };
}

/// One paragraph of the biography
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bio {
    #[serde(default)]
    pub id: i64,
    pub paragraph: String,
    #[serde(default)]
    pub paragraph_order: i64,
}

impl Entity for Bio {
    const KIND: EntityKind = EntityKind::Bio;
    const TABLE: &'static str = "bios";
    const COLUMNS: &'static [&'static str] = &["paragraph", "paragraph_order"];
    const ORDER_BY: &'static str = "paragraph_order";

    entity_id!();

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            paragraph: row.get("paragraph")?,
            paragraph_order: row.get("paragraph_order")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.paragraph.clone()),
            Value::Integer(self.paragraph_order),
        ]
    }
}

/// A press quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acclaim {
    #[serde(default)]
    pub id: i64,
    pub quote: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub website: Option<String>,
    /// Short quotes rotate on the home page
    #[serde(default)]
    pub short: bool,
}

impl Entity for Acclaim {
    const KIND: EntityKind = EntityKind::Acclaim;
    const TABLE: &'static str = "acclaims";
    const COLUMNS: &'static [&'static str] = &["quote", "author", "website", "short"];
    const SEARCH_COLUMNS: &'static [&'static str] = &["quote", "author"];

    entity_id!();

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            quote: row.get("quote")?,
            author: row.get("author")?,
            website: row.get("website")?,
            short: row.get("short")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.quote.clone()),
            Value::Text(self.author.trim().to_string()),
            opt_text(&self.website),
            Value::from(self.short),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.quote.trim().is_empty() {
            return Err(Error::validation(Self::KIND.as_str(), "quote is required"));
        }
        Ok(())
    }
}

/// A released recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disc {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub buy_url: Option<String>,
}

impl Entity for Disc {
    const KIND: EntityKind = EntityKind::Disc;
    const TABLE: &'static str = "discs";
    const COLUMNS: &'static [&'static str] = &[
        "title",
        "label",
        "release_date",
        "description",
        "image_url",
        "buy_url",
    ];
    const SEARCH_COLUMNS: &'static [&'static str] = &["title", "label", "description"];
    const ORDER_BY: &'static str = "release_date";
    const ORDER_DESC: bool = true;

    entity_id!();

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            label: row.get("label")?,
            release_date: get_opt_date(row, "release_date")?,
            description: row.get("description")?,
            image_url: row.get("image_url")?,
            buy_url: row.get("buy_url")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.title.trim().to_string()),
            opt_text(&self.label),
            self.release_date
                .map(|d| Value::Text(d.format(DATE_FORMAT).to_string()))
                .unwrap_or(Value::Null),
            opt_text(&self.description),
            opt_text(&self.image_url),
            opt_text(&self.buy_url),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation(Self::KIND.as_str(), "title is required"));
        }
        Ok(())
    }
}

/// A listenable track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Music {
    #[serde(default)]
    pub id: i64,
    pub composer: String,
    pub piece: String,
    #[serde(default)]
    pub contributors: Option<String>,
    /// Grouping on the music page, e.g. `solo`, `concerto`
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl Entity for Music {
    const KIND: EntityKind = EntityKind::Music;
    const TABLE: &'static str = "music";
    const COLUMNS: &'static [&'static str] = &[
        "composer",
        "piece",
        "contributors",
        "category",
        "year",
        "audio_url",
    ];
    const SEARCH_COLUMNS: &'static [&'static str] = &["composer", "piece", "contributors"];
    const ORDER_BY: &'static str = "composer";

    entity_id!();

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            composer: row.get("composer")?,
            piece: row.get("piece")?,
            contributors: row.get("contributors")?,
            category: row.get("category")?,
            year: row.get("year")?,
            audio_url: row.get("audio_url")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.composer.trim().to_string()),
            Value::Text(self.piece.trim().to_string()),
            opt_text(&self.contributors),
            Value::Text(self.category.trim().to_string()),
            self.year.map(|y| Value::Integer(i64::from(y))).unwrap_or(Value::Null),
            opt_text(&self.audio_url),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.piece.trim().is_empty() {
            return Err(Error::validation(Self::KIND.as_str(), "piece is required"));
        }
        Ok(())
    }
}

/// A gallery photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    #[serde(default)]
    pub id: i64,
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub credit: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub omit_from_gallery: bool,
}

impl Entity for Photo {
    const KIND: EntityKind = EntityKind::Photo;
    const TABLE: &'static str = "photos";
    const COLUMNS: &'static [&'static str] = &[
        "url",
        "caption",
        "credit",
        "category",
        "width",
        "height",
        "omit_from_gallery",
    ];
    const SEARCH_COLUMNS: &'static [&'static str] = &["caption", "credit"];

    entity_id!();

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            url: row.get("url")?,
            caption: row.get("caption")?,
            credit: row.get("credit")?,
            category: row.get("category")?,
            width: row.get("width")?,
            height: row.get("height")?,
            omit_from_gallery: row.get("omit_from_gallery")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.url.trim().to_string()),
            opt_text(&self.caption),
            opt_text(&self.credit),
            Value::Text(self.category.trim().to_string()),
            self.width.map(Value::Integer).unwrap_or(Value::Null),
            self.height.map(Value::Integer).unwrap_or(Value::Null),
            Value::from(self.omit_from_gallery),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::validation(Self::KIND.as_str(), "url is required"));
        }
        Ok(())
    }
}
