//! Pieces, collaborators and programs

use rusqlite::Row;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::store::{Entity, EntityKind};
use crate::{Error, Result};

/// A work in the repertoire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    #[serde(default)]
    pub id: i64,
    pub composer: String,
    /// Title of the work
    pub piece: String,
}

impl Piece {
    pub fn new(composer: impl Into<String>, piece: impl Into<String>) -> Self {
        Self {
            id: 0,
            composer: composer.into(),
            piece: piece.into(),
        }
    }
}

impl Entity for Piece {
    const KIND: EntityKind = EntityKind::Piece;
    const TABLE: &'static str = "pieces";
    const COLUMNS: &'static [&'static str] = &["composer", "piece"];
    const SEARCH_COLUMNS: &'static [&'static str] = &["composer", "piece"];
    const ORDER_BY: &'static str = "composer";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            composer: row.get("composer")?,
            piece: row.get("piece")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.composer.trim().to_string()),
            Value::Text(self.piece.trim().to_string()),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.piece.trim().is_empty() {
            return Err(Error::validation(Self::KIND.as_str(), "piece title is required"));
        }
        Ok(())
    }
}

/// A fellow performer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub instrument: String,
}

impl Collaborator {
    pub fn new(name: impl Into<String>, instrument: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            instrument: instrument.into(),
        }
    }
}

impl Entity for Collaborator {
    const KIND: EntityKind = EntityKind::Collaborator;
    const TABLE: &'static str = "collaborators";
    const COLUMNS: &'static [&'static str] = &["name", "instrument"];
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "instrument"];
    const ORDER_BY: &'static str = "name";

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
            instrument: row.get("instrument")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.trim().to_string()),
            Value::Text(self.instrument.trim().to_string()),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation(Self::KIND.as_str(), "name is required"));
        }
        Ok(())
    }
}

/// A named, ordered set of pieces that can be applied to a calendar event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub id: i64,
    pub name: String,
}

impl Entity for Program {
    const KIND: EntityKind = EntityKind::Program;
    const TABLE: &'static str = "programs";
    const COLUMNS: &'static [&'static str] = &["name"];
    const SEARCH_COLUMNS: &'static [&'static str] = &["name"];
    const ORDER_BY: &'static str = "name";

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
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.trim().to_string())]
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation(Self::KIND.as_str(), "name is required"));
        }
        Ok(())
    }
}
