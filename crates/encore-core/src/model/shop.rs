//! Shop catalogue

use rusqlite::Row;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::store::{Entity, EntityKind, opt_text};
use crate::{Error, Result};

/// A purchasable item, priced in the smallest currency unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: i64,
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: String,
    pub price_cents: i64,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Entity for Product {
    const KIND: EntityKind = EntityKind::Product;
    const TABLE: &'static str = "products";
    const COLUMNS: &'static [&'static str] = &[
        "sku",
        "name",
        "description",
        "category",
        "price_cents",
        "image_url",
    ];
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "description", "sku"];
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
            sku: row.get("sku")?,
            name: row.get("name")?,
            description: row.get("description")?,
            category: row.get("category")?,
            price_cents: row.get("price_cents")?,
            image_url: row.get("image_url")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.sku.trim().to_string()),
            Value::Text(self.name.trim().to_string()),
            opt_text(&self.description),
            Value::Text(self.category.trim().to_string()),
            Value::Integer(self.price_cents),
            opt_text(&self.image_url),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.sku.trim().is_empty() {
            return Err(Error::validation(Self::KIND.as_str(), "sku is required"));
        }
        if self.price_cents < 0 {
            return Err(Error::validation(Self::KIND.as_str(), "price_cents must not be negative"));
        }
        Ok(())
    }
}
