use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::field::names_match;

/// Table - named collection of fields and records within a base
///
/// The table name is the stable key rules use to refer to it. At most one
/// table per base carries the master flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub base_id: String,
    pub name: String,
    pub is_master: bool,
    pub created_at: DateTime<Utc>,
}

impl Table {
    pub fn new(id: impl Into<String>, base_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_id: base_id.into(),
            name: name.into(),
            is_master: false,
            created_at: Utc::now(),
        }
    }

    /// Mark this table as the base's master table
    pub fn master(mut self) -> Self {
        self.is_master = true;
        self
    }

    /// Whether `name` refers to this table (case-insensitive, trimmed)
    pub fn is_named(&self, name: &str) -> bool {
        names_match(&self.name, name)
    }
}
