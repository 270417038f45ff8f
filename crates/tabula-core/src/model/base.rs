use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base - top-level container of tables and rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Base {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Base {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
