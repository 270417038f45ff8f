use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sparse map of field id -> value
///
/// Keys are always ids of the owning table's fields. An absent key means the
/// value is undefined; `Null` and `""` are explicit clears.
pub type RecordValues = BTreeMap<String, serde_json::Value>;

/// Record - a row of one table
///
/// Identity is the `id`. An identity has at most one placement in a
/// non-master table plus its mirror row in the master table; both rows
/// carry the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub table_id: String,
    pub values: RecordValues,
    /// Identity of the record this one was derived from (reference actions)
    pub reference_of: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(id: impl Into<String>, table_id: impl Into<String>, values: RecordValues) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            table_id: table_id.into(),
            values,
            reference_of: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn value(&self, field_id: &str) -> Option<&serde_json::Value> {
        self.values.get(field_id)
    }
}

/// Insert request for `DataAccess::insert_record`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewRecord {
    /// Explicit identity; a fresh UUID v7 is generated when absent
    pub id: Option<String>,
    pub table_id: String,
    pub values: RecordValues,
    pub reference_of: Option<String>,
}

impl NewRecord {
    pub fn new(table_id: impl Into<String>, values: RecordValues) -> Self {
        Self {
            id: None,
            table_id: table_id.into(),
            values,
            reference_of: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn referencing(mut self, source_id: impl Into<String>) -> Self {
        self.reference_of = Some(source_id.into());
        self
    }
}

/// How an update combines new values with the stored ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Overwrite only the given keys
    #[default]
    Merge,
    /// Replace the whole value map (required when the owning table changes)
    Replace,
}

/// Update request for `DataAccess::update_record`
///
/// `table_id` is the placement the update applies to and doubles as the
/// optimistic check: the update only applies while the record is still in
/// that table. `move_to` changes the owning table in place.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPatch {
    pub table_id: String,
    pub move_to: Option<String>,
    pub values: RecordValues,
    pub mode: WriteMode,
}

impl RecordPatch {
    pub fn merge(table_id: impl Into<String>, values: RecordValues) -> Self {
        Self {
            table_id: table_id.into(),
            move_to: None,
            values,
            mode: WriteMode::Merge,
        }
    }

    /// Move the placement to `target_table_id`, replacing its values
    pub fn relocate(
        table_id: impl Into<String>,
        target_table_id: impl Into<String>,
        values: RecordValues,
    ) -> Self {
        Self {
            table_id: table_id.into(),
            move_to: Some(target_table_id.into()),
            values,
            mode: WriteMode::Replace,
        }
    }

    /// Apply this patch to a stored value map
    pub fn apply_to(&self, current: &mut RecordValues) {
        match self.mode {
            WriteMode::Merge => {
                for (k, v) in &self.values {
                    current.insert(k.clone(), v.clone());
                }
            }
            WriteMode::Replace => *current = self.values.clone(),
        }
    }
}
