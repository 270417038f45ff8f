//! Row <-> model conversions shared by the repository and the access layer

#![allow(clippy::result_large_err)]

use chrono::{DateTime, Utc};
use rusqlite::Row;
use tabula_core::model::{Field, FieldOptions, FieldType, Record, RecordValues, Rule, Table};

use crate::errors::{json_error, Result};

pub(crate) const TABLE_COLUMNS: &str = "id, base_id, name, is_master, created_at";
pub(crate) const FIELD_COLUMNS: &str = "id, table_id, name, field_type, options, position";
pub(crate) const RECORD_COLUMNS: &str =
    "r.id, r.table_id, r.data, r.reference_of, r.created_at, r.updated_at";
pub(crate) const RULE_COLUMNS: &str =
    "id, base_id, name, enabled, trigger_json, action_json, created_at";

pub(crate) fn to_millis(at: &DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

pub(crate) fn table_from_row(row: &Row<'_>) -> rusqlite::Result<Table> {
    Ok(Table {
        id: row.get(0)?,
        base_id: row.get(1)?,
        name: row.get(2)?,
        is_master: row.get::<_, i64>(3)? != 0,
        created_at: from_millis(row.get(4)?),
    })
}

/// Field columns before option validation
pub(crate) struct RawField {
    id: String,
    table_id: String,
    name: String,
    field_type: String,
    options: Option<String>,
    position: u32,
}

pub(crate) fn raw_field_from_row(row: &Row<'_>) -> rusqlite::Result<RawField> {
    Ok(RawField {
        id: row.get(0)?,
        table_id: row.get(1)?,
        name: row.get(2)?,
        field_type: row.get(3)?,
        options: row.get(4)?,
        position: row.get(5)?,
    })
}

impl RawField {
    /// Parse the type and validate the stored options payload
    pub(crate) fn into_field(self) -> Result<Field> {
        let field_type: FieldType =
            serde_json::from_value(serde_json::Value::String(self.field_type))
                .map_err(|e| json_error("field_type", e))?;
        let raw = match &self.options {
            Some(text) => Some(
                serde_json::from_str::<serde_json::Value>(text)
                    .map_err(|e| json_error("options", e))?,
            ),
            None => None,
        };
        let options = FieldOptions::from_raw(&self.id, field_type, raw.as_ref())?;
        Ok(Field {
            id: self.id,
            table_id: self.table_id,
            name: self.name,
            field_type,
            options,
            position: self.position,
        })
    }
}

/// Stored shape of field options: `{"choices": {"<id>": {label, color}}}`
pub(crate) fn options_to_json(options: &FieldOptions) -> Result<Option<String>> {
    match options.choices() {
        Some(choices) => serde_json::to_string(&serde_json::json!({ "choices": choices }))
            .map(Some)
            .map_err(|e| json_error("options", e)),
        None => Ok(None),
    }
}

pub(crate) fn field_type_to_str(field_type: FieldType) -> Result<String> {
    match serde_json::to_value(field_type).map_err(|e| json_error("field_type", e))? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

pub(crate) struct RawRecord {
    id: String,
    table_id: String,
    data: String,
    reference_of: Option<String>,
    created_at: i64,
    updated_at: i64,
}

pub(crate) fn raw_record_from_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        table_id: row.get(1)?,
        data: row.get(2)?,
        reference_of: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl RawRecord {
    pub(crate) fn into_record(self) -> Result<Record> {
        let values: RecordValues =
            serde_json::from_str(&self.data).map_err(|e| json_error("data", e))?;
        Ok(Record {
            id: self.id,
            table_id: self.table_id,
            values,
            reference_of: self.reference_of,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

pub(crate) struct RawRule {
    id: String,
    base_id: String,
    name: String,
    enabled: bool,
    trigger: String,
    action: String,
    created_at: i64,
}

pub(crate) fn raw_rule_from_row(row: &Row<'_>) -> rusqlite::Result<RawRule> {
    Ok(RawRule {
        id: row.get(0)?,
        base_id: row.get(1)?,
        name: row.get(2)?,
        enabled: row.get::<_, i64>(3)? != 0,
        trigger: row.get(4)?,
        action: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl RawRule {
    pub(crate) fn into_rule(self) -> Result<Rule> {
        Ok(Rule {
            id: self.id,
            base_id: self.base_id,
            name: self.name,
            enabled: self.enabled,
            trigger: serde_json::from_str(&self.trigger)
                .map_err(|e| json_error("trigger_json", e))?,
            action: serde_json::from_str(&self.action)
                .map_err(|e| json_error("action_json", e))?,
            created_at: from_millis(self.created_at),
        })
    }
}
