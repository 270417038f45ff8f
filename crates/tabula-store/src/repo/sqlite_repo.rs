//! SQLite repository for the directory entities
//!
//! Bases, tables, fields and rules are authored outside the engine; these
//! writes exist for the callers that own them and for fixtures.

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, json_error, Result};
use crate::repo::rows::{field_type_to_str, from_millis, options_to_json, to_millis};
use rusqlite::{Connection, OptionalExtension};
use tabula_core::errors::{ExError, TabulaError};
use tabula_core::model::{Base, Field, Rule, Table};

/// SQLite repository for persisting the directory
pub struct SqliteRepo;

impl SqliteRepo {
    /// Persist a base (upsert)
    pub fn persist_base(conn: &Connection, base: &Base) -> Result<()> {
        conn.execute(
            "INSERT INTO bases (id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            rusqlite::params![base.id, base.name, to_millis(&base.created_at)],
        )
        .map_err(from_rusqlite)?;

        Ok(())
    }

    /// Persist a table (upsert), enforcing one master table per base
    ///
    /// # Errors
    ///
    /// `ConstraintViolation` when another table of the base is already master.
    pub fn persist_table(conn: &Connection, table: &Table) -> Result<()> {
        if table.is_master {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM tables WHERE base_id = ?1 AND is_master = 1 AND id != ?2",
                    rusqlite::params![table.base_id, table.id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(from_rusqlite)?;
            if let Some(other) = existing {
                return Err(ExError::from(TabulaError::MultipleMasterTables {
                    base_id: table.base_id.clone(),
                    table_ids: vec![other, table.id.clone()],
                }));
            }
        }

        conn.execute(
            "INSERT INTO tables (id, base_id, name, is_master, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                is_master = excluded.is_master",
            rusqlite::params![
                table.id,
                table.base_id,
                table.name,
                table.is_master as i64,
                to_millis(&table.created_at),
            ],
        )
        .map_err(from_rusqlite)?;

        Ok(())
    }

    /// Persist a field (upsert); select options are stored as `{"choices": ...}`
    pub fn persist_field(conn: &Connection, field: &Field) -> Result<()> {
        let options = options_to_json(&field.options)?;
        let field_type = field_type_to_str(field.field_type)?;

        conn.execute(
            "INSERT INTO fields (id, table_id, name, field_type, options, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(table_id, id) DO UPDATE SET
                name = excluded.name,
                field_type = excluded.field_type,
                options = excluded.options,
                position = excluded.position",
            rusqlite::params![
                field.id,
                field.table_id,
                field.name,
                field_type,
                options,
                field.position,
            ],
        )
        .map_err(from_rusqlite)?;

        Ok(())
    }

    /// Persist a rule (upsert); trigger and action are stored as JSON
    pub fn persist_rule(conn: &Connection, rule: &Rule) -> Result<()> {
        let trigger =
            serde_json::to_string(&rule.trigger).map_err(|e| json_error("trigger_json", e))?;
        let action =
            serde_json::to_string(&rule.action).map_err(|e| json_error("action_json", e))?;

        conn.execute(
            "INSERT INTO rules (id, base_id, name, enabled, trigger_json, action_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                enabled = excluded.enabled,
                trigger_json = excluded.trigger_json,
                action_json = excluded.action_json",
            rusqlite::params![
                rule.id,
                rule.base_id,
                rule.name,
                rule.enabled as i64,
                trigger,
                action,
                to_millis(&rule.created_at),
            ],
        )
        .map_err(from_rusqlite)?;

        Ok(())
    }

    pub fn get_base(conn: &Connection, base_id: &str) -> Result<Option<Base>> {
        conn.query_row(
            "SELECT id, name, created_at FROM bases WHERE id = ?",
            [base_id],
            |row| {
                Ok(Base {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: from_millis(row.get(2)?),
                })
            },
        )
        .optional()
        .map_err(from_rusqlite)
    }
}
