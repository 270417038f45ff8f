//! Storage seam consumed by the directory and the automation engine.
//!
//! Implementations: the in-memory [`crate::ops::Store`] and the SQLite-backed
//! access in `tabula-store`. Calls are synchronous and in-process.

#![allow(clippy::result_large_err)]

use crate::errors::ExError;
use crate::model::{Field, NewRecord, Record, RecordPatch, Rule, Table};

pub type StoreResult<T> = std::result::Result<T, ExError>;

/// Request/response access to bases, tables, fields, records and rules
pub trait DataAccess {
    /// Rules of a base in creation order (enabled and disabled)
    fn rules_for_base(&self, base_id: &str) -> StoreResult<Vec<Rule>>;

    fn table(&self, table_id: &str) -> StoreResult<Option<Table>>;

    /// Case-insensitive lookup by table name within a base
    fn table_by_name(&self, base_id: &str, name: &str) -> StoreResult<Option<Table>>;

    /// Tables of a base in creation order
    fn tables_in_base(&self, base_id: &str) -> StoreResult<Vec<Table>>;

    /// Fields of a table ordered by position
    fn fields(&self, table_id: &str) -> StoreResult<Vec<Field>>;

    /// Fields of every table in the base, tables in creation order
    fn fields_across_base(&self, base_id: &str) -> StoreResult<Vec<Field>>;

    /// Locate an identity, preferring its non-master placement over the master row
    fn record(&self, record_id: &str) -> StoreResult<Option<Record>>;

    /// The row for `record_id` in one specific table
    fn record_in(&self, table_id: &str, record_id: &str) -> StoreResult<Option<Record>>;

    /// Insert a row
    ///
    /// # Errors
    ///
    /// `ExErrorKind::AlreadyExists` when the table already holds a row with the same id.
    fn insert_record(&mut self, record: NewRecord) -> StoreResult<Record>;

    /// Apply a patch to the row at `patch.table_id`
    ///
    /// Returns `None` when that row does not exist (the record moved or was
    /// deleted), which callers treat as a failed optimistic check.
    ///
    /// # Errors
    ///
    /// `ExErrorKind::AlreadyExists` when `move_to` already holds a row with the same id.
    fn update_record(&mut self, record_id: &str, patch: &RecordPatch)
        -> StoreResult<Option<Record>>;

    /// Remove one row; returns whether a row was removed
    fn delete_record(&mut self, table_id: &str, record_id: &str) -> StoreResult<bool>;

    /// Rows of `table_id` whose `field_id` value equals `value`
    fn find_records_by_field_value(
        &self,
        table_id: &str,
        field_id: &str,
        value: &serde_json::Value,
    ) -> StoreResult<Vec<Record>>;
}
