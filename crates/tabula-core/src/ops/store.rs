#![allow(clippy::result_large_err)]

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use uuid::Uuid;

use crate::access::{DataAccess, StoreResult};
use crate::errors::{ExError, ExErrorKind, Result, TabulaError};
use crate::model::{names_match, Base, Field, NewRecord, Record, RecordPatch, Rule, Table};

/// In-memory store for bases, tables, fields, records and rules
///
/// A simple map-based implementation of [`DataAccess`], designed for
/// single-threaded use and for tests. Rows are keyed by (table id, record id)
/// so an identity can hold both a placement and its master mirror.
#[derive(Debug, Clone, Default)]
pub struct Store {
    pub(crate) bases: HashMap<String, Base>,
    /// Tables in creation order
    pub(crate) tables: Vec<Table>,
    pub(crate) fields: Vec<Field>,
    pub(crate) records: BTreeMap<(String, String), Record>,
    /// Rules in creation order
    pub(crate) rules: Vec<Rule>,
    /// Tables whose writes fail with a persistence error (fault injection)
    failing_tables: HashSet<String>,
}

impl Store {
    /// Create a new empty Store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_base(&mut self, base: Base) {
        self.bases.insert(base.id.clone(), base);
    }

    /// Insert a table, enforcing one master table per base
    ///
    /// # Errors
    ///
    /// Returns `MultipleMasterTables` if the base already has a master table.
    pub fn insert_table(&mut self, table: Table) -> Result<()> {
        if table.is_master {
            let existing: Vec<String> = self
                .tables
                .iter()
                .filter(|t| t.base_id == table.base_id && t.is_master && t.id != table.id)
                .map(|t| t.id.clone())
                .collect();
            if !existing.is_empty() {
                let mut table_ids = existing;
                table_ids.push(table.id.clone());
                return Err(TabulaError::MultipleMasterTables {
                    base_id: table.base_id,
                    table_ids,
                });
            }
        }
        self.tables.retain(|t| t.id != table.id);
        self.tables.push(table);
        Ok(())
    }

    pub fn insert_field(&mut self, field: Field) {
        self.fields
            .retain(|f| !(f.id == field.id && f.table_id == field.table_id));
        self.fields.push(field);
    }

    pub fn insert_rule(&mut self, rule: Rule) {
        self.rules.retain(|r| r.id != rule.id);
        self.rules.push(rule);
    }

    /// Rows of a table ordered by record id
    pub fn list_records(&self, table_id: &str) -> Vec<&Record> {
        self.records
            .values()
            .filter(|r| r.table_id == table_id)
            .collect()
    }

    pub fn record_count(&self, table_id: &str) -> usize {
        self.list_records(table_id).len()
    }

    /// Make every subsequent write to `table_id` fail
    pub fn fail_writes_to(&mut self, table_id: &str) {
        self.failing_tables.insert(table_id.to_string());
    }

    fn check_writable(&self, table_id: &str, op: &str) -> StoreResult<()> {
        if self.failing_tables.contains(table_id) {
            return Err(ExError::new(ExErrorKind::Persistence)
                .with_op(op.to_string())
                .with_table_id(table_id)
                .with_message("injected write failure"));
        }
        Ok(())
    }

    fn is_master(&self, table_id: &str) -> bool {
        self.tables.iter().any(|t| t.id == table_id && t.is_master)
    }

    fn key(table_id: &str, record_id: &str) -> (String, String) {
        (table_id.to_string(), record_id.to_string())
    }
}

impl DataAccess for Store {
    fn rules_for_base(&self, base_id: &str) -> StoreResult<Vec<Rule>> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.base_id == base_id)
            .cloned()
            .collect())
    }

    fn table(&self, table_id: &str) -> StoreResult<Option<Table>> {
        Ok(self.tables.iter().find(|t| t.id == table_id).cloned())
    }

    fn table_by_name(&self, base_id: &str, name: &str) -> StoreResult<Option<Table>> {
        Ok(self
            .tables
            .iter()
            .find(|t| t.base_id == base_id && names_match(&t.name, name))
            .cloned())
    }

    fn tables_in_base(&self, base_id: &str) -> StoreResult<Vec<Table>> {
        Ok(self
            .tables
            .iter()
            .filter(|t| t.base_id == base_id)
            .cloned()
            .collect())
    }

    fn fields(&self, table_id: &str) -> StoreResult<Vec<Field>> {
        let mut fields: Vec<Field> = self
            .fields
            .iter()
            .filter(|f| f.table_id == table_id)
            .cloned()
            .collect();
        fields.sort_by_key(|f| f.position);
        Ok(fields)
    }

    fn fields_across_base(&self, base_id: &str) -> StoreResult<Vec<Field>> {
        let mut out = Vec::new();
        for table in self.tables.iter().filter(|t| t.base_id == base_id) {
            out.extend(self.fields(&table.id)?);
        }
        Ok(out)
    }

    fn record(&self, record_id: &str) -> StoreResult<Option<Record>> {
        let mut mirror = None;
        for record in self.records.values().filter(|r| r.id == record_id) {
            if self.is_master(&record.table_id) {
                mirror = Some(record.clone());
            } else {
                return Ok(Some(record.clone()));
            }
        }
        Ok(mirror)
    }

    fn record_in(&self, table_id: &str, record_id: &str) -> StoreResult<Option<Record>> {
        Ok(self.records.get(&Self::key(table_id, record_id)).cloned())
    }

    fn insert_record(&mut self, new: NewRecord) -> StoreResult<Record> {
        self.check_writable(&new.table_id, "insert_record")?;
        let id = new.id.unwrap_or_else(|| Uuid::now_v7().to_string());
        let key = Self::key(&new.table_id, &id);
        if self.records.contains_key(&key) {
            return Err(ExError::new(ExErrorKind::AlreadyExists)
                .with_op("insert_record")
                .with_entity_id(id)
                .with_table_id(new.table_id)
                .with_message("Record already exists in table"));
        }

        let mut record = Record::new(id, new.table_id, new.values);
        record.reference_of = new.reference_of;
        self.records.insert(key, record.clone());
        Ok(record)
    }

    fn update_record(
        &mut self,
        record_id: &str,
        patch: &RecordPatch,
    ) -> StoreResult<Option<Record>> {
        self.check_writable(&patch.table_id, "update_record")?;
        let key = Self::key(&patch.table_id, record_id);
        if !self.records.contains_key(&key) {
            return Ok(None);
        }

        if let Some(target) = &patch.move_to {
            self.check_writable(target, "update_record")?;
            let target_key = Self::key(target, record_id);
            if target_key != key && self.records.contains_key(&target_key) {
                return Err(ExError::new(ExErrorKind::AlreadyExists)
                    .with_op("update_record")
                    .with_entity_id(record_id)
                    .with_table_id(target.clone())
                    .with_message("Target table already holds this record"));
            }
        }

        let Some(mut record) = self.records.remove(&key) else {
            return Ok(None);
        };
        patch.apply_to(&mut record.values);
        if let Some(target) = &patch.move_to {
            record.table_id = target.clone();
        }
        record.updated_at = Utc::now();

        let new_key = Self::key(&record.table_id, record_id);
        self.records.insert(new_key, record.clone());
        Ok(Some(record))
    }

    fn delete_record(&mut self, table_id: &str, record_id: &str) -> StoreResult<bool> {
        self.check_writable(table_id, "delete_record")?;
        Ok(self.records.remove(&Self::key(table_id, record_id)).is_some())
    }

    fn find_records_by_field_value(
        &self,
        table_id: &str,
        field_id: &str,
        value: &serde_json::Value,
    ) -> StoreResult<Vec<Record>> {
        Ok(self
            .records
            .values()
            .filter(|r| r.table_id == table_id && r.values.get(field_id) == Some(value))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordValues;
    use serde_json::json;

    fn store_with_tables() -> Store {
        let mut store = Store::new();
        store.insert_base(Base::new("base_1", "Ops"));
        store
            .insert_table(Table::new("tbl_master", "base_1", "Master").master())
            .unwrap();
        store
            .insert_table(Table::new("tbl_a", "base_1", "Intake"))
            .unwrap();
        store
            .insert_table(Table::new("tbl_b", "base_1", "Approved"))
            .unwrap();
        store
    }

    fn values(pairs: &[(&str, serde_json::Value)]) -> RecordValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_second_master_table_is_rejected() {
        let mut store = store_with_tables();
        let err = store
            .insert_table(Table::new("tbl_m2", "base_1", "Other").master())
            .unwrap_err();
        assert!(matches!(err, TabulaError::MultipleMasterTables { .. }));
    }

    #[test]
    fn test_insert_conflict_reports_already_exists() {
        let mut store = store_with_tables();
        store
            .insert_record(NewRecord::new("tbl_a", RecordValues::new()).with_id("rec_1"))
            .unwrap();
        let err = store
            .insert_record(NewRecord::new("tbl_a", RecordValues::new()).with_id("rec_1"))
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::AlreadyExists);
    }

    #[test]
    fn test_record_prefers_non_master_placement() {
        let mut store = store_with_tables();
        store
            .insert_record(NewRecord::new("tbl_master", RecordValues::new()).with_id("rec_1"))
            .unwrap();
        store
            .insert_record(NewRecord::new("tbl_a", RecordValues::new()).with_id("rec_1"))
            .unwrap();

        let located = store.record("rec_1").unwrap().unwrap();
        assert_eq!(located.table_id, "tbl_a");
    }

    #[test]
    fn test_update_with_stale_table_returns_none() {
        let mut store = store_with_tables();
        store
            .insert_record(NewRecord::new("tbl_a", RecordValues::new()).with_id("rec_1"))
            .unwrap();

        let patch = RecordPatch::merge("tbl_b", values(&[("f", json!(1))]));
        assert!(store.update_record("rec_1", &patch).unwrap().is_none());
    }

    #[test]
    fn test_relocation_moves_row_in_place() {
        let mut store = store_with_tables();
        store
            .insert_record(
                NewRecord::new("tbl_a", values(&[("a_name", json!("Acme"))])).with_id("rec_1"),
            )
            .unwrap();

        let patch = RecordPatch::relocate("tbl_a", "tbl_b", values(&[("b_name", json!("Acme"))]));
        let moved = store.update_record("rec_1", &patch).unwrap().unwrap();

        assert_eq!(moved.table_id, "tbl_b");
        assert!(store.record_in("tbl_a", "rec_1").unwrap().is_none());
        assert_eq!(moved.values, values(&[("b_name", json!("Acme"))]));
    }

    #[test]
    fn test_injected_failure_blocks_writes() {
        let mut store = store_with_tables();
        store.fail_writes_to("tbl_b");
        let err = store
            .insert_record(NewRecord::new("tbl_b", RecordValues::new()))
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Persistence);
    }
}
