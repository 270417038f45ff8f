//! `DataAccess` over a SQLite connection
//!
//! Works on a plain `Connection` or on an open `Transaction` (which derefs to
//! one), so engine commands can run the mutation, the direct sync and the
//! automation pass in a single transaction.

#![allow(clippy::result_large_err)]

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tabula_core::access::{DataAccess, StoreResult};
use tabula_core::errors::{ExError, ExErrorKind};
use tabula_core::model::{names_match, Field, NewRecord, Record, RecordPatch, Rule, Table};
use uuid::Uuid;

use crate::errors::{from_rusqlite, json_error};
use crate::repo::rows::{
    raw_field_from_row, raw_record_from_row, raw_rule_from_row, table_from_row, to_millis,
    FIELD_COLUMNS, RECORD_COLUMNS, RULE_COLUMNS, TABLE_COLUMNS,
};

/// SQLite-backed [`DataAccess`]
pub struct SqliteAccess<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteAccess<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Rows of a table ordered by record id
    pub fn list_records(&self, table_id: &str) -> StoreResult<Vec<Record>> {
        self.query_records(
            &format!("SELECT {RECORD_COLUMNS} FROM records r WHERE r.table_id = ?1 ORDER BY r.id"),
            rusqlite::params![table_id],
        )
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Vec<Record>> {
        let mut stmt = self.conn.prepare(sql).map_err(from_rusqlite)?;
        let raws = stmt
            .query_map(params, raw_record_from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        raws.into_iter().map(|raw| raw.into_record()).collect()
    }

    fn query_tables(&self, sql: &str, params: impl rusqlite::Params) -> StoreResult<Vec<Table>> {
        let mut stmt = self.conn.prepare(sql).map_err(from_rusqlite)?;
        let tables = stmt
            .query_map(params, table_from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        Ok(tables)
    }
}

fn encode_values(record: &Record) -> StoreResult<String> {
    serde_json::to_string(&record.values).map_err(|e| json_error("data", e))
}

impl DataAccess for SqliteAccess<'_> {
    fn rules_for_base(&self, base_id: &str) -> StoreResult<Vec<Rule>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {RULE_COLUMNS} FROM rules WHERE base_id = ?1 ORDER BY created_at, rowid"
            ))
            .map_err(from_rusqlite)?;
        let raws = stmt
            .query_map([base_id], raw_rule_from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        raws.into_iter().map(|raw| raw.into_rule()).collect()
    }

    fn table(&self, table_id: &str) -> StoreResult<Option<Table>> {
        self.conn
            .query_row(
                &format!("SELECT {TABLE_COLUMNS} FROM tables WHERE id = ?1"),
                [table_id],
                table_from_row,
            )
            .optional()
            .map_err(from_rusqlite)
    }

    fn table_by_name(&self, base_id: &str, name: &str) -> StoreResult<Option<Table>> {
        Ok(self
            .tables_in_base(base_id)?
            .into_iter()
            .find(|t| names_match(&t.name, name)))
    }

    fn tables_in_base(&self, base_id: &str) -> StoreResult<Vec<Table>> {
        self.query_tables(
            &format!(
                "SELECT {TABLE_COLUMNS} FROM tables WHERE base_id = ?1 ORDER BY created_at, rowid"
            ),
            [base_id],
        )
    }

    fn fields(&self, table_id: &str) -> StoreResult<Vec<Field>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {FIELD_COLUMNS} FROM fields WHERE table_id = ?1 ORDER BY position, rowid"
            ))
            .map_err(from_rusqlite)?;
        let raws = stmt
            .query_map([table_id], raw_field_from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        raws.into_iter().map(|raw| raw.into_field()).collect()
    }

    fn fields_across_base(&self, base_id: &str) -> StoreResult<Vec<Field>> {
        let mut out = Vec::new();
        for table in self.tables_in_base(base_id)? {
            out.extend(self.fields(&table.id)?);
        }
        Ok(out)
    }

    fn record(&self, record_id: &str) -> StoreResult<Option<Record>> {
        let mut found = self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM records r
                 JOIN tables t ON t.id = r.table_id
                 WHERE r.id = ?1
                 ORDER BY t.is_master ASC
                 LIMIT 1"
            ),
            [record_id],
        )?;
        Ok(found.pop())
    }

    fn record_in(&self, table_id: &str, record_id: &str) -> StoreResult<Option<Record>> {
        let mut found = self.query_records(
            &format!("SELECT {RECORD_COLUMNS} FROM records r WHERE r.table_id = ?1 AND r.id = ?2"),
            [table_id, record_id],
        )?;
        Ok(found.pop())
    }

    fn insert_record(&mut self, new: NewRecord) -> StoreResult<Record> {
        let id = new.id.unwrap_or_else(|| Uuid::now_v7().to_string());
        let mut record = Record::new(id, new.table_id, new.values);
        record.reference_of = new.reference_of;
        let data = encode_values(&record)?;

        self.conn
            .execute(
                "INSERT INTO records (table_id, id, data, reference_of, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    record.table_id,
                    record.id,
                    data,
                    record.reference_of,
                    to_millis(&record.created_at),
                    to_millis(&record.updated_at),
                ],
            )
            .map_err(|e| {
                from_rusqlite(e)
                    .with_op("insert_record")
                    .with_entity_id(record.id.clone())
                    .with_table_id(record.table_id.clone())
            })?;

        Ok(record)
    }

    fn update_record(
        &mut self,
        record_id: &str,
        patch: &RecordPatch,
    ) -> StoreResult<Option<Record>> {
        let Some(mut record) = self.record_in(&patch.table_id, record_id)? else {
            return Ok(None);
        };

        if let Some(target) = &patch.move_to {
            if target != &patch.table_id && self.record_in(target, record_id)?.is_some() {
                return Err(ExError::new(ExErrorKind::AlreadyExists)
                    .with_op("update_record")
                    .with_entity_id(record_id)
                    .with_table_id(target.clone())
                    .with_message("Target table already holds this record"));
            }
            record.table_id = target.clone();
        }
        patch.apply_to(&mut record.values);
        record.updated_at = Utc::now();
        let data = encode_values(&record)?;

        // The WHERE clause on the old placement is the optimistic check
        let changed = self
            .conn
            .execute(
                "UPDATE records SET table_id = ?1, data = ?2, updated_at = ?3
                 WHERE table_id = ?4 AND id = ?5",
                rusqlite::params![
                    record.table_id,
                    data,
                    to_millis(&record.updated_at),
                    patch.table_id,
                    record_id,
                ],
            )
            .map_err(|e| {
                from_rusqlite(e)
                    .with_op("update_record")
                    .with_entity_id(record_id)
                    .with_table_id(patch.table_id.clone())
            })?;

        Ok((changed > 0).then_some(record))
    }

    fn delete_record(&mut self, table_id: &str, record_id: &str) -> StoreResult<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM records WHERE table_id = ?1 AND id = ?2",
                [table_id, record_id],
            )
            .map_err(from_rusqlite)?;
        Ok(removed > 0)
    }

    fn find_records_by_field_value(
        &self,
        table_id: &str,
        field_id: &str,
        value: &serde_json::Value,
    ) -> StoreResult<Vec<Record>> {
        Ok(self
            .list_records(table_id)?
            .into_iter()
            .filter(|r| r.values.get(field_id) == Some(value))
            .collect())
    }
}
