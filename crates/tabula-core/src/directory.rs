//! Field/Table directory
//!
//! Read-only lookups of tables, master tables and fields, cached for the
//! lifetime of one `Directory`. The orchestrator builds a fresh directory per
//! mutation pass; long-lived holders must call [`Directory::invalidate`] after
//! any schema change.

use std::collections::{BTreeMap, HashMap};

use crate::access::DataAccess;
use crate::errors::{Result, TabulaError};
use crate::model::{normalize_name, Field, Table};

#[derive(Debug, Default)]
pub struct Directory {
    tables: HashMap<String, Table>,
    masters: HashMap<String, Option<Table>>,
    fields: HashMap<String, Vec<Field>>,
    base_fields: HashMap<String, Vec<Field>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached entry
    pub fn invalidate(&mut self) {
        self.tables.clear();
        self.masters.clear();
        self.fields.clear();
        self.base_fields.clear();
    }

    /// # Errors
    ///
    /// `TableNotFound` when no table has this id.
    pub fn table(&mut self, access: &dyn DataAccess, table_id: &str) -> Result<Table> {
        if let Some(table) = self.tables.get(table_id) {
            return Ok(table.clone());
        }
        let table = access
            .table(table_id)?
            .ok_or_else(|| TabulaError::TableNotFound {
                table_id: table_id.to_string(),
            })?;
        self.tables.insert(table.id.clone(), table.clone());
        Ok(table)
    }

    pub fn table_by_name(
        &mut self,
        access: &dyn DataAccess,
        base_id: &str,
        name: &str,
    ) -> Result<Option<Table>> {
        if let Some(table) = self
            .tables
            .values()
            .find(|t| t.base_id == base_id && t.is_named(name))
        {
            return Ok(Some(table.clone()));
        }
        let table = access.table_by_name(base_id, name)?;
        if let Some(t) = &table {
            self.tables.insert(t.id.clone(), t.clone());
        }
        Ok(table)
    }

    /// The base's master table, if it has one
    ///
    /// # Errors
    ///
    /// `MultipleMasterTables` when the one-master invariant is broken in storage.
    pub fn master_table(
        &mut self,
        access: &dyn DataAccess,
        base_id: &str,
    ) -> Result<Option<Table>> {
        if let Some(master) = self.masters.get(base_id) {
            return Ok(master.clone());
        }
        let masters: Vec<Table> = access
            .tables_in_base(base_id)?
            .into_iter()
            .filter(|t| t.is_master)
            .collect();
        if masters.len() > 1 {
            return Err(TabulaError::MultipleMasterTables {
                base_id: base_id.to_string(),
                table_ids: masters.into_iter().map(|t| t.id).collect(),
            });
        }
        let master = masters.into_iter().next();
        self.masters.insert(base_id.to_string(), master.clone());
        Ok(master)
    }

    /// Fields of a table ordered by position
    pub fn fields(&mut self, access: &dyn DataAccess, table_id: &str) -> Result<Vec<Field>> {
        if let Some(fields) = self.fields.get(table_id) {
            return Ok(fields.clone());
        }
        let fields = access.fields(table_id)?;
        self.fields.insert(table_id.to_string(), fields.clone());
        Ok(fields)
    }

    pub fn field_by_name(
        &mut self,
        access: &dyn DataAccess,
        table_id: &str,
        name: &str,
    ) -> Result<Option<Field>> {
        Ok(self
            .fields(access, table_id)?
            .into_iter()
            .find(|f| f.is_named(name)))
    }

    /// Normalized field name -> field id for one table
    pub fn name_index(
        &mut self,
        access: &dyn DataAccess,
        table_id: &str,
    ) -> Result<BTreeMap<String, String>> {
        let mut index = BTreeMap::new();
        for field in self.fields(access, table_id)? {
            // first field wins when a table repeats a name
            index.entry(normalize_name(&field.name)).or_insert(field.id);
        }
        Ok(index)
    }

    /// Fields of every table in the base
    pub fn base_fields(&mut self, access: &dyn DataAccess, base_id: &str) -> Result<Vec<Field>> {
        if let Some(fields) = self.base_fields.get(base_id) {
            return Ok(fields.clone());
        }
        let fields = access.fields_across_base(base_id)?;
        self.base_fields.insert(base_id.to_string(), fields.clone());
        Ok(fields)
    }
}
