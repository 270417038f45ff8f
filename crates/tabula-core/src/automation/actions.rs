//! Action execution.
//!
//! Each [`ActionKind`] maps to one executor function through
//! [`executor_for`]. Executors return a typed [`ActionOutcome`]; every failure
//! is a `TabulaError` the orchestrator records against the rule.

use serde_json::Value;

use crate::access::DataAccess;
use crate::automation::aggregate::{sync_master, SyncOutcome};
use crate::automation::mapping::{self, MappingRequest};
use crate::directory::Directory;
use crate::errors::{Result, TabulaError};
use crate::model::{
    normalize_name, ActionKind, DuplicateHandling, NewRecord, RecordPatch, RecordValues, Rule,
    Table,
};

/// Everything an executor needs to know about the firing rule and the record
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub rule: &'a Rule,
    pub base_id: &'a str,
    pub record_id: &'a str,
    /// Table the record is stored in when the action runs
    pub current_table: &'a Table,
    /// Values of the row in `current_table`
    pub current_values: &'a RecordValues,
    pub target_table: &'a Table,
    /// Normalized names of the fields the triggering mutation changed
    pub recently_changed: &'a [String],
}

/// Typed result of one action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Inserted { table_id: String, record_id: String },
    Updated { table_id: String, record_id: String },
    /// Display-only row; never synced and never re-enters automation
    Referenced { table_id: String, record_id: String },
    Relocated { from_table_id: String, to_table_id: String },
    /// Target was the master table; only the master row was written
    SyncedOnly(SyncOutcome),
    Skipped { reason: String },
}

impl ActionOutcome {
    /// Row written in a non-master table that should re-enter rule matching
    pub fn written_row(&self) -> Option<(&str, &str)> {
        match self {
            ActionOutcome::Inserted { table_id, record_id }
            | ActionOutcome::Updated { table_id, record_id } => Some((table_id, record_id)),
            _ => None,
        }
    }
}

/// Borrowed storage plus schema cache for one action
pub struct ActionExecutor<'a> {
    pub directory: &'a mut Directory,
    pub access: &'a mut dyn DataAccess,
}

pub type ActionFn = fn(&mut ActionExecutor<'_>, &ActionContext<'_>) -> Result<ActionOutcome>;

/// Dispatch table from action kind to executor
pub fn executor_for(kind: ActionKind) -> ActionFn {
    match kind {
        ActionKind::Duplicate => duplicate,
        ActionKind::Relocate => relocate,
        ActionKind::Reconcile => reconcile,
        ActionKind::Reference => reference,
    }
}

impl<'a> ActionExecutor<'a> {
    pub fn new(directory: &'a mut Directory, access: &'a mut dyn DataAccess) -> Self {
        Self { directory, access }
    }

    fn resolve(
        &mut self,
        ctx: &ActionContext<'_>,
        source_table: &Table,
        source_values: &RecordValues,
        seed_from_master: bool,
    ) -> Result<RecordValues> {
        let master_row = if seed_from_master {
            self.master_row(ctx.base_id, ctx.record_id, &ctx.target_table.id)?
        } else {
            None
        };
        let request = MappingRequest {
            rule_id: &ctx.rule.id,
            record_id: ctx.record_id,
            source_table_id: &source_table.id,
            source_values,
            target_table_id: &ctx.target_table.id,
            declared: &ctx.rule.action.field_mappings,
            recently_changed: ctx.recently_changed,
            seed: master_row
                .as_ref()
                .map(|(table_id, values)| (table_id.as_str(), values)),
        };
        mapping::resolve(self.directory, &*self.access, &request)
    }

    /// The master row of an identity, unless `exclude_table_id` is the master
    fn master_row(
        &mut self,
        base_id: &str,
        record_id: &str,
        exclude_table_id: &str,
    ) -> Result<Option<(String, RecordValues)>> {
        let Some(master) = self.directory.master_table(&*self.access, base_id)? else {
            return Ok(None);
        };
        if master.id == exclude_table_id {
            return Ok(None);
        }
        Ok(self
            .access
            .record_in(&master.id, record_id)?
            .map(|r| (master.id, r.values)))
    }

    /// Overlay the fields changed through the master row onto a placement's values
    fn with_master_edits(
        &mut self,
        ctx: &ActionContext<'_>,
        placement: &Table,
        mut values: RecordValues,
    ) -> Result<RecordValues> {
        let master_fields = self.directory.fields(&*self.access, &ctx.current_table.id)?;
        let placement_fields = self.directory.fields(&*self.access, &placement.id)?;
        let edited: RecordValues = ctx
            .current_values
            .iter()
            .filter(|(field_id, _)| {
                master_fields.iter().any(|f| {
                    &&f.id == field_id && ctx.recently_changed.contains(&normalize_name(&f.name))
                })
            })
            .map(|(field_id, value)| (field_id.clone(), value.clone()))
            .collect();
        mapping::carry_by_name(&master_fields, &edited, &placement_fields, &mut values);
        Ok(values)
    }

    fn sync(
        &mut self,
        base_id: &str,
        record_id: &str,
        table_id: &str,
        values: &RecordValues,
    ) -> Result<SyncOutcome> {
        sync_master(self.directory, self.access, base_id, record_id, table_id, values)
    }

    /// First declared mapping's target field id and resolved value
    fn lookup_key(
        &mut self,
        ctx: &ActionContext<'_>,
        values: &RecordValues,
    ) -> Result<Option<(String, Value)>> {
        let Some(first) = ctx.rule.action.field_mappings.first() else {
            return Ok(None);
        };
        let field = self
            .directory
            .field_by_name(&*self.access, &ctx.target_table.id, &first.target_field_name)?
            .ok_or_else(|| TabulaError::UnresolvableField {
                rule_id: ctx.rule.id.clone(),
                field: first.target_field_name.clone(),
            })?;
        Ok(values.get(&field.id).map(|v| (field.id.clone(), v.clone())))
    }

    /// Update the row matching the lookup key, or insert a fresh identity
    fn upsert(
        &mut self,
        ctx: &ActionContext<'_>,
        values: RecordValues,
        match_existing: bool,
    ) -> Result<ActionOutcome> {
        let target_id = ctx.target_table.id.clone();

        let existing = if match_existing {
            match self.lookup_key(ctx, &values)? {
                Some((field_id, key)) => self
                    .access
                    .find_records_by_field_value(&target_id, &field_id, &key)?
                    .into_iter()
                    .next(),
                None => None,
            }
        } else {
            None
        };

        if let Some(found) = existing {
            let patch = RecordPatch::merge(target_id.clone(), values);
            let updated = self.access.update_record(&found.id, &patch)?.ok_or_else(|| {
                TabulaError::RecordNotFound {
                    record_id: found.id.clone(),
                }
            })?;
            self.sync(ctx.base_id, &updated.id, &target_id, &updated.values)?;
            return Ok(ActionOutcome::Updated {
                table_id: target_id,
                record_id: updated.id,
            });
        }

        let inserted = self
            .access
            .insert_record(NewRecord::new(target_id.clone(), values))?;
        self.sync(ctx.base_id, &inserted.id, &target_id, &inserted.values)?;
        Ok(ActionOutcome::Inserted {
            table_id: target_id,
            record_id: inserted.id,
        })
    }

    /// Remove a placement together with its master row
    fn discard(&mut self, base_id: &str, table_id: &str, record_id: &str) -> Result<()> {
        self.access.delete_record(table_id, record_id)?;
        if let Some(master) = self.directory.master_table(&*self.access, base_id)? {
            if master.id != table_id {
                self.access.delete_record(&master.id, record_id)?;
            }
        }
        Ok(())
    }

    /// Move a relocated record from `from` back to `to`
    ///
    /// Moving back to the master table merges the placement into the master
    /// row and removes the placement.
    pub fn move_back(
        &mut self,
        rule_id: &str,
        base_id: &str,
        record_id: &str,
        from: &Table,
        to: &Table,
        recently_changed: &[String],
    ) -> Result<ActionOutcome> {
        let current = self
            .access
            .record_in(&from.id, record_id)?
            .ok_or_else(|| TabulaError::RecordNotFound {
                record_id: record_id.to_string(),
            })?;

        if to.is_master {
            self.sync(base_id, record_id, &from.id, &current.values)?;
            self.access.delete_record(&from.id, record_id)?;
            return Ok(ActionOutcome::Relocated {
                from_table_id: from.id.clone(),
                to_table_id: to.id.clone(),
            });
        }

        let master_row = self.master_row(base_id, record_id, &to.id)?;
        let request = MappingRequest {
            rule_id,
            record_id,
            source_table_id: &from.id,
            source_values: &current.values,
            target_table_id: &to.id,
            declared: &[],
            recently_changed,
            seed: master_row
                .as_ref()
                .map(|(table_id, values)| (table_id.as_str(), values)),
        };
        let values = mapping::resolve(self.directory, &*self.access, &request)?;

        let patch = RecordPatch::relocate(from.id.clone(), to.id.clone(), values.clone());
        if self.access.update_record(record_id, &patch)?.is_none() {
            return Err(TabulaError::RelocationConflict {
                record_id: record_id.to_string(),
                expected_table_id: from.id.clone(),
            });
        }
        self.sync(base_id, record_id, &to.id, &values)?;
        Ok(ActionOutcome::Relocated {
            from_table_id: from.id.clone(),
            to_table_id: to.id.clone(),
        })
    }
}

/// Copy the record into the target table
///
/// With `skip` or `update` handling an existing target row whose first mapped
/// value matches is updated instead; `create_new` always inserts.
pub fn duplicate(exec: &mut ActionExecutor<'_>, ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
    let values = exec.resolve(ctx, ctx.current_table, ctx.current_values, false)?;
    let match_existing = ctx.rule.action.duplicate_handling != DuplicateHandling::CreateNew;
    let outcome = exec.upsert(ctx, values, match_existing)?;

    if !ctx.rule.action.preserve_original {
        let written_here = matches!(
            outcome.written_row(),
            Some((table_id, record_id))
                if table_id == ctx.current_table.id && record_id == ctx.record_id
        );
        if !written_here {
            exec.discard(ctx.base_id, &ctx.current_table.id, ctx.record_id)?;
        }
    }
    Ok(outcome)
}

/// Move the record's placement into the target table, keeping its identity
pub fn relocate(exec: &mut ActionExecutor<'_>, ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
    let target = ctx.target_table;

    // a record edited through its master row may still have a placement elsewhere
    let (from, values) = if ctx.current_table.is_master {
        match exec.access.record(ctx.record_id)? {
            Some(placement) if placement.table_id != ctx.current_table.id => {
                let table = exec.directory.table(&*exec.access, &placement.table_id)?;
                let values = exec.with_master_edits(ctx, &table, placement.values)?;
                (table, values)
            }
            _ => (ctx.current_table.clone(), ctx.current_values.clone()),
        }
    } else {
        (ctx.current_table.clone(), ctx.current_values.clone())
    };

    if from.id == target.id {
        return Ok(ActionOutcome::Skipped {
            reason: format!("record already in '{}'", target.name),
        });
    }

    if target.is_master {
        let synced = exec.sync(ctx.base_id, ctx.record_id, &from.id, &values)?;
        return Ok(ActionOutcome::SyncedOnly(synced));
    }

    let resolved = exec.resolve(ctx, &from, &values, true)?;

    if from.is_master {
        // the master row stays; the record gains a placement in the target
        exec.access.insert_record(
            NewRecord::new(target.id.clone(), resolved.clone()).with_id(ctx.record_id),
        )?;
    } else {
        let patch = RecordPatch::relocate(from.id.clone(), target.id.clone(), resolved.clone());
        if exec.access.update_record(ctx.record_id, &patch)?.is_none() {
            return Err(TabulaError::RelocationConflict {
                record_id: ctx.record_id.to_string(),
                expected_table_id: from.id.clone(),
            });
        }
    }

    exec.sync(ctx.base_id, ctx.record_id, &target.id, &resolved)?;
    Ok(ActionOutcome::Relocated {
        from_table_id: from.id,
        to_table_id: target.id.clone(),
    })
}

/// Update the target row matching the first mapped value, else insert one
pub fn reconcile(exec: &mut ActionExecutor<'_>, ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
    let values = exec.resolve(ctx, ctx.current_table, ctx.current_values, false)?;
    exec.upsert(ctx, values, true)
}

/// Insert a display-only row pointing back at the source identity
pub fn reference(exec: &mut ActionExecutor<'_>, ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
    let values = exec.resolve(ctx, ctx.current_table, ctx.current_values, false)?;
    let inserted = exec.access.insert_record(
        NewRecord::new(ctx.target_table.id.clone(), values).referencing(ctx.record_id),
    )?;
    Ok(ActionOutcome::Referenced {
        table_id: inserted.table_id,
        record_id: inserted.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Base, Field, FieldMapping, FieldType, Trigger};
    use crate::ops::Store;
    use serde_json::json;

    fn store() -> Store {
        let mut store = Store::new();
        store.insert_base(Base::new("base_1", "Ops"));
        store
            .insert_table(Table::new("tbl_m", "base_1", "Master").master())
            .unwrap();
        store
            .insert_table(Table::new("tbl_a", "base_1", "Intake"))
            .unwrap();
        store
            .insert_table(Table::new("tbl_b", "base_1", "Archive"))
            .unwrap();
        for (table, prefix) in [("tbl_m", "m"), ("tbl_a", "a"), ("tbl_b", "b")] {
            let name = Field::new(format!("{prefix}_name"), table, "Name", FieldType::Text);
            let amount = Field::new(format!("{prefix}_amt"), table, "Amount", FieldType::Number);
            store.insert_field(name);
            store.insert_field(amount);
        }
        let seed = values(&[("a_name", json!("Acme")), ("a_amt", json!(5))]);
        store
            .insert_record(NewRecord::new("tbl_a", seed).with_id("rec_1"))
            .unwrap();
        store
    }

    fn values(pairs: &[(&str, Value)]) -> RecordValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn run(store: &mut Store, rule: &Rule, target: &str) -> Result<ActionOutcome> {
        let mut dir = Directory::new();
        let current = store.table("tbl_a").unwrap().unwrap();
        let target = store.table(target).unwrap().unwrap();
        let record = store.record_in("tbl_a", "rec_1").unwrap().unwrap();
        let ctx = ActionContext {
            rule,
            base_id: "base_1",
            record_id: "rec_1",
            current_table: &current,
            current_values: &record.values,
            target_table: &target,
            recently_changed: &[],
        };
        let mut exec = ActionExecutor::new(&mut dir, store);
        executor_for(rule.action.kind)(&mut exec, &ctx)
    }

    fn rule(action: Action) -> Rule {
        Rule::new("rule_1", "base_1", Trigger::field_change("Amount"), action)
    }

    #[test]
    fn test_reference_inserts_back_reference_without_sync() {
        let mut store = store();
        let rule = rule(
            Action::new(ActionKind::Reference, "Archive").with_mapping(FieldMapping::same("Name")),
        );

        let outcome = run(&mut store, &rule, "tbl_b").unwrap();

        let ActionOutcome::Referenced { record_id, .. } = outcome else {
            panic!("expected reference, got {outcome:?}");
        };
        let row = store.record_in("tbl_b", &record_id).unwrap().unwrap();
        assert_eq!(row.reference_of.as_deref(), Some("rec_1"));
        assert!(store.record_in("tbl_m", &record_id).unwrap().is_none());
    }

    #[test]
    fn test_reconcile_updates_matching_row() {
        let mut store = store();
        let existing = values(&[("b_name", json!("Acme"))]);
        store
            .insert_record(NewRecord::new("tbl_b", existing).with_id("rec_b"))
            .unwrap();
        let rule = rule(
            Action::new(ActionKind::Reconcile, "Archive").with_mapping(FieldMapping::same("Name")),
        );

        let outcome = run(&mut store, &rule, "tbl_b").unwrap();

        assert_eq!(
            outcome,
            ActionOutcome::Updated {
                table_id: "tbl_b".to_string(),
                record_id: "rec_b".to_string()
            }
        );
        assert_eq!(store.record_count("tbl_b"), 1);
        let row = store.record_in("tbl_b", "rec_b").unwrap().unwrap();
        assert_eq!(row.values["b_amt"], json!(5));
    }

    #[test]
    fn test_duplicate_create_new_always_inserts() {
        let mut store = store();
        store
            .insert_record(NewRecord::new("tbl_b", values(&[("b_name", json!("Acme"))])))
            .unwrap();
        let rule = rule(
            Action::new(ActionKind::Duplicate, "Archive")
                .with_mapping(FieldMapping::same("Name"))
                .with_duplicate_handling(DuplicateHandling::CreateNew),
        );

        let outcome = run(&mut store, &rule, "tbl_b").unwrap();

        assert!(matches!(outcome, ActionOutcome::Inserted { .. }));
        assert_eq!(store.record_count("tbl_b"), 2);
    }

    #[test]
    fn test_duplicate_without_preserve_removes_source_and_master_row() {
        let mut store = store();
        let mirror = values(&[("m_name", json!("Acme"))]);
        store
            .insert_record(NewRecord::new("tbl_m", mirror).with_id("rec_1"))
            .unwrap();
        let rule = rule(
            Action::new(ActionKind::Duplicate, "Archive")
                .with_mapping(FieldMapping::same("Name"))
                .discard_original(),
        );

        run(&mut store, &rule, "tbl_b").unwrap();

        assert!(store.record_in("tbl_a", "rec_1").unwrap().is_none());
        assert!(store.record_in("tbl_m", "rec_1").unwrap().is_none());
        assert_eq!(store.record_count("tbl_b"), 1);
    }

    #[test]
    fn test_relocate_to_master_only_syncs() {
        let mut store = store();
        let rule = rule(Action::new(ActionKind::Relocate, "Master"));

        let outcome = run(&mut store, &rule, "tbl_m").unwrap();

        assert_eq!(outcome, ActionOutcome::SyncedOnly(SyncOutcome::Inserted));
        assert!(store.record_in("tbl_a", "rec_1").unwrap().is_some());
        let master = store.record_in("tbl_m", "rec_1").unwrap().unwrap();
        assert_eq!(master.values["m_name"], json!("Acme"));
    }

    #[test]
    fn test_relocate_detects_concurrent_move() {
        let mut store = store();
        let rule = rule(Action::new(ActionKind::Relocate, "Archive"));
        let mut dir = Directory::new();
        let current = store.table("tbl_a").unwrap().unwrap();
        let target = store.table("tbl_b").unwrap().unwrap();
        let stale_values = values(&[("a_name", json!("Acme"))]);

        // the row moves away before the action runs
        store.delete_record("tbl_a", "rec_1").unwrap();

        let ctx = ActionContext {
            rule: &rule,
            base_id: "base_1",
            record_id: "rec_1",
            current_table: &current,
            current_values: &stale_values,
            target_table: &target,
            recently_changed: &[],
        };
        let mut exec = ActionExecutor::new(&mut dir, &mut store);
        let err = relocate(&mut exec, &ctx).unwrap_err();
        assert!(matches!(err, TabulaError::RelocationConflict { .. }));
    }
}
