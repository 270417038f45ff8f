//! Reverse-action detection.
//!
//! A record sitting in a relocate rule's target table is moved back when that
//! rule's trigger condition no longer holds. At most one rule reverses a record
//! per pass; rules that already fired for the record in the cascade are never
//! considered, which keeps a forward move and its reversal from alternating.

use tabula_core_types::schema::EVENT_REVERSED;

use crate::automation::actions::ActionExecutor;
use crate::automation::condition::{self, ConditionOutcome};
use crate::automation::orchestrator::{AutomationEngine, ReversalReport};
use crate::errors::{ExError, Result, TabulaError};
use crate::model::{ActionKind, Condition, RecordValues, Rule, Table};

impl AutomationEngine<'_> {
    pub(super) fn reverse_pass(
        &mut self,
        rules: &[Rule],
        base_id: &str,
        record_id: &str,
        placement: &Table,
        values: &RecordValues,
        recently_changed: &[String],
    ) -> Option<ReversalReport> {
        // a record living only in the master table was never relocated
        if placement.is_master {
            return None;
        }

        for rule in rules {
            if rule.action.kind != ActionKind::Relocate {
                continue;
            }
            if self
                .fired
                .contains(&(rule.id.clone(), record_id.to_string()))
            {
                continue;
            }
            let in_target = rule
                .action
                .target_table_name
                .as_deref()
                .is_some_and(|name| placement.is_named(name));
            if !in_target {
                continue;
            }
            let (Some(condition), Some(field_ref)) =
                (&rule.trigger.condition, rule.trigger.field_ref())
            else {
                continue;
            };

            let attempt = self.reverse_one(
                rule,
                condition,
                field_ref,
                base_id,
                record_id,
                placement,
                values,
                recently_changed,
            );
            match attempt {
                Ok(Some(report)) => {
                    tracing::info!(
                        op = "reversal",
                        event = EVENT_REVERSED,
                        rule_id = %rule.id,
                        record_id,
                        from_table_id = %report.from_table_id,
                        to_table_id = %report.to_table_id,
                        "relocation reversed"
                    );
                    return Some(report);
                }
                Ok(None) => {}
                Err(err) => {
                    let ex: ExError = err.clone().into();
                    tracing::error!(
                        op = "reversal",
                        rule_id = %rule.id,
                        record_id,
                        table_id = %placement.id,
                        err_code = ex.code(),
                        message = %err,
                        "reversal failed"
                    );
                }
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn reverse_one(
        &mut self,
        rule: &Rule,
        condition: &Condition,
        field_ref: &str,
        base_id: &str,
        record_id: &str,
        placement: &Table,
        values: &RecordValues,
        recently_changed: &[String],
    ) -> Result<Option<ReversalReport>> {
        let outcome = condition::evaluate(
            &mut self.directory,
            &*self.access,
            placement,
            field_ref,
            condition.operator,
            &condition.value,
            values,
            &placement.id,
        )?;
        // only a condition that is checkable and false sends the record back
        if outcome != ConditionOutcome::NotSatisfied {
            return Ok(None);
        }

        let destination = match rule.declared_source_table() {
            Some(name) => self
                .directory
                .table_by_name(&*self.access, base_id, name)?
                .ok_or_else(|| TabulaError::TargetTableNotFound {
                    rule_id: rule.id.clone(),
                    table_name: name.to_string(),
                })?,
            None => self
                .directory
                .master_table(&*self.access, base_id)?
                .ok_or_else(|| TabulaError::MissingTargetTable {
                    rule_id: rule.id.clone(),
                })?,
        };
        if destination.id == placement.id {
            return Ok(None);
        }

        let mut exec = ActionExecutor::new(&mut self.directory, &mut *self.access);
        exec.move_back(
            &rule.id,
            base_id,
            record_id,
            placement,
            &destination,
            recently_changed,
        )?;

        Ok(Some(ReversalReport {
            rule_id: rule.id.clone(),
            from_table_id: placement.id.clone(),
            to_table_id: destination.id,
        }))
    }
}
