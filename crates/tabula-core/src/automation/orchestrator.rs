//! Rule matching and orchestration.
//!
//! [`AutomationEngine`] is the entry point invoked after a record mutation has
//! committed. One call runs a pass over the base's enabled rules in creation
//! order, then the reversal pass, then cascade passes for rows the actions
//! wrote. Rule failures are caught and reported; they never fail the pass.

#![allow(clippy::result_large_err)]

use std::collections::HashSet;

use tabula_core_types::schema::{EVENT_RULE_FAILED, EVENT_RULE_FIRED, EVENT_RULE_SKIPPED};
use tabula_core_types::{PassId, RequestId};

use crate::access::DataAccess;
use crate::automation::actions::{executor_for, ActionContext, ActionExecutor, ActionOutcome};
use crate::automation::aggregate::{self, SyncOutcome};
use crate::automation::condition::{self, ConditionOutcome};
use crate::automation::AutomationOptions;
use crate::directory::Directory;
use crate::errors::{ExError, Result, TabulaError};
use crate::model::{normalize_name, RecordValues, Rule, Table, Trigger, TriggerKind};
use crate::{log_op_end, log_op_error, log_op_start};

/// What happened to the record before automation ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Created,
    Updated,
}

/// Why a rule did not fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Same rule already fired for this record earlier in the cascade
    AlreadyFired,
    TableRestriction,
    TriggerKindMismatch,
    TriggerFieldUnchanged,
    ConditionNotMet,
    /// The trigger field does not exist where the record is checked
    NotApplicable,
    NoValuesToCopy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Fired(ActionOutcome),
    Skipped(SkipReason),
    ConfigurationError(TabulaError),
    Failed(TabulaError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleReport {
    pub rule_id: String,
    pub outcome: RuleOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalReport {
    pub rule_id: String,
    pub from_table_id: String,
    pub to_table_id: String,
}

/// Result of one automation pass and the cascades it caused
#[derive(Debug, Clone)]
pub struct AutomationReport {
    pub pass_id: PassId,
    pub table_id: String,
    pub record_id: String,
    pub depth: usize,
    pub rules: Vec<RuleReport>,
    /// Set when a forward rule relocated the record during this pass
    pub forward_moved: bool,
    pub reversal: Option<ReversalReport>,
    pub cascades: Vec<AutomationReport>,
}

impl AutomationReport {
    fn new(table_id: &str, record_id: &str, depth: usize) -> Self {
        Self {
            pass_id: PassId::new(),
            table_id: table_id.to_string(),
            record_id: record_id.to_string(),
            depth,
            rules: Vec::new(),
            forward_moved: false,
            reversal: None,
            cascades: Vec::new(),
        }
    }

    pub fn outcome_for(&self, rule_id: &str) -> Option<&RuleOutcome> {
        self.rules
            .iter()
            .find(|r| r.rule_id == rule_id)
            .map(|r| &r.outcome)
    }

    /// Ids of the rules that fired in this pass (cascades excluded)
    pub fn fired(&self) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| matches!(r.outcome, RuleOutcome::Fired(_)))
            .map(|r| r.rule_id.as_str())
            .collect()
    }

    /// Number of rules that failed, cascades included
    pub fn failure_count(&self) -> usize {
        let own = self
            .rules
            .iter()
            .filter(|r| matches!(r.outcome, RuleOutcome::Failed(_)))
            .count();
        own + self.cascades.iter().map(|c| c.failure_count()).sum::<usize>()
    }
}

/// The changed values of a mutation, keyed both ways the trigger may name them
struct ChangeSet {
    ids: Vec<String>,
    names: Vec<String>,
}

/// Reactive rule engine over a [`DataAccess`]
pub struct AutomationEngine<'a> {
    pub(super) access: &'a mut dyn DataAccess,
    pub(super) directory: Directory,
    options: AutomationOptions,
    request_id: Option<RequestId>,
    /// (rule id, record id) pairs that fired in the current cascade
    pub(super) fired: HashSet<(String, String)>,
}

impl<'a> AutomationEngine<'a> {
    pub fn new(access: &'a mut dyn DataAccess, options: AutomationOptions) -> Self {
        Self {
            access,
            directory: Directory::new(),
            options,
            request_id: None,
            fired: HashSet::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Run automation after `record_id` in `table_id` was updated
    ///
    /// `changed` holds the values the mutation wrote, keyed by field id or
    /// field name. `full_after` is the complete post-mutation value map; it is
    /// read from storage when absent.
    ///
    /// # Errors
    ///
    /// Only when the mutated table or record cannot be loaded. Rule failures
    /// are reported in the returned [`AutomationReport`].
    pub fn on_record_mutated(
        &mut self,
        table_id: &str,
        record_id: &str,
        changed: &RecordValues,
        full_after: Option<&RecordValues>,
    ) -> Result<AutomationReport> {
        self.run(MutationKind::Updated, table_id, record_id, changed, full_after)
    }

    /// Run automation after `record_id` was created in `table_id`
    ///
    /// # Errors
    ///
    /// See [`AutomationEngine::on_record_mutated`].
    pub fn on_record_created(
        &mut self,
        table_id: &str,
        record_id: &str,
        values: &RecordValues,
    ) -> Result<AutomationReport> {
        self.run(MutationKind::Created, table_id, record_id, values, Some(values))
    }

    /// Direct-path Aggregate Sync for a row written outside automation
    ///
    /// # Errors
    ///
    /// `TableNotFound` for an unknown table, or a storage error.
    pub fn sync_master(
        &mut self,
        table_id: &str,
        record_id: &str,
        values: &RecordValues,
    ) -> Result<SyncOutcome> {
        let table = self.directory.table(&*self.access, table_id)?;
        aggregate::sync_master(
            &mut self.directory,
            &mut *self.access,
            &table.base_id,
            record_id,
            table_id,
            values,
        )
    }

    fn run(
        &mut self,
        kind: MutationKind,
        table_id: &str,
        record_id: &str,
        changed: &RecordValues,
        full_after: Option<&RecordValues>,
    ) -> Result<AutomationReport> {
        let request_id = self
            .request_id
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_default();
        log_op_start!(
            "on_record_mutated",
            table_id = table_id,
            record_id = record_id,
            request_id = %request_id
        );
        let start = std::time::Instant::now();

        self.directory.invalidate();
        self.fired.clear();

        let report = self
            .run_pass(kind, table_id, record_id, changed, full_after, 0)
            .map_err(|e| {
                log_op_error!(
                    "on_record_mutated",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    record_id = record_id
                );
                e
            })?;

        log_op_end!(
            "on_record_mutated",
            duration_ms = start.elapsed().as_millis() as u64,
            record_id = record_id,
            fired = report.fired().len(),
            failures = report.failure_count()
        );
        Ok(report)
    }

    fn run_pass(
        &mut self,
        kind: MutationKind,
        table_id: &str,
        record_id: &str,
        changed: &RecordValues,
        full_after: Option<&RecordValues>,
        depth: usize,
    ) -> Result<AutomationReport> {
        let mut report = AutomationReport::new(table_id, record_id, depth);

        let mutated = self.directory.table(&*self.access, table_id)?;
        let base_id = mutated.base_id.clone();
        let mut values = match full_after {
            Some(values) => values.clone(),
            None => {
                self.access
                    .record_in(table_id, record_id)?
                    .ok_or_else(|| TabulaError::RecordNotFound {
                        record_id: record_id.to_string(),
                    })?
                    .values
            }
        };
        let changes = self.change_set(&mutated, changed)?;

        let mut rules: Vec<Rule> = self
            .access
            .rules_for_base(&base_id)?
            .into_iter()
            .filter(|r| r.enabled)
            .collect();
        rules.sort_by_key(|r| r.created_at);

        let mut placement = mutated;
        let mut cascade_queue: Vec<(MutationKind, String, String)> = Vec::new();

        for rule in &rules {
            let outcome =
                self.apply_rule(rule, kind, &base_id, record_id, &placement, &values, &changes);
            log_rule_outcome(rule, record_id, &placement, &report.pass_id, &outcome);

            let mut record_gone = false;
            if let RuleOutcome::Fired(action) = &outcome {
                self.fired.insert((rule.id.clone(), record_id.to_string()));

                if let ActionOutcome::Relocated { to_table_id, .. } = action {
                    report.forward_moved = true;
                    placement = self.directory.table(&*self.access, to_table_id)?;
                }
                if let Some((written_table, written_id)) = action.written_row() {
                    let next = match action {
                        ActionOutcome::Inserted { .. } => MutationKind::Created,
                        _ => MutationKind::Updated,
                    };
                    cascade_queue.push((next, written_table.to_string(), written_id.to_string()));
                }

                // later rules observe what this one did
                match self.access.record_in(&placement.id, record_id)? {
                    Some(record) => values = record.values,
                    None => record_gone = true,
                }
            } else if matches!(outcome, RuleOutcome::Failed(_)) {
                // a failed action may have moved the row before erroring
                match self.access.record_in(&placement.id, record_id)? {
                    Some(record) => values = record.values,
                    None => match self.access.record(record_id)? {
                        Some(record) => {
                            tracing::debug!(
                                op = "rule_matching",
                                record_id,
                                rule_id = %rule.id,
                                from_table_id = %placement.id,
                                to_table_id = %record.table_id,
                                "failed rule left the record moved"
                            );
                            placement = self.directory.table(&*self.access, &record.table_id)?;
                            report.forward_moved |= !placement.is_master;
                            values = record.values;
                        }
                        None => record_gone = true,
                    },
                }
            }

            report.rules.push(RuleReport {
                rule_id: rule.id.clone(),
                outcome,
            });
            if record_gone {
                tracing::debug!(
                    op = "rule_matching",
                    record_id,
                    table_id = %placement.id,
                    "record no longer present; remaining rules not evaluated"
                );
                return Ok(report);
            }
        }

        if self.options.reversal_enabled && !report.forward_moved {
            report.reversal =
                self.reverse_pass(&rules, &base_id, record_id, &placement, &values, &changes.names);
        }

        self.run_cascades(&mut report, cascade_queue, depth);
        Ok(report)
    }

    fn run_cascades(
        &mut self,
        report: &mut AutomationReport,
        queue: Vec<(MutationKind, String, String)>,
        depth: usize,
    ) {
        if queue.is_empty() {
            return;
        }
        if depth + 1 > self.options.max_cascade_depth {
            tracing::debug!(
                op = "rule_matching",
                record_id = %report.record_id,
                depth,
                pending = queue.len(),
                "cascade depth reached; engine-written rows not re-evaluated"
            );
            return;
        }

        for (kind, table_id, written_id) in queue {
            match self.directory.table(&*self.access, &table_id) {
                Ok(table) if table.is_master => continue,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        op = "rule_matching",
                        table_id = %table_id,
                        error = %err,
                        "cascade skipped"
                    );
                    continue;
                }
            }
            let written = match self.access.record_in(&table_id, &written_id) {
                Ok(Some(record)) => record.values,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(
                        op = "rule_matching",
                        table_id = %table_id,
                        record_id = %written_id,
                        error = %err,
                        "cascade skipped"
                    );
                    continue;
                }
            };
            match self.run_pass(kind, &table_id, &written_id, &written, Some(&written), depth + 1) {
                Ok(nested) => report.cascades.push(nested),
                Err(err) => tracing::warn!(
                    op = "rule_matching",
                    table_id = %table_id,
                    record_id = %written_id,
                    error = %err,
                    "cascade pass failed"
                ),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_rule(
        &mut self,
        rule: &Rule,
        kind: MutationKind,
        base_id: &str,
        record_id: &str,
        placement: &Table,
        values: &RecordValues,
        changes: &ChangeSet,
    ) -> RuleOutcome {
        if self
            .fired
            .contains(&(rule.id.clone(), record_id.to_string()))
        {
            return RuleOutcome::Skipped(SkipReason::AlreadyFired);
        }

        let trigger = &rule.trigger;
        if let Some(name) = trigger.table_name.as_deref() {
            if !placement.is_named(name) {
                return RuleOutcome::Skipped(SkipReason::TableRestriction);
            }
        }
        if !trigger_fires_on(trigger.kind, kind) {
            return RuleOutcome::Skipped(SkipReason::TriggerKindMismatch);
        }

        if trigger.kind == TriggerKind::FieldChange {
            let Some(field_ref) = trigger.field_ref() else {
                return RuleOutcome::ConfigurationError(TabulaError::UnresolvableField {
                    rule_id: rule.id.clone(),
                    field: "<trigger field>".to_string(),
                });
            };
            match self.trigger_field_changed(trigger, base_id, changes) {
                Ok(true) => {}
                Ok(false) => return RuleOutcome::Skipped(SkipReason::TriggerFieldUnchanged),
                Err(err) => return RuleOutcome::Failed(err),
            }
            if let Some(cond) = &trigger.condition {
                let outcome = condition::evaluate(
                    &mut self.directory,
                    &*self.access,
                    placement,
                    field_ref,
                    cond.operator,
                    &cond.value,
                    values,
                    &placement.id,
                );
                match outcome {
                    Ok(ConditionOutcome::Satisfied) => {}
                    Ok(ConditionOutcome::NotSatisfied) => {
                        return RuleOutcome::Skipped(SkipReason::ConditionNotMet)
                    }
                    Ok(ConditionOutcome::NotApplicable) => {
                        return RuleOutcome::Skipped(SkipReason::NotApplicable)
                    }
                    Err(err) => return RuleOutcome::Failed(err),
                }
            }
        }

        let target = match self.target_table(rule, base_id) {
            Ok(target) => target,
            Err(err) if err.is_configuration() => return RuleOutcome::ConfigurationError(err),
            Err(err) => return RuleOutcome::Failed(err),
        };

        let ctx = ActionContext {
            rule,
            base_id,
            record_id,
            current_table: placement,
            current_values: values,
            target_table: &target,
            recently_changed: &changes.names,
        };
        let mut exec = ActionExecutor::new(&mut self.directory, &mut *self.access);
        match executor_for(rule.action.kind)(&mut exec, &ctx) {
            Ok(outcome) => RuleOutcome::Fired(outcome),
            Err(TabulaError::NoValuesToCopy { .. }) => {
                RuleOutcome::Skipped(SkipReason::NoValuesToCopy)
            }
            Err(err) if err.is_configuration() => RuleOutcome::ConfigurationError(err),
            Err(err) => RuleOutcome::Failed(err),
        }
    }

    /// Validate and load the rule's target table
    fn target_table(&mut self, rule: &Rule, base_id: &str) -> Result<Table> {
        let name = rule
            .action
            .target_table_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| TabulaError::MissingTargetTable {
                rule_id: rule.id.clone(),
            })?;
        let table = self
            .directory
            .table_by_name(&*self.access, base_id, name)?
            .ok_or_else(|| TabulaError::TargetTableNotFound {
                rule_id: rule.id.clone(),
                table_name: name.to_string(),
            })?;
        if rule.action.kind.requires_mappings() && rule.action.field_mappings.is_empty() {
            return Err(TabulaError::EmptyFieldMappings {
                rule_id: rule.id.clone(),
            });
        }
        Ok(table)
    }

    fn change_set(&mut self, mutated: &Table, changed: &RecordValues) -> Result<ChangeSet> {
        let fields = self.directory.fields(&*self.access, &mutated.id)?;
        let mut names = Vec::with_capacity(changed.len());
        for key in changed.keys() {
            let name = fields
                .iter()
                .find(|f| &f.id == key)
                .map(|f| normalize_name(&f.name))
                .unwrap_or_else(|| normalize_name(key));
            names.push(name);
        }
        Ok(ChangeSet {
            ids: changed.keys().cloned().collect(),
            names,
        })
    }

    /// Whether the trigger field is among the changed values
    fn trigger_field_changed(
        &mut self,
        trigger: &Trigger,
        base_id: &str,
        changes: &ChangeSet,
    ) -> Result<bool> {
        if let Some(name) = trigger.field_name.as_deref() {
            let by_name = changes.names.contains(&normalize_name(name));
            if by_name || changes.ids.iter().any(|k| k == name) {
                return Ok(true);
            }
        }
        let Some(legacy_id) = trigger.field_id.as_deref() else {
            return Ok(false);
        };
        if changes.ids.iter().any(|k| k == legacy_id) {
            return Ok(true);
        }
        // a legacy id from another table still matches by the field's name
        let legacy_name = self
            .directory
            .base_fields(&*self.access, base_id)?
            .into_iter()
            .find(|f| f.id == legacy_id)
            .map(|f| normalize_name(&f.name));
        Ok(legacy_name.is_some_and(|n| changes.names.contains(&n)))
    }
}

fn trigger_fires_on(trigger: TriggerKind, mutation: MutationKind) -> bool {
    match trigger {
        TriggerKind::FieldChange => true,
        TriggerKind::RecordCreated => mutation == MutationKind::Created,
        TriggerKind::RecordUpdated => mutation == MutationKind::Updated,
    }
}

fn log_rule_outcome(
    rule: &Rule,
    record_id: &str,
    placement: &Table,
    pass_id: &PassId,
    outcome: &RuleOutcome,
) {
    match outcome {
        RuleOutcome::Fired(action) => tracing::info!(
            op = "rule_matching",
            event = EVENT_RULE_FIRED,
            pass_id = %pass_id,
            rule_id = %rule.id,
            record_id,
            table_id = %placement.id,
            action = rule.action.kind.as_str(),
            outcome = ?action,
            "rule fired"
        ),
        RuleOutcome::Skipped(reason) => tracing::debug!(
            op = "rule_matching",
            event = EVENT_RULE_SKIPPED,
            pass_id = %pass_id,
            rule_id = %rule.id,
            record_id,
            table_id = %placement.id,
            reason = ?reason,
            "rule skipped"
        ),
        RuleOutcome::ConfigurationError(err) => {
            let ex: ExError = err.clone().into();
            tracing::warn!(
                op = "rule_matching",
                event = EVENT_RULE_SKIPPED,
                pass_id = %pass_id,
                rule_id = %rule.id,
                record_id,
                table_id = %placement.id,
                err_code = ex.code(),
                message = %err,
                "rule misconfigured; skipped"
            )
        }
        RuleOutcome::Failed(err) => {
            let ex: ExError = err.clone().into();
            tracing::error!(
                op = "rule_matching",
                event = EVENT_RULE_FAILED,
                pass_id = %pass_id,
                rule_id = %rule.id,
                record_id,
                table_id = %placement.id,
                err_kind = ?ex.kind(),
                err_code = ex.code(),
                message = %err,
                "rule action failed"
            )
        }
    }
}
