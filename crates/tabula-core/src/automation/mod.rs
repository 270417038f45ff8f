//! Automation: rule matching, condition evaluation, field mapping, action
//! execution, master-table sync and relocation reversal.

pub mod actions;
pub mod aggregate;
pub mod condition;
pub mod mapping;
pub mod orchestrator;
mod reversal;

pub use actions::{executor_for, ActionContext, ActionExecutor, ActionFn, ActionOutcome};
pub use aggregate::{sync_master, SyncOutcome};
pub use condition::ConditionOutcome;
pub use mapping::MappingRequest;
pub use orchestrator::{
    AutomationEngine, AutomationReport, MutationKind, ReversalReport, RuleOutcome, RuleReport,
    SkipReason,
};

/// Default bound on nested passes for engine-written rows
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 3;

/// Tunables for one [`AutomationEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomationOptions {
    /// Nested passes allowed below the triggering one; 0 disables cascades
    pub max_cascade_depth: usize,
    pub reversal_enabled: bool,
}

impl Default for AutomationOptions {
    fn default() -> Self {
        Self {
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            reversal_enabled: true,
        }
    }
}
