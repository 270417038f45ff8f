//! Tabula Core - reactive automation over a tabular store
//!
//! This crate provides the domain model and the rule engine that runs after
//! every record mutation, including:
//! - Bases, tables, typed fields, records and rules
//! - The `DataAccess` storage seam and an in-memory `Store`
//! - The field/table `Directory`
//! - Condition evaluation, name-based field mapping and master-table sync
//! - Duplicate, relocate, reconcile and reference actions
//! - Rule orchestration with relocation reversal and bounded cascades

pub mod access;
pub mod automation;
pub mod directory;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod ops;

// Used by the logging macros
pub use tabula_core_types;

// Re-export commonly used types
pub use access::{DataAccess, StoreResult};
pub use automation::{AutomationEngine, AutomationOptions, AutomationReport, RuleOutcome};
pub use directory::Directory;
pub use errors::{ExError, ExErrorKind, Result, TabulaError};
pub use model::{Field, Record, RecordValues, Rule, Table};
pub use ops::Store;
