pub mod base;
pub mod field;
pub mod record;
pub mod rule;
pub mod table;

pub use base::Base;
pub use field::{names_match, normalize_name, Field, FieldOptions, FieldType, SelectOption};
pub use record::{NewRecord, Record, RecordPatch, RecordValues, WriteMode};
pub use rule::{
    Action, ActionKind, Condition, DuplicateHandling, FieldMapping, Operator, Rule, Trigger,
    TriggerKind,
};
pub use table::Table;
