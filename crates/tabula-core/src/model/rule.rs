use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rule (automation) - a trigger/action pair evaluated after record mutations
///
/// Rules are authored elsewhere and only read by the engine. Evaluation
/// order is creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub base_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub trigger: Trigger,
    pub action: Action,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        base_id: impl Into<String>,
        trigger: Trigger,
        action: Action,
    ) -> Self {
        Self {
            id: id.into(),
            base_id: base_id.into(),
            name: String::new(),
            enabled: true,
            trigger,
            action,
            created_at: Utc::now(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Table a relocated record returns to when the condition stops holding
    ///
    /// `None` means the master table.
    pub fn declared_source_table(&self) -> Option<&str> {
        self.trigger.table_name.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    FieldChange,
    RecordCreated,
    RecordUpdated,
}

/// When a rule fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    /// Restricts the rule to one table; `None` applies to every table in the base
    #[serde(default)]
    pub table_name: Option<String>,
    /// Preferred field reference, resolved by name per table
    #[serde(default)]
    pub field_name: Option<String>,
    /// Legacy field reference, only meaningful in the table that owns the id
    #[serde(default)]
    pub field_id: Option<String>,
    #[serde(default)]
    pub condition: Option<Condition>,
}

impl Trigger {
    pub fn field_change(field_name: impl Into<String>) -> Self {
        Self {
            kind: TriggerKind::FieldChange,
            table_name: None,
            field_name: Some(field_name.into()),
            field_id: None,
            condition: None,
        }
    }

    pub fn on(kind: TriggerKind) -> Self {
        Self {
            kind,
            table_name: None,
            field_name: None,
            field_id: None,
            condition: None,
        }
    }

    pub fn in_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn when(mut self, operator: Operator, value: serde_json::Value) -> Self {
        self.condition = Some(Condition { operator, value });
        self
    }

    /// Field reference used by the condition: the name when present, else the legacy id
    pub fn field_ref(&self) -> Option<&str> {
        self.field_name.as_deref().or(self.field_id.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub operator: Operator,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[serde(alias = "copy")]
    Duplicate,
    #[serde(alias = "move")]
    Relocate,
    Reconcile,
    Reference,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Duplicate => "duplicate",
            ActionKind::Relocate => "relocate",
            ActionKind::Reconcile => "reconcile",
            ActionKind::Reference => "reference",
        }
    }

    /// Relocation carries every same-named field and needs no explicit mapping
    pub fn requires_mappings(&self) -> bool {
        !matches!(self, ActionKind::Relocate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateHandling {
    #[default]
    Skip,
    Update,
    CreateNew,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field_name: String,
    pub target_field_name: String,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_field_name: source.into(),
            target_field_name: target.into(),
        }
    }

    /// Same field name on both sides
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), name)
    }
}

/// What a rule does once it fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub target_table_name: Option<String>,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default = "default_true")]
    pub preserve_original: bool,
    #[serde(default)]
    pub duplicate_handling: DuplicateHandling,
}

impl Action {
    pub fn new(kind: ActionKind, target_table_name: impl Into<String>) -> Self {
        Self {
            kind,
            target_table_name: Some(target_table_name.into()),
            field_mappings: Vec::new(),
            preserve_original: true,
            duplicate_handling: DuplicateHandling::default(),
        }
    }

    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.field_mappings.push(mapping);
        self
    }

    pub fn with_duplicate_handling(mut self, handling: DuplicateHandling) -> Self {
        self.duplicate_handling = handling;
        self
    }

    pub fn discard_original(mut self) -> Self {
        self.preserve_original = false;
        self
    }
}

fn default_true() -> bool {
    true
}
