use tabula_core_types::RequestId;
use thiserror::Error;

/// Result type alias using TabulaError
pub type Result<T> = std::result::Result<T, TabulaError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// error handling, testing, and log assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Structural/Validation
    InvalidInput,
    InvalidOptions,
    NotFound,
    AlreadyExists,
    ConstraintViolation,

    // Automation
    Configuration,
    NoValuesToCopy,
    Conflict,

    // Integration/IO
    Io,
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::InvalidOptions => "ERR_INVALID_OPTIONS",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::ConstraintViolation => "ERR_CONSTRAINT_VIOLATION",
            ExErrorKind::Configuration => "ERR_CONFIGURATION",
            ExErrorKind::NoValuesToCopy => "ERR_NO_VALUES_TO_COPY",
            ExErrorKind::Conflict => "ERR_CONFLICT",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries classification fields for programmatic handling plus context for
/// debugging. Storage backends report failures with this type.
#[derive(Debug, Clone, PartialEq)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    table_id: Option<String>,
    request_id: Option<RequestId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            table_id: None,
            request_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context (record, rule, field or base id)
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add table ID context
    pub fn with_table_id(mut self, id: impl Into<String>) -> Self {
        self.table_id = Some(id.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn table_id(&self) -> Option<&str> {
        self.table_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(table_id) = &self.table_id {
            write!(f, " (table_id: {})", table_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for directory lookups and automation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TabulaError {
    // ===== Lookup Errors =====
    #[error("Table not found: {table_id}")]
    TableNotFound { table_id: String },

    #[error("Table named '{name}' not found in base {base_id}")]
    TableNameNotFound { base_id: String, name: String },

    #[error("Record {record_id} not found")]
    RecordNotFound { record_id: String },

    #[error("Field '{field}' not found in table {table_id}")]
    FieldNotFound { table_id: String, field: String },

    /// More than one table in a base carries the master flag
    #[error("Base {base_id} has more than one master table: {table_ids:?}")]
    MultipleMasterTables {
        base_id: String,
        table_ids: Vec<String>,
    },

    // ===== Configuration Errors =====
    #[error("Rule {rule_id} has no target table")]
    MissingTargetTable { rule_id: String },

    #[error("Rule {rule_id} targets unknown table '{table_name}'")]
    TargetTableNotFound { rule_id: String, table_name: String },

    #[error("Rule {rule_id} has no field mappings")]
    EmptyFieldMappings { rule_id: String },

    #[error("Rule {rule_id} references unresolvable field '{field}'")]
    UnresolvableField { rule_id: String, field: String },

    /// Option payload failed validation at the directory boundary
    #[error("Invalid options for field {field_id}: {reason}")]
    InvalidFieldOptions { field_id: String, reason: String },

    // ===== Execution Errors =====
    #[error("Rule {rule_id} resolved no values to copy from record {record_id}")]
    NoValuesToCopy { rule_id: String, record_id: String },

    /// The record left its expected table before the relocation could apply
    #[error("Record {record_id} is no longer in table {expected_table_id}")]
    RelocationConflict {
        record_id: String,
        expected_table_id: String,
    },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    // ===== Generic Errors =====
    #[error("Storage error: {0}")]
    Storage(#[from] ExError),

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TabulaError {
    /// Configuration errors skip the rule with a diagnostic instead of failing it
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TabulaError::MissingTargetTable { .. }
                | TabulaError::TargetTableNotFound { .. }
                | TabulaError::EmptyFieldMappings { .. }
                | TabulaError::UnresolvableField { .. }
        )
    }
}

impl From<TabulaError> for ExError {
    fn from(err: TabulaError) -> Self {
        match err {
            TabulaError::TableNotFound { table_id } => ExError::new(ExErrorKind::NotFound)
                .with_table_id(table_id)
                .with_message("Table not found"),

            TabulaError::TableNameNotFound { base_id, name } => {
                ExError::new(ExErrorKind::NotFound)
                    .with_entity_id(base_id)
                    .with_message(format!("Table '{}' not found", name))
            }

            TabulaError::RecordNotFound { record_id } => ExError::new(ExErrorKind::NotFound)
                .with_entity_id(record_id)
                .with_message("Record not found"),

            TabulaError::FieldNotFound { table_id, field } => ExError::new(ExErrorKind::NotFound)
                .with_table_id(table_id)
                .with_message(format!("Field '{}' not found", field)),

            TabulaError::MultipleMasterTables { base_id, table_ids } => {
                ExError::new(ExErrorKind::ConstraintViolation)
                    .with_entity_id(base_id)
                    .with_message(format!("Multiple master tables: {:?}", table_ids))
            }

            TabulaError::MissingTargetTable { rule_id } => {
                ExError::new(ExErrorKind::Configuration)
                    .with_entity_id(rule_id)
                    .with_message("Rule has no target table")
            }

            TabulaError::TargetTableNotFound {
                rule_id,
                table_name,
            } => ExError::new(ExErrorKind::Configuration)
                .with_entity_id(rule_id)
                .with_message(format!("Target table '{}' not found", table_name)),

            TabulaError::EmptyFieldMappings { rule_id } => {
                ExError::new(ExErrorKind::Configuration)
                    .with_entity_id(rule_id)
                    .with_message("Rule has no field mappings")
            }

            TabulaError::UnresolvableField { rule_id, field } => {
                ExError::new(ExErrorKind::Configuration)
                    .with_entity_id(rule_id)
                    .with_message(format!("Unresolvable field '{}'", field))
            }

            TabulaError::InvalidFieldOptions { field_id, reason } => {
                ExError::new(ExErrorKind::InvalidOptions)
                    .with_entity_id(field_id)
                    .with_message(reason)
            }

            TabulaError::NoValuesToCopy { rule_id, record_id } => {
                ExError::new(ExErrorKind::NoValuesToCopy)
                    .with_entity_id(record_id)
                    .with_message(format!("Rule {} resolved no values to copy", rule_id))
            }

            TabulaError::RelocationConflict {
                record_id,
                expected_table_id,
            } => ExError::new(ExErrorKind::Conflict)
                .with_entity_id(record_id)
                .with_table_id(expected_table_id)
                .with_message("Record moved before relocation applied"),

            TabulaError::InvalidInput { reason } => {
                ExError::new(ExErrorKind::InvalidInput).with_message(reason)
            }

            TabulaError::Storage(inner) => inner,

            TabulaError::Serialization { message } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            TabulaError::Internal { message } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

/// Conversion from serde_json::Error to TabulaError
impl From<serde_json::Error> for TabulaError {
    fn from(err: serde_json::Error) -> Self {
        TabulaError::Serialization {
            message: err.to_string(),
        }
    }
}
