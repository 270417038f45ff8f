//! Canonical schema constants for structured logging and events
//!
//! These constants ensure consistency across all logging and error reporting.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_PASS_ID: &str = "pass_id";

// Entity identifiers
pub const FIELD_BASE_ID: &str = "base_id";
pub const FIELD_TABLE_ID: &str = "table_id";
pub const FIELD_RECORD_ID: &str = "record_id";
pub const FIELD_RULE_ID: &str = "rule_id";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";

// Automation events
pub const EVENT_RULE_FIRED: &str = "rule_fired";
pub const EVENT_RULE_SKIPPED: &str = "rule_skipped";
pub const EVENT_RULE_FAILED: &str = "rule_failed";
pub const EVENT_REVERSED: &str = "reversed";
