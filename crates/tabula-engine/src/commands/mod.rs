//! Command orchestration layer.
//!
//! Record commands coordinate the store, the direct-path master sync and
//! the automation engine.

pub mod record;

pub use record::{
    record_create, record_delete, record_update, RecordDeleteResult, RecordWriteResult,
};

use rusqlite::Connection;
use tabula_core::model::RecordValues;
use tabula_core_types::RequestContext;
use tabula_store::Result;

use crate::config::EngineConfig;

/// Record mutations accepted by the engine
#[derive(Debug, Clone)]
pub enum RecordCommand {
    Create {
        table_id: String,
        /// Explicit identity; generated when absent
        record_id: Option<String>,
        values: RecordValues,
    },
    /// Merge `changed` (keyed by field id) into the row
    Update {
        table_id: String,
        record_id: String,
        changed: RecordValues,
    },
    Delete {
        table_id: String,
        record_id: String,
    },
}

/// Result of applying a record command
#[derive(Debug, Clone)]
pub enum RecordCommandResult {
    Written(RecordWriteResult),
    Deleted(RecordDeleteResult),
}

/// Apply a record command
///
/// # Errors
///
/// Only failures of the mutation itself; sync and automation failures are
/// logged and reported as absent outcomes.
pub fn apply_record_command(
    cmd: RecordCommand,
    conn: &mut Connection,
    config: &EngineConfig,
    ctx: &RequestContext,
) -> Result<RecordCommandResult> {
    match cmd {
        RecordCommand::Create {
            table_id,
            record_id,
            values,
        } => record_create(conn, config, ctx, &table_id, record_id.as_deref(), values)
            .map(RecordCommandResult::Written),
        RecordCommand::Update {
            table_id,
            record_id,
            changed,
        } => record_update(conn, config, ctx, &table_id, &record_id, changed)
            .map(RecordCommandResult::Written),
        RecordCommand::Delete {
            table_id,
            record_id,
        } => record_delete(conn, ctx, &table_id, &record_id).map(RecordCommandResult::Deleted),
    }
}
