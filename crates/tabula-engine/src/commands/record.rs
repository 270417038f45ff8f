//! Record create / update / delete
//!
//! Each write commits the mutation first. The direct-path master sync and the
//! automation pass then run together in a second transaction; their failures
//! are logged and never fail the mutation that was already committed.

#![allow(clippy::result_large_err)]

use std::time::Instant;

use rusqlite::Connection;
use tabula_core::automation::{AutomationEngine, AutomationReport, SyncOutcome};
use tabula_core::errors::{ExError, TabulaError};
use tabula_core::model::{NewRecord, Record, RecordPatch, RecordValues};
use tabula_core::{log_op_end, log_op_error, log_op_start, DataAccess};
use tabula_core_types::RequestContext;
use tabula_store::errors::from_rusqlite;
use tabula_store::{Result, SqliteAccess};

use crate::config::EngineConfig;

/// Outcome of a create or update
#[derive(Debug, Clone)]
pub struct RecordWriteResult {
    /// The row as committed by the mutation (before automation)
    pub record: Record,
    /// `None` when sync is disabled or failed
    pub master_sync: Option<SyncOutcome>,
    /// `None` when automation is disabled or the pass failed
    pub automation: Option<AutomationReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordDeleteResult {
    pub removed: bool,
    /// The identity's master row went with its last placement
    pub master_removed: bool,
}

enum Mutation<'v> {
    Created(&'v RecordValues),
    Updated {
        changed: &'v RecordValues,
        after: &'v RecordValues,
    },
}

impl Mutation<'_> {
    fn values(&self) -> &RecordValues {
        match self {
            Mutation::Created(values) => values,
            Mutation::Updated { after, .. } => after,
        }
    }
}

/// Create a record, then sync its master row and run automation
///
/// # Errors
///
/// `NotFound` for an unknown table, `AlreadyExists` when `record_id` is
/// taken in that table, or a persistence error.
pub fn record_create(
    conn: &mut Connection,
    config: &EngineConfig,
    ctx: &RequestContext,
    table_id: &str,
    record_id: Option<&str>,
    values: RecordValues,
) -> Result<RecordWriteResult> {
    log_op_start!("record_create", table_id = table_id, request_id = %ctx.request_id);
    let start = Instant::now();

    let record = insert(conn, table_id, record_id, values).map_err(|e| {
        log_op_error!(
            "record_create",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        e
    })?;

    let (master_sync, automation) = after_commit(
        conn,
        config,
        ctx,
        table_id,
        &record.id,
        Mutation::Created(&record.values),
    );

    log_op_end!(
        "record_create",
        duration_ms = start.elapsed().as_millis() as u64,
        record_id = %record.id
    );
    Ok(RecordWriteResult {
        record,
        master_sync,
        automation,
    })
}

/// Merge `changed` into a record, then sync its master row and run automation
///
/// # Errors
///
/// `NotFound` when the record is not in `table_id`, or a persistence error.
pub fn record_update(
    conn: &mut Connection,
    config: &EngineConfig,
    ctx: &RequestContext,
    table_id: &str,
    record_id: &str,
    changed: RecordValues,
) -> Result<RecordWriteResult> {
    log_op_start!(
        "record_update",
        table_id = table_id,
        record_id = record_id,
        request_id = %ctx.request_id
    );
    let start = Instant::now();

    let record = update(conn, table_id, record_id, &changed).map_err(|e| {
        log_op_error!(
            "record_update",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        e
    })?;

    let (master_sync, automation) = after_commit(
        conn,
        config,
        ctx,
        table_id,
        record_id,
        Mutation::Updated {
            changed: &changed,
            after: &record.values,
        },
    );

    log_op_end!("record_update", duration_ms = start.elapsed().as_millis() as u64);
    Ok(RecordWriteResult {
        record,
        master_sync,
        automation,
    })
}

/// Delete one placement of a record
///
/// Deleting a non-master placement also removes the identity's master row
/// once no other placement remains. Deletions do not trigger rules.
///
/// # Errors
///
/// `NotFound` for an unknown table, or a persistence error.
pub fn record_delete(
    conn: &mut Connection,
    ctx: &RequestContext,
    table_id: &str,
    record_id: &str,
) -> Result<RecordDeleteResult> {
    log_op_start!(
        "record_delete",
        table_id = table_id,
        record_id = record_id,
        request_id = %ctx.request_id
    );
    let start = Instant::now();

    let result = delete(conn, table_id, record_id).map_err(|e| {
        log_op_error!(
            "record_delete",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        e
    })?;

    log_op_end!(
        "record_delete",
        duration_ms = start.elapsed().as_millis() as u64,
        removed = result.removed,
        master_removed = result.master_removed
    );
    Ok(result)
}

fn table_not_found(table_id: &str) -> ExError {
    TabulaError::TableNotFound {
        table_id: table_id.to_string(),
    }
    .into()
}

fn insert(
    conn: &mut Connection,
    table_id: &str,
    record_id: Option<&str>,
    values: RecordValues,
) -> Result<Record> {
    let tx = conn.transaction().map_err(from_rusqlite)?;
    let record = {
        let mut access = SqliteAccess::new(&tx);
        if access.table(table_id)?.is_none() {
            return Err(table_not_found(table_id));
        }
        let mut new = NewRecord::new(table_id, values);
        if let Some(id) = record_id {
            new = new.with_id(id);
        }
        access.insert_record(new)?
    };
    tx.commit().map_err(from_rusqlite)?;
    Ok(record)
}

fn update(
    conn: &mut Connection,
    table_id: &str,
    record_id: &str,
    changed: &RecordValues,
) -> Result<Record> {
    let tx = conn.transaction().map_err(from_rusqlite)?;
    let record = {
        let mut access = SqliteAccess::new(&tx);
        access
            .update_record(record_id, &RecordPatch::merge(table_id, changed.clone()))?
            .ok_or_else(|| {
                ExError::from(TabulaError::RecordNotFound {
                    record_id: record_id.to_string(),
                })
                .with_table_id(table_id)
            })?
    };
    tx.commit().map_err(from_rusqlite)?;
    Ok(record)
}

fn delete(conn: &mut Connection, table_id: &str, record_id: &str) -> Result<RecordDeleteResult> {
    let tx = conn.transaction().map_err(from_rusqlite)?;
    let result = {
        let mut access = SqliteAccess::new(&tx);
        let Some(table) = access.table(table_id)? else {
            return Err(table_not_found(table_id));
        };
        let removed = access.delete_record(table_id, record_id)?;

        let mut master_removed = false;
        if removed && !table.is_master {
            // record() prefers a placement, so a master hit means none is left
            if let Some(remaining) = access.record(record_id)? {
                let is_master = access
                    .table(&remaining.table_id)?
                    .is_some_and(|t| t.is_master);
                if is_master {
                    master_removed = access.delete_record(&remaining.table_id, record_id)?;
                }
            }
        }
        RecordDeleteResult {
            removed,
            master_removed,
        }
    };
    tx.commit().map_err(from_rusqlite)?;
    Ok(result)
}

/// Direct-path master sync followed by the automation pass
fn after_commit(
    conn: &mut Connection,
    config: &EngineConfig,
    ctx: &RequestContext,
    table_id: &str,
    record_id: &str,
    mutation: Mutation<'_>,
) -> (Option<SyncOutcome>, Option<AutomationReport>) {
    if !config.direct_sync_enabled && !config.automation_enabled {
        return (None, None);
    }

    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => {
            tracing::error!(
                table_id,
                record_id,
                err_code = from_rusqlite(e).code(),
                "could not open automation transaction"
            );
            return (None, None);
        }
    };

    let mut access = SqliteAccess::new(&tx);
    let mut engine = AutomationEngine::new(&mut access, config.automation_options())
        .with_request_id(ctx.request_id.clone());

    let master_sync = if config.direct_sync_enabled {
        match engine.sync_master(table_id, record_id, mutation.values()) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                let ex = ExError::from(e);
                tracing::warn!(
                    table_id,
                    record_id,
                    err_code = ex.code(),
                    error = %ex,
                    "master sync failed"
                );
                None
            }
        }
    } else {
        None
    };

    // The pass logs its own failures
    let automation = if config.automation_enabled {
        match mutation {
            Mutation::Created(values) => engine.on_record_created(table_id, record_id, values),
            Mutation::Updated { changed, after } => {
                engine.on_record_mutated(table_id, record_id, changed, Some(after))
            }
        }
        .ok()
    } else {
        None
    };
    drop(engine);

    if let Err(e) = tx.commit() {
        tracing::error!(
            table_id,
            record_id,
            err_code = from_rusqlite(e).code(),
            "could not commit automation writes"
        );
        return (None, None);
    }
    (master_sync, automation)
}
