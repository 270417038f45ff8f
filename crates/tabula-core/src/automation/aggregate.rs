//! Aggregate sync: keeps the master table's row for an identity consistent
//! with the identity's per-table placement.
//!
//! Writers use read-merge-write. An insert that loses a race to another
//! writer is retried once as an update; a second failure is logged and the
//! master row stays stale until the next mutation syncs it.

use crate::access::DataAccess;
use crate::automation::mapping::carry_by_name;
use crate::directory::Directory;
use crate::errors::{ExErrorKind, Result};
use crate::model::{NewRecord, RecordPatch, RecordValues};

/// What the sync did to the master row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Inserted,
    Updated,
    /// Master row already reflected every value
    Unchanged,
    /// The base has no master table
    NoMaster,
    /// The source row is itself the master row
    SourceIsMaster,
    /// Insert conflicted and the update retry failed too
    Abandoned,
}

/// Merge `values` (keyed by `source_table_id` fields) into the master row of `record_id`
///
/// Master fields without a same-named source field are left untouched.
pub fn sync_master(
    directory: &mut Directory,
    access: &mut dyn DataAccess,
    base_id: &str,
    record_id: &str,
    source_table_id: &str,
    values: &RecordValues,
) -> Result<SyncOutcome> {
    let Some(master) = directory.master_table(&*access, base_id)? else {
        return Ok(SyncOutcome::NoMaster);
    };
    if master.id == source_table_id {
        return Ok(SyncOutcome::SourceIsMaster);
    }

    let source_fields = directory.fields(&*access, source_table_id)?;
    let master_fields = directory.fields(&*access, &master.id)?;
    let mut mapped = RecordValues::new();
    carry_by_name(&source_fields, values, &master_fields, &mut mapped);

    if let Some(existing) = access.record_in(&master.id, record_id)? {
        let up_to_date = mapped
            .iter()
            .all(|(field_id, value)| existing.values.get(field_id) == Some(value));
        if up_to_date {
            return Ok(SyncOutcome::Unchanged);
        }
        let patch = RecordPatch::merge(master.id.clone(), mapped.clone());
        if access.update_record(record_id, &patch)?.is_some() {
            tracing::debug!(
                op = "sync_master",
                record_id,
                table_id = %master.id,
                fields = mapped.len(),
                "master row updated"
            );
            return Ok(SyncOutcome::Updated);
        }
        // the row vanished between read and write; fall through to insert
    }

    let insert = NewRecord::new(master.id.clone(), mapped.clone()).with_id(record_id);
    match access.insert_record(insert) {
        Ok(_) => {
            tracing::debug!(
                op = "sync_master",
                record_id,
                table_id = %master.id,
                fields = mapped.len(),
                "master row inserted"
            );
            Ok(SyncOutcome::Inserted)
        }
        Err(err) if err.kind() == ExErrorKind::AlreadyExists => {
            let patch = RecordPatch::merge(master.id.clone(), mapped);
            match access.update_record(record_id, &patch) {
                Ok(Some(_)) => Ok(SyncOutcome::Updated),
                Ok(None) => {
                    tracing::warn!(
                        op = "sync_master",
                        record_id,
                        table_id = %master.id,
                        "master row conflict retry found no row; sync abandoned"
                    );
                    Ok(SyncOutcome::Abandoned)
                }
                Err(retry_err) => {
                    tracing::warn!(
                        op = "sync_master",
                        record_id,
                        table_id = %master.id,
                        err_code = retry_err.code(),
                        message = %retry_err,
                        "master row update retry failed; sync abandoned"
                    );
                    Ok(SyncOutcome::Abandoned)
                }
            }
        }
        Err(err) => Err(err.into()),
    }
}
