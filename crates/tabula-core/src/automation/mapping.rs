//! Field mapping resolution.
//!
//! Builds a target-table value map from a source record. Field ids never
//! cross tables; every value is re-keyed through a same-named field.
//!
//! Precedence, lowest to highest:
//! 1. seed layer (e.g. the entity's master row), when provided
//! 2. carry-all: every source field with a same-named target field
//! 3. declared mappings
//! 4. fields edited by the triggering mutation keep their carry-all value

use serde_json::Value;

use crate::access::DataAccess;
use crate::directory::Directory;
use crate::errors::{Result, TabulaError};
use crate::model::{normalize_name, Field, FieldMapping, FieldType, RecordValues};

/// Inputs for one resolution
#[derive(Debug, Clone, Copy)]
pub struct MappingRequest<'a> {
    pub rule_id: &'a str,
    pub record_id: &'a str,
    pub source_table_id: &'a str,
    pub source_values: &'a RecordValues,
    pub target_table_id: &'a str,
    pub declared: &'a [FieldMapping],
    /// Normalized names of the fields the triggering mutation changed
    pub recently_changed: &'a [String],
    /// Lowest-precedence layer: (table id, values keyed by that table's fields)
    pub seed: Option<(&'a str, &'a RecordValues)>,
}

/// Resolve target values for `request`
///
/// # Errors
///
/// * `UnresolvableField` - a declared mapping names a field missing on either side
/// * `NoValuesToCopy` - nothing resolved
pub fn resolve(
    directory: &mut Directory,
    access: &dyn DataAccess,
    request: &MappingRequest<'_>,
) -> Result<RecordValues> {
    let source_fields = directory.fields(access, request.source_table_id)?;
    let target_fields = directory.fields(access, request.target_table_id)?;

    let mut out = RecordValues::new();

    if let Some((seed_table_id, seed_values)) = request.seed {
        let seed_fields = directory.fields(access, seed_table_id)?;
        carry_by_name(&seed_fields, seed_values, &target_fields, &mut out);
    }

    let mut carried = RecordValues::new();
    carry_by_name(&source_fields, request.source_values, &target_fields, &mut carried);
    let carried_ids: Vec<String> = carried.keys().cloned().collect();
    out.extend(carried);

    for mapping in request.declared {
        let target = find_named(&target_fields, &mapping.target_field_name).ok_or_else(|| {
            TabulaError::UnresolvableField {
                rule_id: request.rule_id.to_string(),
                field: mapping.target_field_name.clone(),
            }
        })?;
        let source = find_named(&source_fields, &mapping.source_field_name).ok_or_else(|| {
            TabulaError::UnresolvableField {
                rule_id: request.rule_id.to_string(),
                field: mapping.source_field_name.clone(),
            }
        })?;

        // undefined source values are skipped; null and "" still propagate
        let Some(value) = request.source_values.get(&source.id) else {
            continue;
        };

        let freshest = request
            .recently_changed
            .contains(&normalize_name(&target.name))
            && carried_ids.contains(&target.id);
        if freshest {
            continue;
        }

        out.insert(target.id.clone(), translate_value(Some(source), target, value));
    }

    if out.is_empty() {
        return Err(TabulaError::NoValuesToCopy {
            rule_id: request.rule_id.to_string(),
            record_id: request.record_id.to_string(),
        });
    }

    Ok(out)
}

/// Re-key `values` from `from_fields` ids to same-named `to_fields` ids
///
/// Values whose key is not a field of `from_fields` are dropped.
pub fn carry_by_name(
    from_fields: &[Field],
    values: &RecordValues,
    to_fields: &[Field],
    out: &mut RecordValues,
) {
    for (field_id, value) in values {
        let Some(from) = from_fields.iter().find(|f| &f.id == field_id) else {
            continue;
        };
        if let Some(to) = find_named(to_fields, &from.name) {
            out.insert(to.id.clone(), translate_value(Some(from), to, value));
        }
    }
}

fn find_named<'f>(fields: &'f [Field], name: &str) -> Option<&'f Field> {
    fields.iter().find(|f| f.is_named(name))
}

/// Convert a value for storage in `target`
///
/// Select option ids are table-specific, so they travel by label: an option
/// id becomes the target's option id with the same label, or the bare label
/// when the target has no such option or is not a select.
pub fn translate_value(source: Option<&Field>, target: &Field, value: &Value) -> Value {
    match value {
        Value::Array(items) if target.field_type == FieldType::MultiSelect => Value::Array(
            items
                .iter()
                .map(|item| translate_scalar(source, target, item))
                .collect(),
        ),
        _ => translate_scalar(source, target, value),
    }
}

fn translate_scalar(source: Option<&Field>, target: &Field, value: &Value) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };

    let label = source
        .filter(|s| s.field_type.is_select())
        .and_then(|s| s.option_label(raw));

    match (label, target.field_type.is_select()) {
        (Some(label), true) => target
            .option_id_for_label(label)
            .map(|id| Value::String(id.to_string()))
            .unwrap_or_else(|| Value::String(label.to_string())),
        (Some(label), false) => Value::String(label.to_string()),
        (None, true) => {
            if target.option_label(raw).is_some() {
                value.clone()
            } else {
                target
                    .option_id_for_label(raw)
                    .map(|id| Value::String(id.to_string()))
                    .unwrap_or_else(|| value.clone())
            }
        }
        (None, false) => value.clone(),
    }
}
