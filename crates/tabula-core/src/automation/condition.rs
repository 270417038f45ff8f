//! Condition evaluation for rule triggers.
//!
//! Resolving which field to read is the subtle part: field ids are per table,
//! so a rule that names "Status" must find the right column whichever table
//! the record lives in at the moment of evaluation.

use serde_json::Value;

use crate::access::DataAccess;
use crate::directory::Directory;
use crate::errors::Result;
use crate::model::{Field, FieldType, Operator, RecordValues, Table};

/// Result of checking a trigger condition against a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOutcome {
    Satisfied,
    NotSatisfied,
    /// The field does not exist where the record is checked; the rule does not
    /// apply here. Never a reason to reverse a relocation.
    NotApplicable,
}

/// Evaluate `field_ref <operator> expected` for a record
///
/// `record_table_id` is the table the record is physically stored in;
/// `record_values` are keyed by that table's field ids.
#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    directory: &mut Directory,
    access: &dyn DataAccess,
    table_to_check: &Table,
    field_ref: &str,
    operator: Operator,
    expected: &Value,
    record_values: &RecordValues,
    record_table_id: &str,
) -> Result<ConditionOutcome> {
    let Some(field) = resolve_field(
        directory,
        access,
        table_to_check,
        field_ref,
        record_values,
        record_table_id,
    )?
    else {
        return Ok(ConditionOutcome::NotApplicable);
    };

    let actual = display_value(&field, record_values.get(&field.id));
    let expected = display_value(&field, Some(expected));

    if compare(operator, &actual, &expected) {
        Ok(ConditionOutcome::Satisfied)
    } else {
        Ok(ConditionOutcome::NotSatisfied)
    }
}

/// Find the field whose value the condition reads
///
/// Order: the named field (or legacy id) in `table_to_check`; the same name
/// in the master table when the record is stored there; the first same-named
/// field in the base whose id is present in the record's values. A legacy id
/// that names a field elsewhere in the base is retried by that field's name.
pub fn resolve_field(
    directory: &mut Directory,
    access: &dyn DataAccess,
    table_to_check: &Table,
    field_ref: &str,
    record_values: &RecordValues,
    record_table_id: &str,
) -> Result<Option<Field>> {
    if let Some(field) = resolve_by_ref(
        directory,
        access,
        table_to_check,
        field_ref,
        record_values,
        record_table_id,
    )? {
        return Ok(Some(field));
    }

    let name = directory
        .base_fields(access, &table_to_check.base_id)?
        .into_iter()
        .find(|f| f.id == field_ref)
        .map(|f| f.name);
    let Some(name) = name else {
        return Ok(None);
    };
    if name.is_empty() || name == field_ref {
        return Ok(None);
    }
    resolve_by_ref(
        directory,
        access,
        table_to_check,
        &name,
        record_values,
        record_table_id,
    )
}

fn resolve_by_ref(
    directory: &mut Directory,
    access: &dyn DataAccess,
    table_to_check: &Table,
    field_ref: &str,
    record_values: &RecordValues,
    record_table_id: &str,
) -> Result<Option<Field>> {
    let checked = directory.fields(access, &table_to_check.id)?;
    if let Some(field) = checked
        .iter()
        .find(|f| f.is_named(field_ref))
        .or_else(|| checked.iter().find(|f| f.id == field_ref))
    {
        return Ok(Some(field.clone()));
    }

    if let Some(master) = directory.master_table(access, &table_to_check.base_id)? {
        if master.id == record_table_id {
            if let Some(field) = directory.field_by_name(access, &master.id, field_ref)? {
                return Ok(Some(field));
            }
        }
    }

    let base_fields = directory.base_fields(access, &table_to_check.base_id)?;
    Ok(base_fields.into_iter().find(|f| {
        (f.is_named(field_ref) || f.id == field_ref) && record_values.contains_key(&f.id)
    }))
}

/// The comparable form of a stored value: select option ids become labels
///
/// Strings that are not option ids pass through unchanged (plain-text values
/// written before the field became a select).
pub fn display_value(field: &Field, raw: Option<&Value>) -> Value {
    let raw = match raw {
        Some(v) => v,
        None => return Value::Null,
    };
    match (field.field_type, raw) {
        (FieldType::SingleSelect, Value::String(id)) => field
            .option_label(id)
            .map(|label| Value::String(label.to_string()))
            .unwrap_or_else(|| raw.clone()),
        (FieldType::MultiSelect, Value::Array(ids)) => Value::Array(
            ids.iter()
                .map(|v| match v {
                    Value::String(id) => field
                        .option_label(id)
                        .map(|label| Value::String(label.to_string()))
                        .unwrap_or_else(|| v.clone()),
                    other => other.clone(),
                })
                .collect(),
        ),
        _ => raw.clone(),
    }
}

/// Apply an operator; numeric operators are false when either side is not a number
pub fn compare(operator: Operator, actual: &Value, expected: &Value) -> bool {
    match operator {
        Operator::Equals => values_equal(actual, expected),
        Operator::NotEquals => !values_equal(actual, expected),
        Operator::Contains => {
            let needle = as_text(expected).to_lowercase();
            match actual {
                Value::Array(items) => items
                    .iter()
                    .any(|item| as_text(item).to_lowercase().contains(&needle)),
                _ => as_text(actual).to_lowercase().contains(&needle),
            }
        }
        Operator::GreaterThan
        | Operator::LessThan
        | Operator::GreaterThanOrEqual
        | Operator::LessThanOrEqual => {
            let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) else {
                return false;
            };
            match operator {
                Operator::GreaterThan => a > b,
                Operator::LessThan => a < b,
                Operator::GreaterThanOrEqual => a >= b,
                _ => a <= b,
            }
        }
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return a == b;
    }
    as_text(actual).eq_ignore_ascii_case(&as_text(expected))
}

fn as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(as_text).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}
