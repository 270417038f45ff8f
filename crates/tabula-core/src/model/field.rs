use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{Result, TabulaError};

/// Column type; drives how values are encoded in records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    LongText,
    Number,
    Checkbox,
    Date,
    Email,
    Url,
    Phone,
    /// Stores a single option id resolved through `FieldOptions::Select`
    SingleSelect,
    /// Stores an array of option ids
    MultiSelect,
    Link,
    #[serde(other)]
    Other,
}

impl FieldType {
    pub fn is_select(&self) -> bool {
        matches!(self, FieldType::SingleSelect | FieldType::MultiSelect)
    }
}

/// Display payload of one select option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub color: String,
}

/// Typed field options, validated at the directory boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldOptions {
    #[default]
    None,
    /// option id -> {label, color}
    Select(BTreeMap<String, SelectOption>),
}

const DEFAULT_OPTION_COLOR: &str = "gray";

impl FieldOptions {
    /// Validate a loosely-typed options payload for a field of `field_type`
    ///
    /// Accepted select shapes: `{"choices": ...}` wrapping either of
    /// `{"<id>": {"label", "color"}}` or `[{"id", "label", "color"}]`, or
    /// those two shapes directly. Non-select fields always get `None`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldOptions` when a select payload has the wrong shape,
    /// an option without a label, or a duplicate option id.
    pub fn from_raw(
        field_id: &str,
        field_type: FieldType,
        raw: Option<&serde_json::Value>,
    ) -> Result<Self> {
        if !field_type.is_select() {
            return Ok(FieldOptions::None);
        }

        let invalid = |reason: &str| TabulaError::InvalidFieldOptions {
            field_id: field_id.to_string(),
            reason: reason.to_string(),
        };

        let raw = match raw {
            None | Some(serde_json::Value::Null) => {
                return Ok(FieldOptions::Select(BTreeMap::new()))
            }
            Some(v) => v,
        };
        let choices = raw.get("choices").unwrap_or(raw);

        let mut out = BTreeMap::new();
        match choices {
            serde_json::Value::Object(map) => {
                for (id, payload) in map {
                    let option =
                        parse_option(payload).ok_or_else(|| invalid("option without a label"))?;
                    out.insert(id.clone(), option);
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    let id = item
                        .get("id")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| invalid("option without an id"))?;
                    let option =
                        parse_option(item).ok_or_else(|| invalid("option without a label"))?;
                    if out.insert(id.to_string(), option).is_some() {
                        return Err(invalid(&format!("duplicate option id '{}'", id)));
                    }
                }
            }
            _ => return Err(invalid("choices must be an object or an array")),
        }

        Ok(FieldOptions::Select(out))
    }

    pub fn choices(&self) -> Option<&BTreeMap<String, SelectOption>> {
        match self {
            FieldOptions::Select(choices) => Some(choices),
            FieldOptions::None => None,
        }
    }
}

fn parse_option(payload: &serde_json::Value) -> Option<SelectOption> {
    let label = payload.get("label").and_then(|v| v.as_str())?.trim();
    if label.is_empty() {
        return None;
    }
    let color = payload
        .get("color")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_OPTION_COLOR);
    Some(SelectOption {
        label: label.to_string(),
        color: color.to_string(),
    })
}

/// Field - typed column of a table
///
/// The id is unique per table; the name is the join key across tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub table_id: String,
    pub name: String,
    pub field_type: FieldType,
    pub options: FieldOptions,
    pub position: u32,
}

impl Field {
    pub fn new(
        id: impl Into<String>,
        table_id: impl Into<String>,
        name: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        let options = if field_type.is_select() {
            FieldOptions::Select(BTreeMap::new())
        } else {
            FieldOptions::None
        };
        Self {
            id: id.into(),
            table_id: table_id.into(),
            name: name.into(),
            field_type,
            options,
            position: 0,
        }
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    /// Add a select option (no-op for non-select fields)
    pub fn with_option(mut self, id: &str, label: &str, color: &str) -> Self {
        if let FieldOptions::Select(choices) = &mut self.options {
            choices.insert(
                id.to_string(),
                SelectOption {
                    label: label.to_string(),
                    color: color.to_string(),
                },
            );
        }
        self
    }

    pub fn is_named(&self, name: &str) -> bool {
        names_match(&self.name, name)
    }

    /// Display label for a stored option id
    pub fn option_label(&self, option_id: &str) -> Option<&str> {
        self.options
            .choices()
            .and_then(|c| c.get(option_id))
            .map(|o| o.label.as_str())
    }

    /// Option id whose label matches `label` (case-insensitive)
    pub fn option_id_for_label(&self, label: &str) -> Option<&str> {
        self.options.choices().and_then(|c| {
            c.iter()
                .find(|(_, o)| names_match(&o.label, label))
                .map(|(id, _)| id.as_str())
        })
    }
}

/// Canonical form used when matching names across tables
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn names_match(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_raw_accepts_choice_map() {
        let raw = json!({"choices": {"opt_a": {"label": "Draft", "color": "blue"}}});
        let options = FieldOptions::from_raw("fld_1", FieldType::SingleSelect, Some(&raw)).unwrap();
        let choices = options.choices().unwrap();
        assert_eq!(choices["opt_a"].label, "Draft");
        assert_eq!(choices["opt_a"].color, "blue");
    }

    #[test]
    fn test_from_raw_accepts_choice_array_and_defaults_color() {
        let raw = json!([{"id": "opt_a", "label": "Draft"}, {"id": "opt_b", "label": "Approved"}]);
        let options = FieldOptions::from_raw("fld_1", FieldType::SingleSelect, Some(&raw)).unwrap();
        let choices = options.choices().unwrap();
        assert_eq!(choices.len(), 2);
        assert_eq!(choices["opt_a"].color, DEFAULT_OPTION_COLOR);
    }

    #[test]
    fn test_from_raw_rejects_duplicate_ids() {
        let raw = json!([{"id": "opt_a", "label": "A"}, {"id": "opt_a", "label": "B"}]);
        let err = FieldOptions::from_raw("fld_1", FieldType::SingleSelect, Some(&raw)).unwrap_err();
        assert!(matches!(err, TabulaError::InvalidFieldOptions { .. }));
    }

    #[test]
    fn test_from_raw_rejects_missing_label() {
        let raw = json!({"opt_a": {"color": "red"}});
        assert!(FieldOptions::from_raw("fld_1", FieldType::SingleSelect, Some(&raw)).is_err());
    }

    #[test]
    fn test_from_raw_ignores_payload_for_text_fields() {
        let raw = json!("whatever");
        let options = FieldOptions::from_raw("fld_1", FieldType::Text, Some(&raw)).unwrap();
        assert_eq!(options, FieldOptions::None);
    }

    #[test]
    fn test_option_lookup_both_directions() {
        let field = Field::new("fld_1", "tbl_1", "Status", FieldType::SingleSelect)
            .with_option("opt_d", "Draft", "gray")
            .with_option("opt_a", "Approved", "green");

        assert_eq!(field.option_label("opt_a"), Some("Approved"));
        assert_eq!(field.option_label("Approved"), None);
        assert_eq!(field.option_id_for_label("approved"), Some("opt_a"));
    }

    #[test]
    fn test_unknown_field_type_deserializes_as_other() {
        let t: FieldType = serde_json::from_str("\"formula\"").unwrap();
        assert_eq!(t, FieldType::Other);
    }
}
