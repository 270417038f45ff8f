// Integration tests for persisting and reading back the directory

mod common;

use common::*;
use serde_json::json;
use tabula_core::model::{
    Action, ActionKind, FieldMapping, FieldOptions, Operator, Rule, Trigger,
};
use tabula_core::{DataAccess, Directory};
use tabula_store::{SqliteAccess, SqliteRepo};

#[test]
fn test_fields_come_back_ordered_with_select_options() {
    // Given: The ops schema persisted to SQLite
    let conn = ops_db();
    let access = SqliteAccess::new(&conn);

    // When: Intake's fields are read back
    let fields = access.fields(INTAKE).unwrap();

    // Then: They are ordered by position and select options survive
    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Name", "Status", "Notes"]);
    assert_eq!(fields[1].option_label("i_approved"), Some("Approved"));
    assert_eq!(fields[0].options, FieldOptions::None);
}

#[test]
fn test_malformed_options_are_rejected_on_read() {
    // Given: A select field whose stored options have no labels
    let conn = ops_db();
    conn.execute(
        "UPDATE fields SET options = ?1 WHERE id = 'i_status'",
        [r#"{"choices": [{"id": "x"}]}"#],
    )
    .unwrap();

    // When: The fields are read
    let err = SqliteAccess::new(&conn).fields(INTAKE).unwrap_err();

    // Then: The directory boundary reports invalid options
    assert_eq!(err.kind(), tabula_core::ExErrorKind::InvalidOptions);
}

#[test]
fn test_rules_are_listed_in_creation_order() {
    // Given: Two rules persisted out of creation order
    let conn = ops_db();
    let mut first = Rule::new(
        "rule_first",
        BASE,
        Trigger::field_change("Status").when(Operator::Equals, json!("Approved")),
        Action::new(ActionKind::Relocate, "Approved"),
    );
    let mut second = Rule::new(
        "rule_second",
        BASE,
        Trigger::field_change("Name"),
        Action::new(ActionKind::Reference, "Approved").with_mapping(FieldMapping::same("Name")),
    )
    .disabled();
    first.created_at = chrono::DateTime::from_timestamp_millis(1_000).unwrap();
    second.created_at = chrono::DateTime::from_timestamp_millis(2_000).unwrap();
    SqliteRepo::persist_rule(&conn, &second).unwrap();
    SqliteRepo::persist_rule(&conn, &first).unwrap();

    // When: The base's rules are listed
    let rules = SqliteAccess::new(&conn).rules_for_base(BASE).unwrap();

    // Then: Creation order wins and trigger/action JSON round-trips
    assert_eq!(rules, vec![first, second]);
}

#[test]
fn test_directory_resolves_master_over_sqlite() {
    // Given: The ops schema
    let conn = ops_db();
    let access = SqliteAccess::new(&conn);
    let mut directory = Directory::new();

    // When / Then: The master table and case-insensitive names resolve
    let master = directory.master_table(&access, BASE).unwrap().unwrap();
    assert_eq!(master.id, MASTER);
    let approved = access.table_by_name(BASE, " approved ").unwrap().unwrap();
    assert_eq!(approved.id, APPROVED);
}
