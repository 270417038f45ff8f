mod common;

use common::*;
use serde_json::json;
use tabula_core::logging_facility::init_test_capture;
use tabula_core::model::{Action, ActionKind, FieldMapping, Operator, Rule, Trigger};
use tabula_core_types::schema::{EVENT_REVERSED, EVENT_RULE_FAILED, EVENT_RULE_FIRED};

// The capture is process-wide; every assertion filters on ids unique to its test.

#[test]
fn test_pass_emits_start_end_and_rule_events() {
    let capture = init_test_capture();

    // Given a relocate rule and a draft record
    let mut store = ops_store();
    store.insert_rule(Rule::new(
        "rule_log_move",
        BASE,
        Trigger::field_change("Status")
            .in_table("Intake")
            .when(Operator::Equals, json!("Approved")),
        Action::new(ActionKind::Relocate, "Approved"),
    ));
    create(
        &mut store,
        INTAKE,
        "rec_log_1",
        values(&[("i_name", json!("Acme")), ("i_status", json!("i_draft"))]),
    );

    // When the rule fires and is later reversed
    update(&mut store, INTAKE, "rec_log_1", values(&[("i_status", json!("i_approved"))]));
    update(&mut store, APPROVED, "rec_log_1", values(&[("a_status", json!("a_draft"))]));

    // Then both are logged against the record
    let events = capture.events_with("record_id", "rec_log_1");
    assert!(events
        .iter()
        .any(|e| e.event.as_deref() == Some(EVENT_RULE_FIRED)
            && e.rule_id() == Some("rule_log_move")));
    assert!(events
        .iter()
        .any(|e| e.event.as_deref() == Some(EVENT_REVERSED)));
    capture.assert_event_exists("on_record_mutated", "start");
    capture.assert_event_exists("on_record_mutated", "end");
}

#[test]
fn test_configuration_error_is_logged_as_warning() {
    let capture = init_test_capture();

    let mut store = ops_store();
    store.insert_rule(Rule::new(
        "rule_log_misconfigured",
        BASE,
        Trigger::field_change("Status").in_table("Intake"),
        Action::new(ActionKind::Duplicate, "Nowhere").with_mapping(FieldMapping::same("Name")),
    ));
    create(&mut store, INTAKE, "rec_log_2", values(&[("i_status", json!("i_draft"))]));

    let warnings = capture.count_events(|e| {
        e.rule_id() == Some("rule_log_misconfigured")
            && e.level == tracing::Level::WARN
            && e.field("err_code") == Some("ERR_CONFIGURATION")
    });
    assert_eq!(warnings, 1);
}

#[test]
fn test_failed_action_is_logged_as_error() {
    let capture = init_test_capture();

    let mut store = ops_store();
    store.insert_rule(Rule::new(
        "rule_log_failing",
        BASE,
        Trigger::field_change("Name").in_table("Intake"),
        Action::new(ActionKind::Reference, "Archive").with_mapping(FieldMapping::same("Name")),
    ));
    store.fail_writes_to(ARCHIVE);
    create(&mut store, INTAKE, "rec_log_3", values(&[("i_name", json!("Acme"))]));

    let failures = capture.count_events(|e| {
        e.rule_id() == Some("rule_log_failing")
            && e.event.as_deref() == Some(EVENT_RULE_FAILED)
            && e.field("err_code") == Some("ERR_PERSISTENCE")
    });
    assert_eq!(failures, 1);
}
