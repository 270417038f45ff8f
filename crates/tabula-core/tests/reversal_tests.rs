mod common;

use common::*;
use serde_json::json;
use tabula_core::automation::{ActionOutcome, RuleOutcome};
use tabula_core::model::{Action, ActionKind, Operator, Rule, Trigger, TriggerKind};
use tabula_core::{DataAccess, Store};

fn approval_flow() -> Rule {
    Rule::new(
        "rule_approve",
        BASE,
        Trigger::field_change("Status")
            .in_table("Intake")
            .when(Operator::Equals, json!("Approved")),
        Action::new(ActionKind::Relocate, "Approved"),
    )
}

fn intake_record(store: &mut Store) {
    create(
        store,
        INTAKE,
        "r1",
        values(&[
            ("i_name", json!("Acme")),
            ("i_status", json!("i_draft")),
            ("i_notes", json!("met at expo")),
            ("i_amount", json!(1200)),
        ]),
    );
}

#[test]
fn test_intake_to_approved_and_back() {
    // Given the approval rule and r1 = {Status: Draft, Name: Acme} in Intake
    let mut store = ops_store();
    store.insert_rule(approval_flow());
    intake_record(&mut store);

    // When Status is set to Approved
    let report = update(&mut store, INTAKE, "r1", values(&[("i_status", json!("i_approved"))]));

    // Then r1 lives in Approved with Name and Status carried over
    assert_eq!(
        report.outcome_for("rule_approve"),
        Some(&RuleOutcome::Fired(ActionOutcome::Relocated {
            from_table_id: INTAKE.to_string(),
            to_table_id: APPROVED.to_string(),
        }))
    );
    assert!(row(&store, INTAKE, "r1").is_none());
    let approved = row(&store, APPROVED, "r1").expect("r1 in Approved");
    assert_eq!(approved["a_name"], json!("Acme"));
    assert_eq!(approved["a_status"], json!("a_approved"));
    // And the master row reflects the same values
    let master = row(&store, MASTER, "r1").unwrap();
    assert_eq!(master["m_name"], json!("Acme"));
    assert_eq!(master["m_status"], json!("m_approved"));

    // When Status is set back to Draft on the relocated record
    let report = update(&mut store, APPROVED, "r1", values(&[("a_status", json!("a_draft"))]));

    // Then the reversal pass moves r1 back to Intake
    let reversal = report.reversal.expect("reversal");
    assert_eq!(reversal.rule_id, "rule_approve");
    assert_eq!(reversal.from_table_id, APPROVED);
    assert_eq!(reversal.to_table_id, INTAKE);
    assert!(row(&store, APPROVED, "r1").is_none());
    assert_eq!(store.record("r1").unwrap().unwrap().table_id, INTAKE);
}

#[test]
fn test_legacy_field_id_rule_reverses_by_field_name() {
    // Given an approval rule that names its field by Intake's legacy id
    let mut store = ops_store();
    let mut trigger = Trigger::on(TriggerKind::FieldChange)
        .in_table("Intake")
        .when(Operator::Equals, json!("Approved"));
    trigger.field_id = Some("i_status".to_string());
    store.insert_rule(Rule::new(
        "rule_legacy",
        BASE,
        trigger,
        Action::new(ActionKind::Relocate, "Approved"),
    ));
    intake_record(&mut store);

    // When Status is approved, r1 moves forward
    let report = update(&mut store, INTAKE, "r1", values(&[("i_status", json!("i_approved"))]));
    assert!(report.forward_moved);
    assert!(row(&store, APPROVED, "r1").is_some());

    // When Status goes back to Draft in Approved, which has no `i_status`
    let report = update(&mut store, APPROVED, "r1", values(&[("a_status", json!("a_draft"))]));

    // Then the condition is read from Approved's Status and r1 returns
    let reversal = report.reversal.expect("reversal");
    assert_eq!(reversal.rule_id, "rule_legacy");
    assert_eq!(reversal.to_table_id, INTAKE);
    assert_eq!(store.record("r1").unwrap().unwrap().table_id, INTAKE);
}

#[test]
fn test_round_trip_keeps_pre_move_values() {
    // Given r1 with a Notes field Approved does not have
    let mut store = ops_store();
    store.insert_rule(approval_flow());
    intake_record(&mut store);

    // When it moves to Approved and back
    update(&mut store, INTAKE, "r1", values(&[("i_status", json!("i_approved"))]));
    update(&mut store, APPROVED, "r1", values(&[("a_status", json!("a_draft"))]));

    // Then every pre-move value except the trigger field is intact
    let back = row(&store, INTAKE, "r1").expect("r1 back in Intake");
    assert_eq!(back["i_name"], json!("Acme"));
    assert_eq!(back["i_notes"], json!("met at expo"));
    assert_eq!(back["i_amount"], json!(1200));
    assert_eq!(back["i_status"], json!("i_draft"));
}

#[test]
fn test_forward_move_suppresses_reversal_in_same_pass() {
    let mut store = ops_store();
    store.insert_rule(approval_flow());
    intake_record(&mut store);

    let report = update(&mut store, INTAKE, "r1", values(&[("i_status", json!("i_approved"))]));

    assert!(report.forward_moved);
    assert!(report.reversal.is_none());
}

#[test]
fn test_condition_still_holding_keeps_record_in_place() {
    let mut store = ops_store();
    store.insert_rule(approval_flow());
    intake_record(&mut store);
    update(&mut store, INTAKE, "r1", values(&[("i_status", json!("i_approved"))]));

    // When an unrelated field changes on the relocated record
    let report = update(&mut store, APPROVED, "r1", values(&[("a_amount", json!(900))]));

    assert!(report.reversal.is_none());
    assert!(row(&store, APPROVED, "r1").is_some());
}

#[test]
fn test_not_applicable_condition_never_reverses() {
    // Given a relocate rule keyed on Notes, which Approved does not have
    let mut store = ops_store();
    store.insert_rule(Rule::new(
        "rule_vip",
        BASE,
        Trigger::field_change("Notes")
            .in_table("Intake")
            .when(Operator::Equals, json!("vip")),
        Action::new(ActionKind::Relocate, "Approved"),
    ));
    intake_record(&mut store);
    update(&mut store, INTAKE, "r1", values(&[("i_notes", json!("vip"))]));
    assert!(row(&store, APPROVED, "r1").is_some());

    // When the relocated record is edited
    let report = update(&mut store, APPROVED, "r1", values(&[("a_name", json!("Acme Ltd"))]));

    // Then the missing field is not read as a false condition
    assert!(report.reversal.is_none());
    assert!(row(&store, APPROVED, "r1").is_some());
}

#[test]
fn test_reversal_without_declared_source_returns_to_master() {
    // Given an unrestricted relocate rule and a record in Intake
    let mut store = ops_store();
    store.insert_rule(Rule::new(
        "rule_any",
        BASE,
        Trigger::field_change("Status").when(Operator::Equals, json!("Approved")),
        Action::new(ActionKind::Relocate, "Approved"),
    ));
    intake_record(&mut store);
    update(&mut store, INTAKE, "r1", values(&[("i_status", json!("i_approved"))]));

    // When the condition stops holding
    let report = update(&mut store, APPROVED, "r1", values(&[("a_status", json!("a_draft"))]));

    // Then the record folds into its master row
    assert_eq!(report.reversal.unwrap().to_table_id, MASTER);
    assert!(row(&store, APPROVED, "r1").is_none());
    let master = row(&store, MASTER, "r1").unwrap();
    assert_eq!(master["m_status"], json!("m_draft"));
    assert_eq!(master["m_notes"], json!("met at expo"));
}
