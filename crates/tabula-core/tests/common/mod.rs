use serde_json::Value;
use tabula_core::automation::{AutomationEngine, AutomationOptions, AutomationReport};
use tabula_core::model::{Base, Field, FieldType, NewRecord, RecordPatch, RecordValues, Table};
use tabula_core::{DataAccess, Store};

pub const BASE: &str = "base_ops";
pub const MASTER: &str = "tbl_master";
pub const INTAKE: &str = "tbl_intake";
pub const APPROVED: &str = "tbl_approved";
pub const ARCHIVE: &str = "tbl_archive";

/// Build a value map from (field id, value) pairs
#[allow(dead_code)]
pub fn values(pairs: &[(&str, Value)]) -> RecordValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn status(id: &str, table: &str, prefix: &str) -> Field {
    Field::new(id, table, "Status", FieldType::SingleSelect)
        .with_option(&format!("{prefix}_draft"), "Draft", "gray")
        .with_option(&format!("{prefix}_approved"), "Approved", "green")
}

/// Base with a master table and three working tables
///
/// | table    | fields                              |
/// |----------|-------------------------------------|
/// | Master   | Name, Status, Notes, Amount         |
/// | Intake   | Name, Status, Notes, Amount         |
/// | Approved | Name, Status, Amount                |
/// | Archive  | Name, Amount, Extra                 |
///
/// Field ids are `<table prefix>_<field>`; Status option ids are
/// `<table prefix>_draft` / `<table prefix>_approved`.
#[allow(dead_code)]
pub fn ops_store() -> Store {
    let mut store = Store::new();
    store.insert_base(Base::new(BASE, "Operations"));
    store
        .insert_table(Table::new(MASTER, BASE, "Master").master())
        .unwrap();
    store.insert_table(Table::new(INTAKE, BASE, "Intake")).unwrap();
    store
        .insert_table(Table::new(APPROVED, BASE, "Approved"))
        .unwrap();
    store.insert_table(Table::new(ARCHIVE, BASE, "Archive")).unwrap();

    for (table, prefix) in [(MASTER, "m"), (INTAKE, "i"), (APPROVED, "a"), (ARCHIVE, "x")] {
        store.insert_field(
            Field::new(format!("{prefix}_name"), table, "Name", FieldType::Text).with_position(0),
        );
        store.insert_field(
            Field::new(format!("{prefix}_amount"), table, "Amount", FieldType::Number)
                .with_position(3),
        );
    }
    for (table, prefix) in [(MASTER, "m"), (INTAKE, "i"), (APPROVED, "a")] {
        store.insert_field(status(&format!("{prefix}_status"), table, prefix).with_position(1));
    }
    for (table, prefix) in [(MASTER, "m"), (INTAKE, "i")] {
        store.insert_field(
            Field::new(format!("{prefix}_notes"), table, "Notes", FieldType::Text)
                .with_position(2),
        );
    }
    store.insert_field(Field::new("x_extra", ARCHIVE, "Extra", FieldType::Text).with_position(4));
    store
}

/// Insert a record the way the engine's create command does: commit, sync
/// the master row, then run automation
#[allow(dead_code)]
pub fn create(
    store: &mut Store,
    table_id: &str,
    record_id: &str,
    data: RecordValues,
) -> AutomationReport {
    create_with(store, table_id, record_id, data, AutomationOptions::default())
}

#[allow(dead_code)]
pub fn create_with(
    store: &mut Store,
    table_id: &str,
    record_id: &str,
    data: RecordValues,
    options: AutomationOptions,
) -> AutomationReport {
    store
        .insert_record(NewRecord::new(table_id, data.clone()).with_id(record_id))
        .unwrap();
    let mut engine = AutomationEngine::new(store, options);
    engine.sync_master(table_id, record_id, &data).unwrap();
    engine.on_record_created(table_id, record_id, &data).unwrap()
}

/// Update a record the way the engine's update command does
#[allow(dead_code)]
pub fn update(
    store: &mut Store,
    table_id: &str,
    record_id: &str,
    changed: RecordValues,
) -> AutomationReport {
    let after = store
        .update_record(record_id, &RecordPatch::merge(table_id, changed.clone()))
        .unwrap()
        .expect("record to update");
    let mut engine = AutomationEngine::new(store, AutomationOptions::default());
    engine.sync_master(table_id, record_id, &after.values).unwrap();
    engine
        .on_record_mutated(table_id, record_id, &changed, Some(&after.values))
        .unwrap()
}

/// Values of the row `record_id` in `table_id`, if any
#[allow(dead_code)]
pub fn row(store: &Store, table_id: &str, record_id: &str) -> Option<RecordValues> {
    store
        .record_in(table_id, record_id)
        .unwrap()
        .map(|r| r.values)
}
