use rusqlite::Connection;
use serde_json::Value;
use tabula_core::model::{Base, Field, FieldType, RecordValues, Table};
use tabula_store::migrations::apply_migrations;
use tabula_store::SqliteRepo;

pub const BASE: &str = "base_ops";
pub const MASTER: &str = "tbl_master";
pub const INTAKE: &str = "tbl_intake";
pub const APPROVED: &str = "tbl_approved";

#[allow(dead_code)]
pub fn values(pairs: &[(&str, Value)]) -> RecordValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[allow(dead_code)]
pub fn migrated_db() -> Connection {
    let mut conn = Connection::open_in_memory().expect("in-memory database");
    apply_migrations(&mut conn).expect("migrations");
    conn
}

/// Master, Intake and Approved tables with Name / Status / Notes fields
///
/// Field ids are `<prefix>_<field>` with prefixes m / i / a; Approved has no
/// Notes. Status option ids are `<prefix>_draft` / `<prefix>_approved`.
#[allow(dead_code)]
pub fn ops_db() -> Connection {
    let conn = migrated_db();
    SqliteRepo::persist_base(&conn, &Base::new(BASE, "Operations")).unwrap();
    SqliteRepo::persist_table(&conn, &Table::new(MASTER, BASE, "Master").master()).unwrap();
    SqliteRepo::persist_table(&conn, &Table::new(INTAKE, BASE, "Intake")).unwrap();
    SqliteRepo::persist_table(&conn, &Table::new(APPROVED, BASE, "Approved")).unwrap();

    for (table, prefix) in [(MASTER, "m"), (INTAKE, "i"), (APPROVED, "a")] {
        let name = Field::new(format!("{prefix}_name"), table, "Name", FieldType::Text);
        let status = Field::new(
            format!("{prefix}_status"),
            table,
            "Status",
            FieldType::SingleSelect,
        )
        .with_option(&format!("{prefix}_draft"), "Draft", "gray")
        .with_option(&format!("{prefix}_approved"), "Approved", "green")
        .with_position(1);
        SqliteRepo::persist_field(&conn, &name).unwrap();
        SqliteRepo::persist_field(&conn, &status).unwrap();
    }
    for (table, prefix) in [(MASTER, "m"), (INTAKE, "i")] {
        let notes = Field::new(format!("{prefix}_notes"), table, "Notes", FieldType::LongText)
            .with_position(2);
        SqliteRepo::persist_field(&conn, &notes).unwrap();
    }
    conn
}
