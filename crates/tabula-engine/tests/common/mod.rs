use rusqlite::Connection;
use serde_json::Value;
use tabula_core::model::{Base, Field, FieldType, RecordValues, Rule, Table};
use tabula_store::{migrations::apply_migrations, SqliteRepo};

pub const BASE: &str = "base_crm";
pub const MASTER: &str = "tbl_contacts";
pub const LEADS: &str = "tbl_leads";
pub const CUSTOMERS: &str = "tbl_customers";

#[allow(dead_code)]
pub fn values(pairs: &[(&str, Value)]) -> RecordValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Contacts (master), Leads and Customers, each with Name and Stage
///
/// Field ids are `<prefix>_name` / `<prefix>_stage` with prefixes c / l / u.
/// Stage option ids are `<prefix>_open` ("Open") and `<prefix>_won` ("Won").
#[allow(dead_code)]
pub fn crm_db(rules: &[Rule]) -> Connection {
    let mut conn = Connection::open_in_memory().expect("in-memory database");
    apply_migrations(&mut conn).expect("migrations");

    SqliteRepo::persist_base(&conn, &Base::new(BASE, "CRM")).unwrap();
    SqliteRepo::persist_table(&conn, &Table::new(MASTER, BASE, "Contacts").master()).unwrap();
    SqliteRepo::persist_table(&conn, &Table::new(LEADS, BASE, "Leads")).unwrap();
    SqliteRepo::persist_table(&conn, &Table::new(CUSTOMERS, BASE, "Customers")).unwrap();
    for (table, prefix) in [(MASTER, "c"), (LEADS, "l"), (CUSTOMERS, "u")] {
        SqliteRepo::persist_field(
            &conn,
            &Field::new(format!("{prefix}_name"), table, "Name", FieldType::Text),
        )
        .unwrap();
        SqliteRepo::persist_field(
            &conn,
            &Field::new(format!("{prefix}_stage"), table, "Stage", FieldType::SingleSelect)
                .with_option(&format!("{prefix}_open"), "Open", "blue")
                .with_option(&format!("{prefix}_won"), "Won", "green")
                .with_position(1),
        )
        .unwrap();
    }
    for rule in rules {
        SqliteRepo::persist_rule(&conn, rule).unwrap();
    }
    conn
}
