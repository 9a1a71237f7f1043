use qldb_seed_ledger::{LedgerError, LedgerSession, MemoryLedger, RetryPolicy};
use qldb_seed_schema::{
    create_index_statement, create_table_statement, insert_statement, to_documents, SampleData,
    Table, INDEXES, USER_TABLES_QUERY,
};
use serde_json::{json, Value};

fn no_delay() -> RetryPolicy {
    RetryPolicy {
        max_retries: 4,
        base_delay_ms: 0,
    }
}

#[test]
fn schema_and_sample_persons_round_trip_through_a_session() {
    let ledger = MemoryLedger::new("vehicle-registration");
    let mut session = LedgerSession::open(&ledger, ledger.name(), no_delay()).unwrap();

    session
        .execute(
            |txn| {
                for table in Table::ALL {
                    txn.execute(&create_table_statement(table), &[])?;
                }
                for index in INDEXES {
                    txn.execute(&create_index_statement(index), &[])?;
                }
                Ok::<_, LedgerError>(())
            },
            |_| {},
        )
        .unwrap();

    let persons = to_documents(&SampleData::template().persons).unwrap();
    let ids = session
        .execute(|txn| txn.execute(&insert_statement(Table::Person), &[persons.clone()]), |_| {})
        .unwrap();
    session.close().unwrap();

    assert_eq!(ids.len(), SampleData::template().persons.len());
    let stored = ledger.documents("Person");
    for (row, doc) in ids.iter().zip(&stored) {
        assert_eq!(row["documentId"], doc.id.as_str());
    }
    assert_eq!(stored[0].data["GovId"], persons[0]["GovId"]);
    assert_eq!(ledger.indexes("DriversLicense"), vec!["PersonId", "LicenseNumber"]);
    assert_eq!(ledger.sessions_ended(), 1);
}

#[test]
fn catalog_query_sees_committed_schema() {
    let ledger = MemoryLedger::new("l");
    let mut session = LedgerSession::open(&ledger, ledger.name(), no_delay()).unwrap();
    session
        .execute(|txn| txn.execute("CREATE TABLE Vehicle", &[]), |_| {})
        .unwrap();
    session
        .execute(|txn| txn.execute("CREATE INDEX on Vehicle (VIN)", &[]), |_| {})
        .unwrap();

    let rows: Vec<Value> = session
        .execute(|txn| txn.execute(USER_TABLES_QUERY, &[json!("Vehicle")]), |_| {})
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], "ACTIVE");
    assert_eq!(rows[0]["indexes"][0], json!({"expr": "[VIN]", "status": "ONLINE"}));
}

#[test]
fn conflict_during_insert_does_not_duplicate_documents() {
    let ledger = MemoryLedger::new("l");
    let mut session = LedgerSession::open(&ledger, ledger.name(), no_delay()).unwrap();
    session
        .execute(|txn| txn.execute("CREATE TABLE Person", &[]), |_| {})
        .unwrap();

    ledger.inject_occ_conflicts(2);
    let mut retries = 0;
    session
        .execute(
            |txn| txn.execute("INSERT INTO Person ?", &[json!([{"GovId": "x"}])]),
            |_| retries += 1,
        )
        .unwrap();

    assert_eq!(retries, 2);
    assert_eq!(ledger.documents("Person").len(), 1);
    assert_eq!(ledger.commits(), 2);
}

#[test]
fn injected_statement_failure_surfaces_statement_text() {
    let ledger = MemoryLedger::new("l");
    ledger.fail_statements_containing("INDEX");
    let mut session = LedgerSession::open(&ledger, ledger.name(), no_delay()).unwrap();
    session
        .execute(|txn| txn.execute("CREATE TABLE Person", &[]), |_| {})
        .unwrap();

    let err = session
        .execute(|txn| txn.execute("CREATE INDEX on Person (GovId)", &[]), |_| {})
        .unwrap_err();
    match err {
        LedgerError::Statement { statement, .. } => {
            assert_eq!(statement, "CREATE INDEX on Person (GovId)");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(ledger.indexes("Person").is_empty());
}
