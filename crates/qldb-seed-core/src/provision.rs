use crate::{CoreError, ProvisionConfig, SchemaReadiness, SchemaStage};
use qldb_seed_ledger::{LedgerConnection, LedgerConnector, LedgerSession, RetryPolicy, Transaction};
use qldb_seed_schema::{
    create_index_statement, create_table_statement, insert_statement, link_person_ids,
    to_documents, DocumentId, LedgerName, SampleData, Table, INDEXES,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

/// Outcome of a complete provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub ledger: LedgerName,
    /// Rows returned by the CREATE TABLE statements, one per table created.
    pub tables_created: usize,
    /// Rows returned by the CREATE INDEX statements.
    pub indexes_created: usize,
    pub documents_inserted: usize,
    /// Ledger-assigned Person ids, in insertion order.
    pub person_ids: Vec<DocumentId>,
}

/// Creates the DMV schema in a ledger and loads the linked sample dataset.
///
/// Three phases run in order, each as one transaction that is re-run on OCC
/// conflicts: create tables, create indexes, insert and link documents. The
/// configured [`SchemaReadiness`] strategy separates the phases. A failing
/// phase stops the run; nothing already committed is rolled back.
#[derive(Debug, Clone)]
pub struct Provisioner {
    readiness: SchemaReadiness,
    retry: RetryPolicy,
    data: &'static SampleData,
}

impl Provisioner {
    pub fn new(config: &ProvisionConfig) -> Self {
        Self {
            readiness: config.readiness,
            retry: config.retry,
            data: SampleData::template(),
        }
    }

    /// Use `data` instead of the built-in sample dataset.
    #[must_use]
    pub fn with_data(mut self, data: &'static SampleData) -> Self {
        self.data = data;
        self
    }

    pub fn run<K: LedgerConnector>(
        &self,
        connector: &K,
        ledger: &LedgerName,
    ) -> Result<ProvisionReport, CoreError> {
        info!("provisioning ledger {ledger}");
        let mut session = LedgerSession::open(connector, ledger, self.retry)?;

        let tables_created = session.execute(create_tables, log_retry)?;
        info!("created {tables_created} tables");
        self.readiness.wait(&mut session, SchemaStage::Tables)?;

        let indexes_created = session.execute(create_indexes, log_retry)?;
        info!("created {indexes_created} indexes");
        self.readiness.wait(&mut session, SchemaStage::Indexes)?;

        let (person_ids, documents_inserted) =
            session.execute(|txn| insert_and_link(txn, self.data), log_retry)?;
        info!("inserted {documents_inserted} documents into {ledger}");

        session.close()?;
        Ok(ProvisionReport {
            ledger: ledger.clone(),
            tables_created,
            indexes_created,
            documents_inserted,
            person_ids,
        })
    }
}

fn log_retry(attempt: u32) {
    info!("Retrying due to OCC conflict (attempt {attempt})");
}

/// Issue one CREATE TABLE per table and return the number of result rows.
///
/// QLDB answers each CREATE with a single `{tableId}` row.
pub fn create_tables<C: LedgerConnection>(txn: &mut Transaction<'_, C>) -> Result<usize, CoreError> {
    Table::ALL
        .into_iter()
        .map(|table| drain(txn, &create_table_statement(table)))
        .sum()
}

/// Issue one CREATE INDEX per index and return the number of result rows.
pub fn create_indexes<C: LedgerConnection>(
    txn: &mut Transaction<'_, C>,
) -> Result<usize, CoreError> {
    INDEXES
        .iter()
        .map(|index| drain(txn, &create_index_statement(index)))
        .sum()
}

fn drain<C: LedgerConnection>(txn: &mut Transaction<'_, C>, statement: &str) -> Result<usize, CoreError> {
    let rows = txn.execute(statement, &[])?;
    debug!("{statement}: {} result rows", rows.len());
    Ok(rows.len())
}

/// Insert the Person records, link licenses and registrations to the
/// returned ids, then insert vehicles, registrations and licenses.
///
/// Returns the Person ids and the total number of inserted documents.
pub fn insert_and_link<C: LedgerConnection>(
    txn: &mut Transaction<'_, C>,
    data: &SampleData,
) -> Result<(Vec<DocumentId>, usize), CoreError> {
    let person_ids = insert_documents(txn, Table::Person, to_documents(&data.persons)?)?;
    let linked = link_person_ids(data, &person_ids)?;

    let vehicles = insert_documents(txn, Table::Vehicle, to_documents(&data.vehicles)?)?;
    let registrations = insert_documents(
        txn,
        Table::VehicleRegistration,
        to_documents(&linked.vehicle_registrations)?,
    )?;
    let licenses = insert_documents(
        txn,
        Table::DriversLicense,
        to_documents(&linked.drivers_licenses)?,
    )?;

    let total = person_ids.len() + vehicles.len() + registrations.len() + licenses.len();
    Ok((person_ids, total))
}

/// Insert `documents` (a list) with one statement and return the ids of the
/// new documents in insertion order.
fn insert_documents<C: LedgerConnection>(
    txn: &mut Transaction<'_, C>,
    table: Table,
    documents: Value,
) -> Result<Vec<DocumentId>, CoreError> {
    let rows = txn.execute(&insert_statement(table), &[documents])?;
    let ids = rows
        .iter()
        .map(|row| {
            row["documentId"]
                .as_str()
                .map(DocumentId::new)
                .ok_or_else(|| CoreError::MissingDocumentId(table.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    info!("inserted {} documents into {table}", ids.len());
    Ok(ids)
}
