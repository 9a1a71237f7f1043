//! Deterministic in-memory ledger for tests.
//!
//! Understands exactly the statements the provisioner and the catalog poller
//! issue, plus equality lookups by attribute (`SELECT * FROM T WHERE a = ?`,
//! `SELECT id FROM T AS t BY id WHERE t.a = ?`). Writes are staged per transaction and applied on commit. Faults
//! (OCC conflicts, failing statements, slow schema activation) can be
//! injected to exercise retry and error paths.

use crate::{LedgerConnection, LedgerConnector, LedgerError};
use qldb_seed_schema::{index_expr, DocumentId, LedgerName, USER_TABLES_QUERY};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub data: Value,
}

#[derive(Debug, Clone, Default)]
struct TableState {
    indexes: Vec<String>,
    documents: Vec<StoredDocument>,
}

#[derive(Debug, Clone, Default)]
struct Catalog {
    tables: BTreeMap<String, TableState>,
    next_id: u64,
}

impl Catalog {
    fn assign_id(&mut self) -> DocumentId {
        self.next_id += 1;
        DocumentId::new(format!("{:0>22}", self.next_id))
    }
}

#[derive(Debug, Default)]
struct Inner {
    committed: Catalog,
    statements: Vec<String>,
    commits: usize,
    sessions_opened: usize,
    sessions_ended: usize,
    next_txn: u64,
    pending_occ_conflicts: u32,
    failing_pattern: Option<String>,
    activation_lag: u32,
}

/// A named ledger held in memory. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    name: LedgerName,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryLedger {
    pub fn new(name: impl Into<LedgerName>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn name(&self) -> &LedgerName {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock only happens inside a failing test.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Fail the next `n` commits with an OCC conflict.
    pub fn inject_occ_conflicts(&self, n: u32) {
        self.lock().pending_occ_conflicts = n;
    }

    /// Fail every statement whose text contains `pattern`.
    pub fn fail_statements_containing(&self, pattern: &str) {
        self.lock().failing_pattern = Some(pattern.to_owned());
    }

    /// Report tables as CREATING and indexes as BUILDING for the next `polls`
    /// catalog queries.
    pub fn set_activation_lag(&self, polls: u32) {
        self.lock().activation_lag = polls;
    }

    /// Every statement executed so far, including those in aborted transactions.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    pub fn sessions_ended(&self) -> usize {
        self.lock().sessions_ended
    }

    /// Committed table names, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.lock().committed.tables.keys().cloned().collect()
    }

    /// Committed indexed attributes of `table`, in creation order.
    pub fn indexes(&self, table: &str) -> Vec<String> {
        self.lock()
            .committed
            .tables
            .get(table)
            .map(|t| t.indexes.clone())
            .unwrap_or_default()
    }

    /// Committed documents of `table`, in insertion order.
    pub fn documents(&self, table: &str) -> Vec<StoredDocument> {
        self.lock()
            .committed
            .tables
            .get(table)
            .map(|t| t.documents.clone())
            .unwrap_or_default()
    }
}

impl LedgerConnector for MemoryLedger {
    type Connection = MemoryConnection;

    fn connect(&self, ledger: &LedgerName) -> Result<MemoryConnection, LedgerError> {
        if *ledger != self.name {
            return Err(LedgerError::LedgerNotFound(ledger.to_string()));
        }
        self.lock().sessions_opened += 1;
        Ok(MemoryConnection {
            ledger: self.clone(),
            active: None,
            ended: false,
        })
    }
}

struct StagedTransaction {
    id: String,
    catalog: Catalog,
}

pub struct MemoryConnection {
    ledger: MemoryLedger,
    active: Option<StagedTransaction>,
    ended: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<(), LedgerError> {
        if self.ended {
            return Err(LedgerError::Service("session has ended".to_owned()));
        }
        Ok(())
    }
}

impl LedgerConnection for MemoryConnection {
    fn start_transaction(&mut self) -> Result<String, LedgerError> {
        self.ensure_open()?;
        let mut inner = self.ledger.lock();
        inner.next_txn += 1;
        let id = format!("txn-{}", inner.next_txn);
        self.active = Some(StagedTransaction {
            id: id.clone(),
            catalog: inner.committed.clone(),
        });
        Ok(id)
    }

    fn execute_statement(
        &mut self,
        txn_id: &str,
        statement: &str,
        parameters: &[Value],
    ) -> Result<Vec<Value>, LedgerError> {
        self.ensure_open()?;
        let staged = self
            .active
            .as_mut()
            .filter(|t| t.id == txn_id)
            .ok_or_else(|| LedgerError::NoTransaction(txn_id.to_owned()))?;

        let mut inner = self.ledger.lock();
        inner.statements.push(statement.to_owned());
        if let Some(pattern) = &inner.failing_pattern {
            if statement.contains(pattern.as_str()) {
                return Err(LedgerError::statement(statement, "injected failure"));
            }
        }

        match Statement::parse(statement) {
            Some(Statement::CreateTable(table)) => {
                if staged.catalog.tables.contains_key(table) {
                    return Err(LedgerError::statement(
                        statement,
                        format!("table already exists: {table}"),
                    ));
                }
                staged
                    .catalog
                    .tables
                    .insert(table.to_owned(), TableState::default());
                let table_id = staged.catalog.assign_id();
                Ok(vec![json!({ "tableId": table_id.as_str() })])
            }
            Some(Statement::CreateIndex { table, attribute }) => {
                let state = staged.catalog.tables.get_mut(table).ok_or_else(|| {
                    LedgerError::statement(statement, format!("no such table: {table}"))
                })?;
                if state.indexes.iter().any(|a| a == attribute) {
                    return Err(LedgerError::statement(
                        statement,
                        format!("index already exists on {table} ({attribute})"),
                    ));
                }
                state.indexes.push(attribute.to_owned());
                let table_id = staged.catalog.assign_id();
                Ok(vec![json!({ "tableId": table_id.as_str() })])
            }
            Some(Statement::Insert(table)) => {
                let documents = match parameters {
                    [Value::Array(items)] => items.clone(),
                    [doc @ Value::Object(_)] => vec![doc.clone()],
                    _ => {
                        return Err(LedgerError::statement(
                            statement,
                            "expected one document or list parameter",
                        ))
                    }
                };
                if documents.iter().any(|d| !d.is_object()) {
                    return Err(LedgerError::statement(statement, "documents must be structs"));
                }
                let catalog = &mut staged.catalog;
                if !catalog.tables.contains_key(table) {
                    return Err(LedgerError::statement(statement, format!("no such table: {table}")));
                }
                let mut results = Vec::with_capacity(documents.len());
                for data in documents {
                    let id = catalog.assign_id();
                    results.push(json!({ "documentId": id.as_str() }));
                    if let Some(state) = catalog.tables.get_mut(table) {
                        state.documents.push(StoredDocument { id, data });
                    }
                }
                Ok(results)
            }
            Some(Statement::UserTables) => {
                let name = parameters.first().and_then(Value::as_str).ok_or_else(|| {
                    LedgerError::statement(statement, "expected a table name parameter")
                })?;
                let settling = inner.activation_lag > 0;
                if settling {
                    inner.activation_lag -= 1;
                }
                let (table_status, index_status) = if settling {
                    ("CREATING", "BUILDING")
                } else {
                    ("ACTIVE", "ONLINE")
                };
                Ok(staged
                    .catalog
                    .tables
                    .get(name)
                    .map(|state| {
                        let indexes: Vec<Value> = state
                            .indexes
                            .iter()
                            .map(|a| json!({ "expr": index_expr(a), "status": index_status }))
                            .collect();
                        json!({ "name": name, "status": table_status, "indexes": indexes })
                    })
                    .into_iter()
                    .collect())
            }
            Some(Statement::Select {
                table,
                attribute,
                ids_only,
            }) => {
                let state = staged.catalog.tables.get(table).ok_or_else(|| {
                    LedgerError::statement(statement, format!("no such table: {table}"))
                })?;
                let wanted = match (attribute, parameters) {
                    (None, []) => None,
                    (Some(_), [value]) => Some(value),
                    _ => {
                        return Err(LedgerError::statement(
                            statement,
                            "parameter count does not match placeholders",
                        ))
                    }
                };
                Ok(state
                    .documents
                    .iter()
                    .filter(|doc| match (attribute, wanted) {
                        (Some(attr), Some(value)) => doc.data.get(attr) == Some(value),
                        _ => true,
                    })
                    .map(|doc| {
                        if ids_only {
                            json!({ "id": doc.id.as_str() })
                        } else {
                            doc.data.clone()
                        }
                    })
                    .collect())
            }
            None => Err(LedgerError::statement(statement, "unsupported statement")),
        }
    }

    fn commit_transaction(&mut self, txn_id: &str) -> Result<(), LedgerError> {
        self.ensure_open()?;
        let staged = self
            .active
            .take()
            .filter(|t| t.id == txn_id)
            .ok_or_else(|| LedgerError::NoTransaction(txn_id.to_owned()))?;

        let mut inner = self.ledger.lock();
        if inner.pending_occ_conflicts > 0 {
            inner.pending_occ_conflicts -= 1;
            return Err(LedgerError::OccConflict(format!(
                "transaction {txn_id} conflicted with a concurrent writer"
            )));
        }
        inner.committed = staged.catalog;
        inner.commits += 1;
        Ok(())
    }

    fn abort_transaction(&mut self) -> Result<(), LedgerError> {
        self.active = None;
        Ok(())
    }

    fn end_session(&mut self) -> Result<(), LedgerError> {
        self.ensure_open()?;
        self.active = None;
        self.ended = true;
        self.ledger.lock().sessions_ended += 1;
        Ok(())
    }
}

enum Statement<'a> {
    CreateTable(&'a str),
    CreateIndex { table: &'a str, attribute: &'a str },
    Insert(&'a str),
    Select {
        table: &'a str,
        attribute: Option<&'a str>,
        ids_only: bool,
    },
    UserTables,
}

impl<'a> Statement<'a> {
    fn parse(statement: &'a str) -> Option<Self> {
        let text = statement.trim();
        if text == USER_TABLES_QUERY {
            return Some(Statement::UserTables);
        }
        let words: Vec<&str> = text.split_whitespace().collect();
        let is = |word: &str, keyword: &str| word.eq_ignore_ascii_case(keyword);
        match words[..] {
            [create, table, name] if is(create, "CREATE") && is(table, "TABLE") => {
                Some(Statement::CreateTable(name))
            }
            [create, index, on, table, attribute]
                if is(create, "CREATE") && is(index, "INDEX") && is(on, "ON") =>
            {
                let attribute = attribute.strip_prefix('(')?.strip_suffix(')')?;
                Some(Statement::CreateIndex { table, attribute })
            }
            [insert, into, table, "?"] if is(insert, "INSERT") && is(into, "INTO") => {
                Some(Statement::Insert(table))
            }
            [select, "*", from, table] if is(select, "SELECT") && is(from, "FROM") => {
                Some(Statement::Select {
                    table,
                    attribute: None,
                    ids_only: false,
                })
            }
            [select, "*", from, table, where_, attribute, "=", "?"]
                if is(select, "SELECT") && is(from, "FROM") && is(where_, "WHERE") =>
            {
                Some(Statement::Select {
                    table,
                    attribute: Some(attribute),
                    ids_only: false,
                })
            }
            [select, "id", from, table, as_, alias, by, "id", where_, qualified, "=", "?"]
                if is(select, "SELECT")
                    && is(from, "FROM")
                    && is(as_, "AS")
                    && is(by, "BY")
                    && is(where_, "WHERE") =>
            {
                let attribute = qualified.strip_prefix(alias)?.strip_prefix('.')?;
                Some(Statement::Select {
                    table,
                    attribute: Some(attribute),
                    ids_only: true,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(ledger: &MemoryLedger) -> MemoryConnection {
        ledger.connect(ledger.name()).unwrap()
    }

    #[test]
    fn parses_supported_statements() {
        assert!(matches!(
            Statement::parse("CREATE TABLE Person"),
            Some(Statement::CreateTable("Person"))
        ));
        assert!(matches!(
            Statement::parse("CREATE INDEX on Person (GovId)"),
            Some(Statement::CreateIndex {
                table: "Person",
                attribute: "GovId"
            })
        ));
        assert!(matches!(
            Statement::parse("INSERT INTO Vehicle ?"),
            Some(Statement::Insert("Vehicle"))
        ));
        assert!(matches!(
            Statement::parse(USER_TABLES_QUERY),
            Some(Statement::UserTables)
        ));
        assert!(matches!(
            Statement::parse("SELECT id FROM Person AS p BY id WHERE p.GovId = ?"),
            Some(Statement::Select {
                table: "Person",
                attribute: Some("GovId"),
                ids_only: true
            })
        ));
        assert!(Statement::parse("SELECT id FROM Person AS p BY id WHERE q.GovId = ?").is_none());
        assert!(Statement::parse("DELETE FROM Person").is_none());
    }

    #[test]
    fn insert_assigns_sequential_ids() {
        let ledger = MemoryLedger::new("l");
        let mut conn = connect(&ledger);
        let txn = conn.start_transaction().unwrap();
        conn.execute_statement(&txn, "CREATE TABLE Person", &[]).unwrap();
        let rows = conn
            .execute_statement(
                &txn,
                "INSERT INTO Person ?",
                &[json!([{"GovId": "a"}, {"GovId": "b"}])],
            )
            .unwrap();
        conn.commit_transaction(&txn).unwrap();

        assert_eq!(rows.len(), 2);
        let docs = ledger.documents("Person");
        assert_eq!(rows[0]["documentId"], docs[0].id.as_str());
        assert_eq!(rows[1]["documentId"], docs[1].id.as_str());
        assert_ne!(docs[0].id, docs[1].id);
        assert_eq!(docs[1].data["GovId"], "b");
    }

    #[test]
    fn create_statements_return_one_table_id_row() {
        let ledger = MemoryLedger::new("l");
        let mut conn = connect(&ledger);
        let txn = conn.start_transaction().unwrap();
        let table = conn.execute_statement(&txn, "CREATE TABLE Person", &[]).unwrap();
        let index = conn
            .execute_statement(&txn, "CREATE INDEX on Person (GovId)", &[])
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(index.len(), 1);
        assert!(table[0]["tableId"].is_string());
        assert_ne!(table[0]["tableId"], index[0]["tableId"]);
    }

    #[test]
    fn uncommitted_writes_are_invisible() {
        let ledger = MemoryLedger::new("l");
        let mut conn = connect(&ledger);
        let txn = conn.start_transaction().unwrap();
        conn.execute_statement(&txn, "CREATE TABLE Person", &[]).unwrap();
        assert!(ledger.tables().is_empty());
        conn.abort_transaction().unwrap();
        assert!(ledger.tables().is_empty());
        assert_eq!(ledger.statements(), vec!["CREATE TABLE Person".to_owned()]);
    }

    #[test]
    fn duplicate_table_is_rejected() {
        let ledger = MemoryLedger::new("l");
        let mut conn = connect(&ledger);
        let txn = conn.start_transaction().unwrap();
        conn.execute_statement(&txn, "CREATE TABLE Person", &[]).unwrap();
        let err = conn
            .execute_statement(&txn, "CREATE TABLE Person", &[])
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn catalog_reports_activation_lag() {
        let ledger = MemoryLedger::new("l");
        let mut conn = connect(&ledger);
        let txn = conn.start_transaction().unwrap();
        conn.execute_statement(&txn, "CREATE TABLE Person", &[]).unwrap();
        conn.execute_statement(&txn, "CREATE INDEX on Person (GovId)", &[])
            .unwrap();
        ledger.set_activation_lag(1);

        let first = conn
            .execute_statement(&txn, USER_TABLES_QUERY, &[json!("Person")])
            .unwrap();
        assert_eq!(first[0]["status"], "CREATING");
        assert_eq!(first[0]["indexes"][0]["status"], "BUILDING");

        let second = conn
            .execute_statement(&txn, USER_TABLES_QUERY, &[json!("Person")])
            .unwrap();
        assert_eq!(second[0]["status"], "ACTIVE");
        assert_eq!(second[0]["indexes"][0]["expr"], "[GovId]");

        let missing = conn
            .execute_statement(&txn, USER_TABLES_QUERY, &[json!("Vehicle")])
            .unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn select_filters_by_attribute() {
        let ledger = MemoryLedger::new("l");
        let mut conn = connect(&ledger);
        let txn = conn.start_transaction().unwrap();
        conn.execute_statement(&txn, "CREATE TABLE Person", &[]).unwrap();
        let inserted = conn
            .execute_statement(
                &txn,
                "INSERT INTO Person ?",
                &[json!([{"GovId": "a"}, {"GovId": "b"}])],
            )
            .unwrap();

        let all = conn.execute_statement(&txn, "SELECT * FROM Person", &[]).unwrap();
        assert_eq!(all.len(), 2);
        let matching = conn
            .execute_statement(&txn, "SELECT * FROM Person WHERE GovId = ?", &[json!("b")])
            .unwrap();
        assert_eq!(matching, vec![json!({"GovId": "b"})]);
        let ids = conn
            .execute_statement(
                &txn,
                "SELECT id FROM Person AS p BY id WHERE p.GovId = ?",
                &[json!("a")],
            )
            .unwrap();
        assert_eq!(ids, vec![json!({"id": inserted[0]["documentId"]})]);
        assert!(conn
            .execute_statement(&txn, "SELECT * FROM Person WHERE GovId = ?", &[])
            .is_err());
    }

    #[test]
    fn wrong_transaction_id_is_rejected() {
        let ledger = MemoryLedger::new("l");
        let mut conn = connect(&ledger);
        conn.start_transaction().unwrap();
        let err = conn
            .execute_statement("nope", "CREATE TABLE Person", &[])
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoTransaction(_)));
    }
}
