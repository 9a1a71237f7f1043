//! Ledger access for qldb-seed.
//!
//! This crate provides the session layer the provisioner talks to: the
//! `LedgerConnection`/`LedgerConnector` traits, a scoped `LedgerSession` that
//! runs units of work transactionally and re-runs them on OCC conflicts, a
//! QLDB session-protocol backend (`QldbConnector`) built on the AWS SDK, and a
//! deterministic in-memory ledger (`MemoryLedger`) used by tests.

pub mod hash;
pub mod ion;
pub mod memory;
pub mod qldb;
pub mod session;

pub use hash::QldbHash;
pub use memory::{MemoryLedger, StoredDocument};
pub use qldb::{QldbConnection, QldbConnector};
pub use session::{LedgerSession, RetryPolicy, Transaction, TransactionError};

use qldb_seed_schema::LedgerName;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("OCC conflict: {0}")]
    OccConflict(String),
    #[error("request throttled: {0}")]
    Throttled(String),
    #[error("ledger not found: {0}")]
    LedgerNotFound(String),
    #[error("statement '{statement}' failed: {message}")]
    Statement { statement: String, message: String },
    #[error("QLDB service error: {0}")]
    Service(String),
    #[error("no active transaction with id '{0}'")]
    NoTransaction(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("commit digest mismatch for transaction '{0}'")]
    DigestMismatch(String),
    #[error("Ion decode error: {0}")]
    Decode(String),
    #[error("unsupported parameter value: {0}")]
    UnsupportedValue(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn is_occ_conflict(&self) -> bool {
        matches!(self, LedgerError::OccConflict(_))
    }

    /// Errors the session retries the whole unit of work on.
    pub fn is_retriable(&self) -> bool {
        matches!(self, LedgerError::OccConflict(_) | LedgerError::Throttled(_))
    }

    pub(crate) fn statement(statement: &str, message: impl Into<String>) -> Self {
        LedgerError::Statement {
            statement: statement.to_owned(),
            message: message.into(),
        }
    }
}

/// One open ledger session.
///
/// Statement results are fully drained before `execute_statement` returns;
/// callers never see pagination.
pub trait LedgerConnection {
    /// Begin a transaction and return its id.
    fn start_transaction(&mut self) -> Result<String, LedgerError>;

    /// Execute one PartiQL statement inside transaction `txn_id`.
    fn execute_statement(
        &mut self,
        txn_id: &str,
        statement: &str,
        parameters: &[Value],
    ) -> Result<Vec<Value>, LedgerError>;

    fn commit_transaction(&mut self, txn_id: &str) -> Result<(), LedgerError>;

    /// Abort the active transaction, if any. Safe to call with none active.
    fn abort_transaction(&mut self) -> Result<(), LedgerError>;

    fn end_session(&mut self) -> Result<(), LedgerError>;
}

/// Opens sessions against a named ledger.
pub trait LedgerConnector {
    type Connection: LedgerConnection;

    fn connect(&self, ledger: &LedgerName) -> Result<Self::Connection, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_errors() {
        assert!(LedgerError::OccConflict("x".into()).is_retriable());
        assert!(LedgerError::OccConflict("x".into()).is_occ_conflict());
        assert!(LedgerError::Throttled("x".into()).is_retriable());
        assert!(!LedgerError::Throttled("x".into()).is_occ_conflict());
        assert!(!LedgerError::Service("x".into()).is_retriable());
        assert!(!LedgerError::statement("CREATE TABLE Person", "exists").is_retriable());
    }

    #[test]
    fn statement_error_message() {
        let err = LedgerError::statement("CREATE TABLE Person", "table already exists");
        assert_eq!(
            err.to_string(),
            "statement 'CREATE TABLE Person' failed: table already exists"
        );
    }
}
