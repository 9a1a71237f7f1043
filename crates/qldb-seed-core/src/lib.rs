//! Provisioning orchestration for qldb-seed.
//!
//! Ties the schema crate and the ledger session layer together into the
//! three-phase `Provisioner` (tables, indexes, linked sample documents), the
//! `SchemaReadiness` strategies that separate the phases, environment-driven
//! configuration, and the query-batch runner behind the integration function.

pub mod config;
pub mod path;
pub mod provision;
pub mod query;
pub mod readiness;

pub use config::{ledger_from_lookup, FailurePolicy, ProvisionConfig};
pub use provision::{ProvisionReport, Provisioner};
pub use query::{run_queries, QueryRequest, QueryResponse, QueryStep};
pub use readiness::{SchemaReadiness, SchemaStage};

use qldb_seed_ledger::{LedgerError, TransactionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("schema error: {0}")]
    Schema(#[from] qldb_seed_schema::SchemaError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{stage} not ready after {waited_ms} ms; still pending: {pending}")]
    ReadinessTimeout {
        stage: SchemaStage,
        waited_ms: u128,
        pending: String,
    },
    #[error("insert into {0} returned a result without a documentId")]
    MissingDocumentId(String),
    #[error("invalid path expression '{path}': {reason}")]
    Path { path: String, reason: String },
    #[error("empty query batch")]
    EmptyBatch,
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransactionError for CoreError {
    fn is_retriable(&self) -> bool {
        matches!(self, CoreError::Ledger(e) if e.is_retriable())
    }
}
