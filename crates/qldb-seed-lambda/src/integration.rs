use qldb_seed_core::{run_queries, CoreError, QueryRequest, QueryResponse};
use qldb_seed_ledger::{LedgerConnector, RetryPolicy};
use qldb_seed_schema::LedgerName;
use tracing::error;

/// Runs query batches against one ledger for the integration function.
pub struct IntegrationHandler<K> {
    connector: K,
    target: Result<(LedgerName, RetryPolicy), String>,
}

impl<K: LedgerConnector> IntegrationHandler<K> {
    pub fn new(connector: K, ledger: LedgerName, retry: RetryPolicy) -> Self {
        Self {
            connector,
            target: Ok((ledger, retry)),
        }
    }

    /// A handler whose configuration could not be read. Every request is
    /// answered with `success: false` and `err` as the error.
    pub fn misconfigured(connector: K, err: &CoreError) -> Self {
        Self {
            connector,
            target: Err(err.to_string()),
        }
    }

    pub fn handle(&self, request: &QueryRequest) -> QueryResponse {
        match &self.target {
            Ok((ledger, retry)) => run_queries(&self.connector, ledger, *retry, request),
            Err(reason) => {
                error!("integration function is misconfigured: {reason}");
                QueryResponse {
                    success: false,
                    result: String::new(),
                    error: Some(reason.clone()),
                }
            }
        }
    }
}
