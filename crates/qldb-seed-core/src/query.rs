//! Ordered query batches run in a single ledger transaction.
//!
//! Each step's arguments may refer to the previous step's result with a `$.`
//! prefixed JMESPath expression (see [`crate::path`]), which lets a batch
//! insert a document and use its id in the next statement.

use crate::{path, CoreError};
use qldb_seed_ledger::{LedgerConnection, LedgerConnector, LedgerSession, RetryPolicy, Transaction};
use qldb_seed_schema::LedgerName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

const PATH_PREFIX: &str = "$.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub payload: Vec<QueryStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStep {
    pub query: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    fn ok(result: String) -> Self {
        Self {
            success: true,
            result,
            error: None,
        }
    }

    pub fn failed(err: &CoreError) -> Self {
        Self {
            success: false,
            result: String::new(),
            error: Some(err.to_string()),
        }
    }
}

/// Run `request` against `ledger` and describe the outcome.
///
/// A ledger session that cannot be opened yields a successful response with
/// an empty-object result; any other failure yields `success: false`.
pub fn run_queries<K: LedgerConnector>(
    connector: &K,
    ledger: &LedgerName,
    policy: RetryPolicy,
    request: &QueryRequest,
) -> QueryResponse {
    let mut session = match LedgerSession::open(connector, ledger, policy) {
        Ok(session) => session,
        Err(e) => {
            error!("unable to create QLDB session: {e}");
            return QueryResponse::ok("{}".to_owned());
        }
    };

    let outcome = session.execute(
        |txn| execute_batch(txn, &request.payload),
        |_| info!("Retrying due to OCC conflict..."),
    );
    match outcome {
        Ok(result) => QueryResponse::ok(result),
        Err(e) => {
            error!("query batch failed: {e}");
            QueryResponse::failed(&e)
        }
    }
}

/// Execute every step in order and return the last step's result text.
fn execute_batch<C: LedgerConnection>(
    txn: &mut Transaction<'_, C>,
    steps: &[QueryStep],
) -> Result<String, CoreError> {
    let mut last: Option<String> = None;
    for step in steps {
        info!("Executing query: {}", step.query);
        let args = step
            .args
            .iter()
            .map(|arg| resolve_argument(arg, last.as_deref()).map(Value::String))
            .collect::<Result<Vec<_>, _>>()?;
        let documents = txn.execute(&step.query, &args)?;
        last = Some(serde_json::to_string(&documents)?);
    }
    last.ok_or(CoreError::EmptyBatch)
}

/// Resolve one argument against the previous step's result text.
///
/// Arguments without the `$.` prefix, and every argument of the first step,
/// are passed through unchanged. A resolved string is used as-is; any other
/// resolved value is passed as its JSON text.
pub fn resolve_argument(arg: &str, previous: Option<&str>) -> Result<String, CoreError> {
    let (Some(expr), Some(previous)) = (arg.strip_prefix(PATH_PREFIX), previous) else {
        return Ok(arg.to_owned());
    };
    if previous.is_empty() {
        return Ok(arg.to_owned());
    }
    let input: Value = serde_json::from_str(previous)?;
    let resolved = match path::evaluate(expr, &input)? {
        Value::String(s) => s,
        other => serde_json::to_string(&other)?,
    };
    debug!("resolved {arg} to {resolved}");
    Ok(resolved)
}
