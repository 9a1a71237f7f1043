//! AWS Lambda entry points for qldb-seed.
//!
//! `load-sample-data` answers CloudFormation custom-resource requests by
//! provisioning the DMV schema and sample documents (`LifecycleHandler`), and
//! `qldb-integration` runs ordered query batches (`IntegrationHandler`). Both
//! do their ledger work on a blocking thread; see [`handle_custom_resource`].

pub mod event;
pub mod integration;
pub mod lifecycle;
pub mod response;

pub use event::{CustomResourceEvent, RequestType};
pub use integration::IntegrationHandler;
pub use lifecycle::LifecycleHandler;
pub use response::{CfnResponse, HttpResponder, ResponseSender, ResponseStatus};

use qldb_seed_core::{QueryRequest, QueryResponse};
use qldb_seed_ledger::LedgerConnector;
use std::sync::Arc;
use thiserror::Error;

/// Environment variable the Lambda runtime sets to the function's log stream.
pub const LOG_STREAM_VAR: &str = "AWS_LAMBDA_LOG_STREAM_NAME";

#[derive(Debug, Error)]
pub enum LambdaError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("response endpoint rejected the response with status {0}")]
    ResponseRejected(u16),
    #[error("handler task failed: {0}")]
    Task(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Initialise logging for a Lambda binary.
///
/// Honours `RUST_LOG` (default `info`). Timestamps are left to CloudWatch.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .init();
}

/// Dispatch a custom-resource event and PUT the response to its
/// `ResponseURL`.
///
/// Ledger calls block, so the work runs on tokio's blocking pool.
pub async fn handle_custom_resource<K, S>(
    handler: Arc<LifecycleHandler<K>>,
    sender: Arc<S>,
    event: CustomResourceEvent,
) -> Result<CfnResponse, LambdaError>
where
    K: LedgerConnector + Send + Sync + 'static,
    S: ResponseSender + Send + Sync + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<CfnResponse, LambdaError> {
        let response = handler.dispatch(&event);
        sender.send(&event.response_url, &response)?;
        Ok(response)
    })
    .await
    .map_err(|e| LambdaError::Task(e.to_string()))?
}

/// Run a query batch on tokio's blocking pool.
pub async fn handle_query<K>(
    handler: Arc<IntegrationHandler<K>>,
    request: QueryRequest,
) -> Result<QueryResponse, LambdaError>
where
    K: LedgerConnector + Send + Sync + 'static,
{
    tokio::task::spawn_blocking(move || handler.handle(&request))
        .await
        .map_err(|e| LambdaError::Task(e.to_string()))
}
