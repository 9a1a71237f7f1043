use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use qldb_seed_core::{config, ProvisionConfig, QueryRequest, QueryResponse};
use qldb_seed_lambda::{handle_query, init_tracing, IntegrationHandler};
use qldb_seed_ledger::QldbConnector;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let sdk_config = aws_config::load_from_env().await;
    let connector = QldbConnector::new(&sdk_config, Handle::current());
    let setup = config::ledger_from_lookup(|key| std::env::var(key).ok())
        .and_then(|ledger| ProvisionConfig::from_env().map(|c| (ledger, c.retry)));
    let handler = match setup {
        Ok((ledger, retry)) => IntegrationHandler::new(connector, ledger, retry),
        Err(e) => {
            error!("configuration error: {e}");
            IntegrationHandler::misconfigured(connector, &e)
        }
    };
    let handler = Arc::new(handler);

    run(service_fn(move |event: LambdaEvent<QueryRequest>| {
        let handler = Arc::clone(&handler);
        async move {
            let (request, _context) = event.into_parts();
            let response: QueryResponse = handle_query(handler, request).await?;
            Ok::<_, Error>(response)
        }
    }))
    .await
}
