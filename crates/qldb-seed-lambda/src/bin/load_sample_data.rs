use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use qldb_seed_core::ProvisionConfig;
use qldb_seed_lambda::{
    handle_custom_resource, init_tracing, CfnResponse, CustomResourceEvent, HttpResponder,
    LifecycleHandler, LOG_STREAM_VAR,
};
use qldb_seed_ledger::QldbConnector;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let sdk_config = aws_config::load_from_env().await;
    let connector = QldbConnector::new(&sdk_config, Handle::current());
    let handler = match ProvisionConfig::from_env() {
        Ok(config) => {
            info!("provisioning config: {config:?}");
            LifecycleHandler::new(connector, config)
        }
        Err(e) => {
            error!("configuration error: {e}");
            LifecycleHandler::init_failed(e.to_string())
        }
    };
    let log_stream = std::env::var(LOG_STREAM_VAR).unwrap_or_default();
    let handler = Arc::new(handler.with_log_stream(log_stream));
    let responder = Arc::new(HttpResponder::default());

    run(service_fn(move |event: LambdaEvent<CustomResourceEvent>| {
        let handler = Arc::clone(&handler);
        let responder = Arc::clone(&responder);
        async move {
            let (payload, _context) = event.into_parts();
            let response: CfnResponse =
                handle_custom_resource(handler, responder, payload).await?;
            Ok::<_, Error>(response)
        }
    }))
    .await
}
