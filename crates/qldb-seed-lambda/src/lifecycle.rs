use crate::event::{CustomResourceEvent, RequestType, LEDGER_PROPERTY};
use crate::response::{log_stream_reason, CfnResponse, ResponseStatus};
use qldb_seed_core::{CoreError, FailurePolicy, ProvisionConfig, ProvisionReport, Provisioner};
use qldb_seed_ledger::LedgerConnector;
use tracing::{error, info};

/// Maps custom-resource lifecycle events onto the provisioning sequence.
///
/// Create provisions the ledger named by the `QldbLedger` property. Update
/// and Delete leave the ledger alone. Every event produces a response;
/// whether a failed Create is reported as FAILED depends on the configured
/// [`FailurePolicy`].
pub struct LifecycleHandler<K> {
    state: HandlerState<K>,
    log_stream: String,
}

enum HandlerState<K> {
    Ready {
        connector: K,
        config: ProvisionConfig,
    },
    /// Cold-start setup failed; every event is answered FAILED.
    InitFailed(String),
}

impl<K: LedgerConnector> LifecycleHandler<K> {
    pub fn new(connector: K, config: ProvisionConfig) -> Self {
        Self {
            state: HandlerState::Ready { connector, config },
            log_stream: String::new(),
        }
    }

    pub fn init_failed(reason: impl Into<String>) -> Self {
        Self {
            state: HandlerState::InitFailed(reason.into()),
            log_stream: String::new(),
        }
    }

    /// Name of the log stream the default response reason points at.
    #[must_use]
    pub fn with_log_stream(mut self, log_stream: impl Into<String>) -> Self {
        self.log_stream = log_stream.into();
        self
    }

    /// Handle one event and build the response CloudFormation should get.
    pub fn dispatch(&self, event: &CustomResourceEvent) -> CfnResponse {
        info!(
            "{:?} request {} for {} ({})",
            event.request_type, event.request_id, event.logical_resource_id, event.resource_type
        );
        let (connector, config) = match &self.state {
            HandlerState::Ready { connector, config } => (connector, config),
            HandlerState::InitFailed(reason) => {
                error!("handler failed to initialise: {reason}");
                return CfnResponse::for_event(
                    event,
                    ResponseStatus::Failed,
                    reason.as_str(),
                    self.physical_id(event),
                );
            }
        };

        match event.request_type {
            RequestType::Create => self.create(connector, config, event),
            RequestType::Update | RequestType::Delete => self.success(event, self.physical_id(event)),
        }
    }

    fn create(&self, connector: &K, config: &ProvisionConfig, event: &CustomResourceEvent) -> CfnResponse {
        let physical_id = event.generated_physical_id();
        match provision(connector, config, event) {
            Ok(report) => {
                info!(
                    "provisioned {}: {} tables, {} indexes, {} documents",
                    report.ledger,
                    report.tables_created,
                    report.indexes_created,
                    report.documents_inserted
                );
                self.success(event, physical_id)
            }
            Err(e) => {
                error!("failed to provision sample data: {e:?}");
                match config.failure_policy {
                    FailurePolicy::Swallow => self.success(event, physical_id),
                    FailurePolicy::Report => {
                        CfnResponse::for_event(event, ResponseStatus::Failed, e.to_string(), physical_id)
                    }
                }
            }
        }
    }

    fn success(&self, event: &CustomResourceEvent, physical_id: String) -> CfnResponse {
        CfnResponse::for_event(
            event,
            ResponseStatus::Success,
            log_stream_reason(&self.log_stream),
            physical_id,
        )
    }

    fn physical_id(&self, event: &CustomResourceEvent) -> String {
        event
            .physical_resource_id
            .clone()
            .unwrap_or_else(|| event.generated_physical_id())
    }
}

fn provision<K: LedgerConnector>(
    connector: &K,
    config: &ProvisionConfig,
    event: &CustomResourceEvent,
) -> Result<ProvisionReport, CoreError> {
    let ledger = event.ledger_name().ok_or_else(|| {
        CoreError::Config(format!("ResourceProperties.{LEDGER_PROPERTY} is missing"))
    })?;
    Provisioner::new(config).run(connector, &ledger)
}
