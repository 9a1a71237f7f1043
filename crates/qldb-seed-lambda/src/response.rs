//! Delivering the outcome of a custom-resource request to CloudFormation.
//!
//! CloudFormation waits for a JSON document PUT to the pre-signed
//! `ResponseURL` from the request. The URL is signed without a content type,
//! so the request must carry an empty `Content-Type` header.

use crate::event::CustomResourceEvent;
use crate::LambdaError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub no_echo: bool,
    pub data: Map<String, Value>,
}

impl CfnResponse {
    /// A response to `event` carrying the event's correlation ids.
    pub fn for_event(
        event: &CustomResourceEvent,
        status: ResponseStatus,
        reason: impl Into<String>,
        physical_resource_id: impl Into<String>,
    ) -> Self {
        Self {
            status,
            reason: reason.into(),
            physical_resource_id: physical_resource_id.into(),
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            no_echo: false,
            data: Map::new(),
        }
    }
}

/// Reason text pointing operators at the function's log stream.
pub fn log_stream_reason(log_stream: &str) -> String {
    format!("See the details in CloudWatch Log Stream: {log_stream}")
}

/// Sends a [`CfnResponse`] to the URL CloudFormation is waiting on.
pub trait ResponseSender {
    fn send(&self, url: &str, response: &CfnResponse) -> Result<(), LambdaError>;
}

/// `ResponseSender` over HTTPS with a bounded number of attempts.
pub struct HttpResponder {
    agent: ureq::Agent,
    attempts: u32,
    base_delay: Duration,
}

impl Default for HttpResponder {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl HttpResponder {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            attempts: attempts.max(1),
            base_delay,
        }
    }

    fn put(&self, url: &str, body: &[u8]) -> Result<(), LambdaError> {
        match self.agent.put(url).header("Content-Type", "").send(body) {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(code)) => Err(LambdaError::ResponseRejected(code)),
            Err(e) => Err(LambdaError::Http(e.to_string())),
        }
    }
}

impl ResponseSender for HttpResponder {
    fn send(&self, url: &str, response: &CfnResponse) -> Result<(), LambdaError> {
        let body = serde_json::to_vec(response)?;
        debug!("response body: {}", String::from_utf8_lossy(&body));

        let mut attempt = 1;
        loop {
            match self.put(url, &body) {
                Ok(()) => {
                    info!(
                        "sent {:?} response for {}",
                        response.status, response.logical_resource_id
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!("failed to send response (attempt {attempt}): {e}; retrying in {delay:?}");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
