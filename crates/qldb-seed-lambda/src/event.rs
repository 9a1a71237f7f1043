use qldb_seed_schema::LedgerName;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property naming the ledger to provision.
pub const LEDGER_PROPERTY: &str = "QldbLedger";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

/// A CloudFormation custom-resource request as delivered to the function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceEvent {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    #[serde(default)]
    pub resource_type: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: Map<String, Value>,
    #[serde(default)]
    pub old_resource_properties: Option<Map<String, Value>>,
}

impl CustomResourceEvent {
    /// The target ledger from `ResourceProperties.QldbLedger`, if present and
    /// a non-empty string.
    pub fn ledger_name(&self) -> Option<LedgerName> {
        self.resource_properties
            .get(LEDGER_PROPERTY)
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .map(LedgerName::new)
    }

    /// Stack name taken from the stack ARN
    /// (`arn:aws:cloudformation:<region>:<account>:stack/<name>/<guid>`).
    pub fn stack_name(&self) -> &str {
        self.stack_id
            .split('/')
            .nth(1)
            .unwrap_or(self.stack_id.as_str())
    }

    /// Physical id for a resource that has none yet:
    /// `<stack name>_<logical id>_<first 8 alphanumerics of the request id>`.
    pub fn generated_physical_id(&self) -> String {
        let suffix: String = self
            .request_id
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(8)
            .collect();
        format!("{}_{}_{suffix}", self.stack_name(), self.logical_resource_id)
    }
}
