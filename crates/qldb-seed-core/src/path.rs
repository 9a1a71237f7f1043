//! JMESPath evaluation of `$.` arguments against a previous step's result.

use crate::CoreError;
use serde_json::Value;

/// Evaluate the JMESPath expression `expr` against `input`.
///
/// Anything the expression does not match evaluates to `null`.
pub fn evaluate(expr: &str, input: &Value) -> Result<Value, CoreError> {
    let invalid = |reason: String| CoreError::Path {
        path: expr.to_owned(),
        reason,
    };
    let compiled = jmespath::compile(expr).map_err(|e| invalid(e.to_string()))?;
    let found = compiled.search(input).map_err(|e| invalid(e.to_string()))?;
    Ok(serde_json::to_value(&*found)?)
}
