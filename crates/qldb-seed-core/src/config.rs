//! Environment-driven configuration.
//!
//! Every setting is optional; unset variables fall back to the defaults that
//! reproduce the classic behaviour (fixed 10 second waits between phases,
//! provisioning failures reported to CloudFormation as success).

use crate::{CoreError, SchemaReadiness};
use qldb_seed_ledger::RetryPolicy;
use qldb_seed_schema::LedgerName;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const READINESS_VAR: &str = "QLDB_SEED_READINESS";
pub const PHASE_DELAY_VAR: &str = "QLDB_SEED_PHASE_DELAY_SECS";
pub const POLL_INTERVAL_VAR: &str = "QLDB_SEED_POLL_INTERVAL_MS";
pub const POLL_TIMEOUT_VAR: &str = "QLDB_SEED_POLL_TIMEOUT_SECS";
pub const MAX_OCC_RETRIES_VAR: &str = "QLDB_SEED_MAX_OCC_RETRIES";
pub const FAILURE_POLICY_VAR: &str = "QLDB_SEED_FAILURE_POLICY";
pub const LEDGER_VAR: &str = "QLDB_LEDGER";

const DEFAULT_PHASE_DELAY_SECS: u64 = 10;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 120;

/// What the Create handler tells CloudFormation when provisioning fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and answer SUCCESS, so the stack carries on.
    #[default]
    Swallow,
    /// Answer FAILED with the error as the reason, so the stack rolls back.
    Report,
}

impl FromStr for FailurePolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "swallow" => Ok(FailurePolicy::Swallow),
            "report" => Ok(FailurePolicy::Report),
            other => Err(CoreError::Config(format!(
                "{FAILURE_POLICY_VAR}: expected 'swallow' or 'report', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionConfig {
    pub readiness: SchemaReadiness,
    pub retry: RetryPolicy,
    pub failure_policy: FailurePolicy,
}

impl ProvisionConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let mode = lookup(READINESS_VAR).unwrap_or_else(|| "fixed".to_owned());
        let readiness = match mode.trim().to_ascii_lowercase().as_str() {
            "fixed" => SchemaReadiness::FixedDelay(Duration::from_secs(parse_or(
                &lookup,
                PHASE_DELAY_VAR,
                DEFAULT_PHASE_DELAY_SECS,
            )?)),
            "poll" => SchemaReadiness::Poll {
                interval: Duration::from_millis(parse_or(
                    &lookup,
                    POLL_INTERVAL_VAR,
                    DEFAULT_POLL_INTERVAL_MS,
                )?),
                timeout: Duration::from_secs(parse_or(
                    &lookup,
                    POLL_TIMEOUT_VAR,
                    DEFAULT_POLL_TIMEOUT_SECS,
                )?),
            },
            other => {
                return Err(CoreError::Config(format!(
                    "{READINESS_VAR}: expected 'fixed' or 'poll', got '{other}'"
                )))
            }
        };

        let retry = RetryPolicy {
            max_retries: parse_or(&lookup, MAX_OCC_RETRIES_VAR, RetryPolicy::default().max_retries)?,
            ..RetryPolicy::default()
        };

        let failure_policy = match lookup(FAILURE_POLICY_VAR) {
            Some(value) => value.parse()?,
            None => FailurePolicy::default(),
        };

        Ok(Self {
            readiness,
            retry,
            failure_policy,
        })
    }
}

/// Target ledger for the query integration function.
pub fn ledger_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<LedgerName, CoreError> {
    match lookup(LEDGER_VAR) {
        Some(name) if !name.trim().is_empty() => Ok(LedgerName::new(name.trim())),
        _ => Err(CoreError::Config(format!("{LEDGER_VAR} is not set"))),
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Config(format!("{key}: invalid value '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ProvisionConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ProvisionConfig::default());
        assert_eq!(
            config.readiness,
            SchemaReadiness::FixedDelay(Duration::from_secs(10))
        );
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.failure_policy, FailurePolicy::Swallow);
    }

    #[test]
    fn poll_mode_with_overrides() {
        let config = ProvisionConfig::from_lookup(lookup(&[
            (READINESS_VAR, "Poll"),
            (POLL_INTERVAL_VAR, "250"),
            (POLL_TIMEOUT_VAR, "30"),
            (MAX_OCC_RETRIES_VAR, "7"),
            (FAILURE_POLICY_VAR, "report"),
        ]))
        .unwrap();
        assert_eq!(
            config.readiness,
            SchemaReadiness::Poll {
                interval: Duration::from_millis(250),
                timeout: Duration::from_secs(30),
            }
        );
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.failure_policy, FailurePolicy::Report);
    }

    #[test]
    fn fixed_delay_override() {
        let config = ProvisionConfig::from_lookup(lookup(&[(PHASE_DELAY_VAR, "0")])).unwrap();
        assert_eq!(config.readiness, SchemaReadiness::FixedDelay(Duration::ZERO));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for vars in [
            [(READINESS_VAR, "sometimes")],
            [(PHASE_DELAY_VAR, "ten")],
            [(MAX_OCC_RETRIES_VAR, "-1")],
            [(FAILURE_POLICY_VAR, "ignore")],
        ] {
            let err = ProvisionConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, CoreError::Config(_)), "{vars:?}: {err}");
        }
    }

    #[test]
    fn ledger_name_is_required() {
        assert_eq!(
            ledger_from_lookup(lookup(&[(LEDGER_VAR, "vehicle-registration")])).unwrap(),
            LedgerName::new("vehicle-registration")
        );
        assert!(matches!(
            ledger_from_lookup(lookup(&[(LEDGER_VAR, " ")])),
            Err(CoreError::Config(_))
        ));
        assert!(ledger_from_lookup(lookup(&[])).is_err());
    }
}
