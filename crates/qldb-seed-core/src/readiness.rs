//! Waiting for asynchronously activated schema.
//!
//! QLDB creates tables and builds indexes in the background after the DDL
//! transaction commits. Indexes must not be created before their tables are
//! ACTIVE, and documents should not be inserted before every index is ONLINE.

use crate::CoreError;
use qldb_seed_ledger::{LedgerConnection, LedgerSession, Transaction};
use qldb_seed_schema::{index_expr, Table, INDEXES, USER_TABLES_QUERY};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const TABLE_ACTIVE: &str = "ACTIVE";
const INDEX_ONLINE: &str = "ONLINE";

/// Which schema objects a wait is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaStage {
    Tables,
    Indexes,
}

impl fmt::Display for SchemaStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaStage::Tables => f.write_str("tables"),
            SchemaStage::Indexes => f.write_str("indexes"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaReadiness {
    /// Sleep for a fixed time and assume the schema is ready afterwards.
    FixedDelay(Duration),
    /// Query `information_schema.user_tables` every `interval` until the
    /// schema is ready, giving up after `timeout`.
    Poll { interval: Duration, timeout: Duration },
}

impl Default for SchemaReadiness {
    fn default() -> Self {
        SchemaReadiness::FixedDelay(Duration::from_secs(10))
    }
}

impl SchemaReadiness {
    pub fn wait<C: LedgerConnection>(
        &self,
        session: &mut LedgerSession<C>,
        stage: SchemaStage,
    ) -> Result<(), CoreError> {
        match *self {
            SchemaReadiness::FixedDelay(delay) => {
                info!("waiting {delay:?} for {stage} to become active");
                std::thread::sleep(delay);
                Ok(())
            }
            SchemaReadiness::Poll { interval, timeout } => {
                let started = Instant::now();
                loop {
                    let pending =
                        session.execute(|txn| pending_objects(txn, stage), |_| {})?;
                    if pending.is_empty() {
                        info!("{stage} ready after {:?}", started.elapsed());
                        return Ok(());
                    }
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(CoreError::ReadinessTimeout {
                            stage,
                            waited_ms: waited.as_millis(),
                            pending: pending.join(", "),
                        });
                    }
                    debug!("{stage} still pending: {}", pending.join(", "));
                    std::thread::sleep(interval);
                }
            }
        }
    }
}

/// Names of the schema objects of `stage` that are not active yet.
fn pending_objects<C: LedgerConnection>(
    txn: &mut Transaction<'_, C>,
    stage: SchemaStage,
) -> Result<Vec<String>, CoreError> {
    let mut pending = Vec::new();
    for table in Table::ALL {
        let rows = txn.execute(USER_TABLES_QUERY, &[json!(table.name())])?;
        let Some(row) = rows.first() else {
            pending.push(format!("{table} (missing)"));
            continue;
        };
        match stage {
            SchemaStage::Tables => {
                if row["status"] != TABLE_ACTIVE {
                    pending.push(table.to_string());
                }
            }
            SchemaStage::Indexes => {
                for index in INDEXES.iter().filter(|i| i.table == table) {
                    if !index_online(row, index.attribute) {
                        pending.push(format!("{table} ({})", index.attribute));
                    }
                }
            }
        }
    }
    Ok(pending)
}

fn index_online(table_row: &Value, attribute: &str) -> bool {
    let expr = index_expr(attribute);
    table_row["indexes"].as_array().is_some_and(|indexes| {
        indexes
            .iter()
            .any(|i| i["expr"] == expr.as_str() && i["status"] == INDEX_ONLINE)
    })
}
