use crate::{LedgerConnection, LedgerConnector, LedgerError};
use qldb_seed_schema::LedgerName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often a unit of work is re-run after an OCC conflict or throttling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay_ms: 10,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Error type a unit of work may fail with.
///
/// Ledger errors convert into it, and it tells the session whether the unit
/// of work should be re-run.
pub trait TransactionError: From<LedgerError> + std::fmt::Display {
    fn is_retriable(&self) -> bool;
}

impl TransactionError for LedgerError {
    fn is_retriable(&self) -> bool {
        LedgerError::is_retriable(self)
    }
}

/// A ledger session scoped to one unit of provisioning work.
///
/// The underlying session is ended when the `LedgerSession` is closed or
/// dropped, whichever comes first.
pub struct LedgerSession<C: LedgerConnection> {
    ledger: LedgerName,
    connection: C,
    policy: RetryPolicy,
    open: bool,
}

impl<C: LedgerConnection> LedgerSession<C> {
    pub fn open<K>(connector: &K, ledger: &LedgerName, policy: RetryPolicy) -> Result<Self, LedgerError>
    where
        K: LedgerConnector<Connection = C>,
    {
        info!("opening session on ledger {ledger}");
        let connection = connector.connect(ledger)?;
        Ok(Self {
            ledger: ledger.clone(),
            connection,
            policy,
            open: true,
        })
    }

    pub fn ledger(&self) -> &LedgerName {
        &self.ledger
    }

    /// Run `work` in a transaction and commit it.
    ///
    /// On an OCC conflict or throttling the transaction is aborted, `on_retry`
    /// is called with the 1-based retry number, and `work` runs again from
    /// scratch. Any other error aborts the transaction and is returned.
    pub fn execute<T, E, F, R>(&mut self, mut work: F, mut on_retry: R) -> Result<T, E>
    where
        E: TransactionError,
        F: FnMut(&mut Transaction<'_, C>) -> Result<T, E>,
        R: FnMut(u32),
    {
        let mut attempt = 0u32;
        loop {
            let txn_id = self.connection.start_transaction().map_err(E::from)?;
            debug!("started transaction {txn_id}");

            let mut txn = Transaction {
                connection: &mut self.connection,
                id: txn_id,
                statements: 0,
            };
            let result = match work(&mut txn) {
                Ok(value) => txn.commit().map(|()| value).map_err(E::from),
                Err(e) => Err(e),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if let Err(abort_err) = self.connection.abort_transaction() {
                debug!("abort after failed transaction also failed: {abort_err}");
            }

            if err.is_retriable() && attempt < self.policy.max_retries {
                attempt += 1;
                warn!("retrying transaction on {} (attempt {attempt}): {err}", self.ledger);
                on_retry(attempt);
                std::thread::sleep(self.policy.backoff(attempt));
                continue;
            }
            return Err(err);
        }
    }

    /// End the session now, surfacing any error from the ledger.
    pub fn close(mut self) -> Result<(), LedgerError> {
        self.open = false;
        self.connection.end_session()
    }
}

impl<C: LedgerConnection> Drop for LedgerSession<C> {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            if let Err(e) = self.connection.end_session() {
                warn!("failed to end session on {}: {e}", self.ledger);
            }
        }
    }
}

/// Handle to the transaction a unit of work runs in.
pub struct Transaction<'a, C: LedgerConnection> {
    connection: &'a mut C,
    id: String,
    statements: usize,
}

impl<C: LedgerConnection> Transaction<'_, C> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Execute `statement` and return every result document.
    pub fn execute(&mut self, statement: &str, parameters: &[Value]) -> Result<Vec<Value>, LedgerError> {
        debug!("txn {}: {statement}", self.id);
        self.statements += 1;
        self.connection
            .execute_statement(&self.id, statement, parameters)
    }

    fn commit(self) -> Result<(), LedgerError> {
        debug!("committing transaction {} ({} statements)", self.id, self.statements);
        self.connection.commit_transaction(&self.id)
    }
}
