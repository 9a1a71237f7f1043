//! QLDB session-protocol backend.
//!
//! Speaks the `SendCommand` API directly through the AWS SDK: one session per
//! [`QldbConnection`], one transaction at a time, with the commit digest
//! maintained alongside (see [`crate::hash`]).
//!
//! The connection is blocking. It drives SDK futures with
//! [`Handle::block_on`], so it must be used from a thread that is not running
//! async tasks, such as one obtained from `tokio::task::spawn_blocking`.

use crate::{ion, LedgerConnection, LedgerConnector, LedgerError, QldbHash};
use aws_sdk_qldbsession::error::{BuildError, DisplayErrorContext, SdkError};
use aws_sdk_qldbsession::operation::send_command::builders::SendCommandFluentBuilder;
use aws_sdk_qldbsession::operation::send_command::{SendCommandError, SendCommandOutput};
use aws_sdk_qldbsession::primitives::Blob;
use aws_sdk_qldbsession::types::{
    AbortTransactionRequest, CommitTransactionRequest, EndSessionRequest, ExecuteStatementRequest,
    FetchPageRequest, Page, StartSessionRequest, StartTransactionRequest, ValueHolder,
};
use aws_sdk_qldbsession::Client;
use qldb_seed_schema::LedgerName;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::debug;

/// Opens QLDB sessions.
#[derive(Clone)]
pub struct QldbConnector {
    client: Client,
    handle: Handle,
}

impl std::fmt::Debug for QldbConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QldbConnector").finish_non_exhaustive()
    }
}

impl QldbConnector {
    pub fn new(sdk_config: &aws_config::SdkConfig, handle: Handle) -> Self {
        Self {
            client: Client::new(sdk_config),
            handle,
        }
    }

    /// Create from a pre-built client (custom endpoint, test doubles).
    pub fn from_client(client: Client, handle: Handle) -> Self {
        Self { client, handle }
    }
}

impl LedgerConnector for QldbConnector {
    type Connection = QldbConnection;

    fn connect(&self, ledger: &LedgerName) -> Result<QldbConnection, LedgerError> {
        let request = StartSessionRequest::builder()
            .ledger_name(ledger.as_str())
            .build()
            .map_err(invalid_request)?;
        let output = self
            .handle
            .block_on(self.client.send_command().start_session(request).send())
            .map_err(map_sdk_error)?;
        let session_token = output
            .start_session()
            .and_then(|r| r.session_token())
            .ok_or_else(|| {
                LedgerError::MalformedResponse("StartSession returned no session token".to_owned())
            })?
            .to_owned();
        debug!("started QLDB session on {ledger}");

        Ok(QldbConnection {
            client: self.client.clone(),
            handle: self.handle.clone(),
            session_token,
            active: None,
        })
    }
}

struct ActiveTransaction {
    id: String,
    digest: QldbHash,
}

pub struct QldbConnection {
    client: Client,
    handle: Handle,
    session_token: String,
    active: Option<ActiveTransaction>,
}

impl QldbConnection {
    fn send(&self, command: SendCommandFluentBuilder) -> Result<SendCommandOutput, LedgerError> {
        self.handle
            .block_on(command.session_token(self.session_token.as_str()).send())
            .map_err(map_sdk_error)
    }

    fn command(&self) -> SendCommandFluentBuilder {
        self.client.send_command()
    }

    fn fetch_remaining(
        &self,
        txn_id: &str,
        mut next_token: Option<String>,
        values: &mut Vec<Value>,
    ) -> Result<(), LedgerError> {
        while let Some(token) = next_token {
            let request = FetchPageRequest::builder()
                .transaction_id(txn_id)
                .next_page_token(token)
                .build()
                .map_err(invalid_request)?;
            let output = self.send(self.command().fetch_page(request))?;
            next_token = read_page(output.fetch_page().and_then(|r| r.page()), values)?;
        }
        Ok(())
    }
}

impl LedgerConnection for QldbConnection {
    fn start_transaction(&mut self) -> Result<String, LedgerError> {
        let output = self.send(
            self.command()
                .start_transaction(StartTransactionRequest::builder().build()),
        )?;
        let id = output
            .start_transaction()
            .and_then(|r| r.transaction_id())
            .ok_or_else(|| {
                LedgerError::MalformedResponse(
                    "StartTransaction returned no transaction id".to_owned(),
                )
            })?
            .to_owned();
        self.active = Some(ActiveTransaction {
            digest: QldbHash::of_str(&id),
            id: id.clone(),
        });
        Ok(id)
    }

    fn execute_statement(
        &mut self,
        txn_id: &str,
        statement: &str,
        parameters: &[Value],
    ) -> Result<Vec<Value>, LedgerError> {
        if !matches!(&self.active, Some(active) if active.id == txn_id) {
            return Err(LedgerError::NoTransaction(txn_id.to_owned()));
        }

        let mut statement_hash = QldbHash::of_str(statement);
        let mut holders = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            statement_hash = statement_hash.dot(&QldbHash::of_value(parameter)?);
            holders.push(
                ValueHolder::builder()
                    .ion_text(serde_json::to_string(parameter)?)
                    .build(),
            );
        }

        let request = ExecuteStatementRequest::builder()
            .transaction_id(txn_id)
            .statement(statement)
            .set_parameters(Some(holders))
            .build()
            .map_err(invalid_request)?;
        let output = self.send(self.command().execute_statement(request))?;

        let mut values = Vec::new();
        let first_page = output.execute_statement().and_then(|r| r.first_page());
        let next_token = read_page(first_page, &mut values)?;
        self.fetch_remaining(txn_id, next_token, &mut values)?;

        if let Some(active) = self.active.as_mut() {
            active.digest = active.digest.dot(&statement_hash);
        }
        debug!("{statement} returned {} documents", values.len());
        Ok(values)
    }

    fn commit_transaction(&mut self, txn_id: &str) -> Result<(), LedgerError> {
        let active = self
            .active
            .take()
            .filter(|a| a.id == txn_id)
            .ok_or_else(|| LedgerError::NoTransaction(txn_id.to_owned()))?;

        let request = CommitTransactionRequest::builder()
            .transaction_id(txn_id)
            .commit_digest(Blob::new(active.digest.as_bytes().to_vec()))
            .build()
            .map_err(invalid_request)?;
        let output = self.send(self.command().commit_transaction(request))?;

        let echoed = output
            .commit_transaction()
            .and_then(|r| r.commit_digest())
            .map(|blob| blob.as_ref().to_vec());
        match echoed {
            Some(digest) if digest.as_slice() != active.digest.as_bytes() => {
                Err(LedgerError::DigestMismatch(txn_id.to_owned()))
            }
            _ => Ok(()),
        }
    }

    fn abort_transaction(&mut self) -> Result<(), LedgerError> {
        if self.active.take().is_none() {
            return Ok(());
        }
        self.send(
            self.command()
                .abort_transaction(AbortTransactionRequest::builder().build()),
        )?;
        Ok(())
    }

    fn end_session(&mut self) -> Result<(), LedgerError> {
        self.active = None;
        self.send(
            self.command()
                .end_session(EndSessionRequest::builder().build()),
        )?;
        debug!("ended QLDB session");
        Ok(())
    }
}

/// Decode a result page into `values`, returning the next page token.
fn read_page(page: Option<&Page>, values: &mut Vec<Value>) -> Result<Option<String>, LedgerError> {
    let Some(page) = page else {
        return Ok(None);
    };
    for holder in page.values() {
        if let Some(binary) = holder.ion_binary() {
            values.extend(ion::decode_values(binary.as_ref())?);
        } else if let Some(text) = holder.ion_text() {
            values.push(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned())));
        }
    }
    Ok(page.next_page_token().map(str::to_owned))
}

fn invalid_request(err: BuildError) -> LedgerError {
    LedgerError::Service(format!("invalid request: {err}"))
}

fn map_sdk_error<R: std::fmt::Debug>(err: SdkError<SendCommandError, R>) -> LedgerError {
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(service_err) => match service_err.err() {
            SendCommandError::OccConflictException(_) => LedgerError::OccConflict(detail),
            SendCommandError::RateExceededException(_)
            | SendCommandError::CapacityExceededException(_) => LedgerError::Throttled(detail),
            _ => LedgerError::Service(detail),
        },
        _ => LedgerError::Service(detail),
    }
}
