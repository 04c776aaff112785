use crate::Result;
use crate::domain::outcome::ResultCode;
use crate::domain::terminal::{CommandResult, RegistrationOptions, TerminalEvent};
use crate::domain::token::CancelToken;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connection and request/response protocol with the payment terminal.
///
/// The wire protocol itself is owned by the concrete adapter; the
/// orchestrator only sees the command surface below. All long-running
/// commands accept the shared cancellation token, though how promptly a
/// command observes it is the adapter's responsibility.
#[async_trait]
pub trait TerminalSession: Send + Sync {
    /// Opens the connection, bounded by the adapter's own timeout.
    async fn connect(&self, token: CancelToken) -> bool;

    /// Registers this client with the terminal, requesting status events
    /// for the duration of the session.
    async fn register(&self, options: RegistrationOptions, token: CancelToken) -> CommandResult;

    async fn pay(&self, amount: Decimal, token: CancelToken) -> CommandResult;

    async fn reverse(&self, receipt_number: u32, token: CancelToken) -> CommandResult;

    /// Asks the terminal to abort the command currently in flight.
    async fn abort(&self) -> CommandResult;

    /// Hands out the session's event stream. May be called once; later
    /// calls return a closed receiver.
    fn take_events(&self) -> mpsc::Receiver<TerminalEvent>;

    /// Releases the connection.
    async fn dispose(&self);
}

/// Accumulates the outcome of a run and publishes it for the caller.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Records the final result. First write wins; later calls are ignored.
    fn set_outcome(&self, code: ResultCode, detail: &str);

    /// Records receipt number and settled amount. Last write wins.
    fn set_status(&self, receipt_number: u32, amount_minor: i64);

    /// Raises the liveness flag in the persisted location.
    async fn activate(&self) -> Result<()>;

    /// Clears the liveness flag.
    async fn deactivate(&self) -> Result<()>;

    /// Flushes the accumulated fields to the persisted location.
    async fn publish(&self) -> Result<()>;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StatusKind {
    Information,
    Error,
}

/// Receives the operator-visible status line for the current phase.
pub trait StatusPresenter: Send + Sync {
    fn update_status(&self, text: &str, kind: StatusKind);
}

pub type SharedTerminalSession = Arc<dyn TerminalSession>;
pub type SharedResultSink = Arc<dyn ResultSink>;
pub type SharedStatusPresenter = Arc<dyn StatusPresenter>;
