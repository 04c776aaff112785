use crate::domain::config::{TransactionConfig, TransactionKind, minor_units};
use crate::domain::outcome::ResultCode;
use crate::domain::ports::{
    SharedResultSink, SharedStatusPresenter, SharedTerminalSession, StatusKind,
};
use crate::domain::terminal::{CommandResult, RegistrationOptions, TerminalEvent};
use crate::domain::token::CancelToken;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Pause after a terminal outcome so the final status event can still
/// arrive and the last status line stays readable.
const SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Phases of a transaction run. `Completed`, `Aborted` and `Failed` are
/// terminal; entering one of them is the single point where the result
/// sink's outcome slot is written.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Phase {
    Idle,
    Connecting,
    Registering,
    Executing,
    Completed,
    Aborted,
    Failed,
}

/// Terminal state of a run, handed back to the process boundary for the
/// exit-code mapping.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Completion {
    pub code: ResultCode,
    pub phase: Phase,
}

/// Decides whether the primary command's result may write the outcome.
///
/// Must be evaluated after the result is available, never before: the
/// token is monotonic and the abort path signals it before its own
/// acknowledgment is processed, so a result that raced past an abort is
/// reliably discarded here. Returns `None` when the abort path owns the
/// terminal transition.
fn primary_outcome(result: &CommandResult, token: &CancelToken) -> Option<ResultCode> {
    if token.is_cancelled() {
        None
    } else {
        Some(ResultCode::from_command_state(result.state))
    }
}

/// Drives one transaction end-to-end: connect, register, dispatch the
/// command selected by the configuration, and resolve the race between
/// the command's result and a user-initiated abort into exactly one
/// outcome.
pub struct Orchestrator {
    session: SharedTerminalSession,
    sink: SharedResultSink,
    presenter: SharedStatusPresenter,
    settle_delay: Duration,
}

impl Orchestrator {
    pub fn new(
        session: SharedTerminalSession,
        sink: SharedResultSink,
        presenter: SharedStatusPresenter,
    ) -> Self {
        Self {
            session,
            sink,
            presenter,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Overrides the settle delay. Tests shorten it.
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Runs a single transaction to a terminal state.
    ///
    /// `abort_requests` carries user abort requests (one message per
    /// request). The returned completion is the only outcome of the run;
    /// the sink's result slot has been written exactly once when this
    /// returns.
    pub async fn run(
        &self,
        config: &TransactionConfig,
        mut abort_requests: mpsc::Receiver<()>,
    ) -> Completion {
        let token = CancelToken::new();

        self.enter(Phase::Connecting);
        self.presenter
            .update_status("Connecting to payment terminal...", StatusKind::Information);
        if !self.session.connect(token.clone()).await {
            self.presenter
                .update_status("Cannot connect to payment terminal", StatusKind::Error);
            let detail = format!("cannot connect to {}:{}", config.address, config.port);
            return self.fail(ResultCode::CannotConnect, &detail).await;
        }

        self.enter(Phase::Registering);
        let registration = self
            .session
            .register(RegistrationOptions::default(), token.clone())
            .await;
        if !registration.is_successful() {
            self.presenter
                .update_status("Registration with terminal failed", StatusKind::Error);
            let detail = format!("registration failed: {}", registration.message());
            return self.fail(ResultCode::ClosedByUser, &detail).await;
        }

        self.enter(Phase::Executing);
        let mut events = self.session.take_events();
        let mut events_open = true;

        let mut command = match config.kind {
            TransactionKind::Payment => self.session.pay(config.amount, token.clone()),
            TransactionKind::Reversal => {
                self.session.reverse(config.receipt_number, token.clone())
            }
        };
        let mut command_done = false;

        // Acknowledgments from the abort task. The sender side is kept
        // alive here so the channel never closes while the loop runs.
        let (ack_tx, mut ack_rx) = mpsc::channel::<CommandResult>(1);
        let mut abort_in_flight = false;

        loop {
            tokio::select! {
                result = &mut command, if !command_done => {
                    command_done = true;
                    match primary_outcome(&result, &token) {
                        Some(code) => {
                            return self.complete_command(config.kind, code, &result, &mut events, events_open).await;
                        }
                        None => {
                            // The abort path owns the terminal transition;
                            // keep looping until its acknowledgment lands.
                            info!("discarding command result {:?} after abort", result.state);
                        }
                    }
                }
                Some(ack) = ack_rx.recv() => {
                    if ack.is_successful() {
                        self.presenter.update_status("Transaction aborted", StatusKind::Information);
                        self.sink.set_outcome(ResultCode::ClosedByUser, "aborted by user");
                        self.enter(Phase::Aborted);
                        self.settle(&mut events, &mut events_open).await;
                        return Completion { code: ResultCode::ClosedByUser, phase: Phase::Aborted };
                    }
                    warn!("abort command not successful ({:?}), transaction continues", ack.state);
                    abort_in_flight = false;
                }
                Some(()) = abort_requests.recv(), if !abort_in_flight && !token.is_cancelled() => {
                    info!("abort requested by user");
                    abort_in_flight = true;
                    let session = SharedTerminalSession::clone(&self.session);
                    let abort_token = token.clone();
                    let tx = ack_tx.clone();
                    tokio::spawn(async move {
                        let ack = session.abort().await;
                        // Only a successful abort may claim the outcome.
                        // Signalling before sending the acknowledgment is
                        // what lets a racing command result be discarded.
                        if ack.is_successful() {
                            abort_token.cancel();
                        }
                        let _ = tx.send(ack).await;
                    });
                }
                maybe_event = events.recv(), if events_open => {
                    match maybe_event {
                        Some(event) => self.handle_event(event),
                        None => events_open = false,
                    }
                }
            }
        }
    }

    fn enter(&self, phase: Phase) {
        debug!("entering phase {:?}", phase);
    }

    fn handle_event(&self, event: TerminalEvent) {
        match event {
            TerminalEvent::IntermediateStatus(text) => {
                debug!("intermediate status: {text}");
                self.presenter.update_status(&text, StatusKind::Information);
            }
            TerminalEvent::StatusInformation {
                receipt_number,
                amount,
            } => {
                info!("status information: receipt {receipt_number}, amount {amount}");
                self.sink
                    .set_status(receipt_number, minor_units(amount).unwrap_or_default());
            }
        }
    }

    async fn complete_command(
        &self,
        kind: TransactionKind,
        code: ResultCode,
        result: &CommandResult,
        events: &mut mpsc::Receiver<TerminalEvent>,
        mut events_open: bool,
    ) -> Completion {
        let (status, phase) = match (kind, code) {
            (TransactionKind::Payment, ResultCode::Success) => {
                ("Payment successful", Phase::Completed)
            }
            (TransactionKind::Reversal, ResultCode::Success) => {
                ("Reversal successful", Phase::Completed)
            }
            (TransactionKind::Payment, _) => ("Payment not successful", Phase::Failed),
            (TransactionKind::Reversal, _) => ("Reversal not successful", Phase::Failed),
        };
        let status_kind = if phase == Phase::Completed {
            StatusKind::Information
        } else {
            StatusKind::Error
        };
        self.presenter.update_status(status, status_kind);
        self.sink.set_outcome(code, result.message());
        self.enter(phase);
        self.settle(events, &mut events_open).await;
        Completion { code, phase }
    }

    async fn fail(&self, code: ResultCode, detail: &str) -> Completion {
        self.sink.set_outcome(code, detail);
        self.enter(Phase::Failed);
        sleep(self.settle_delay).await;
        Completion {
            code,
            phase: Phase::Failed,
        }
    }

    /// Waits out the settle delay while still draining status events, so a
    /// final receipt/amount notification is not lost.
    async fn settle(&self, events: &mut mpsc::Receiver<TerminalEvent>, events_open: &mut bool) {
        let deadline = sleep(self.settle_delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return,
                maybe_event = events.recv(), if *events_open => {
                    match maybe_event {
                        Some(event) => self.handle_event(event),
                        None => *events_open = false,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::terminal::CommandState;

    #[test]
    fn test_live_token_lets_the_command_decide() {
        let token = CancelToken::new();
        let result = CommandResult::successful();
        assert_eq!(
            primary_outcome(&result, &token),
            Some(ResultCode::Success)
        );
    }

    #[test]
    fn test_cancelled_token_discards_the_command_result() {
        let token = CancelToken::new();
        token.cancel();
        // Even a successful result arriving after the abort is discarded.
        let result = CommandResult::successful();
        assert_eq!(primary_outcome(&result, &token), None);
    }

    #[test]
    fn test_failure_states_map_through() {
        let token = CancelToken::new();
        let result = CommandResult::failed(CommandState::Timeout, "no response");
        assert_eq!(
            primary_outcome(&result, &token),
            Some(ResultCode::CannotConnect)
        );
    }
}
