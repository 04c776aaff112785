use crate::domain::ports::TerminalSession;
use crate::domain::terminal::{CommandResult, CommandState, RegistrationOptions, TerminalEvent};
use crate::domain::token::CancelToken;
use async_trait::async_trait;
use log::debug;
use rust_decimal::Decimal;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Scripted behavior of a [`ScriptedTerminal`].
///
/// Every step of a session is configurable: connection result, command
/// results, delays, emitted status events, and whether the primary
/// command observes the cancellation token.
#[derive(Debug, Clone)]
pub struct TerminalScript {
    pub connect: bool,
    pub connect_delay: Duration,
    pub register: CommandState,
    pub command: CommandState,
    pub command_delay: Duration,
    /// When set, the primary command resolves early with `Abort` once the
    /// cancellation token is signalled. When unset, the command runs to
    /// its scripted result regardless of the token.
    pub observe_cancellation: bool,
    pub abort: CommandState,
    pub abort_delay: Duration,
    pub intermediate_statuses: Vec<String>,
    pub receipt_number: u32,
}

impl TerminalScript {
    pub fn success() -> Self {
        Self {
            connect: true,
            connect_delay: Duration::from_millis(50),
            register: CommandState::Successful,
            command: CommandState::Successful,
            command_delay: Duration::from_millis(150),
            observe_cancellation: true,
            abort: CommandState::Successful,
            abort_delay: Duration::from_millis(50),
            intermediate_statuses: vec![
                "Please insert card".to_string(),
                "Processing".to_string(),
            ],
            receipt_number: 4711,
        }
    }

    pub fn declined() -> Self {
        Self {
            command: CommandState::Error,
            ..Self::success()
        }
    }

    pub fn connect_failure() -> Self {
        Self {
            connect: false,
            ..Self::success()
        }
    }

    pub fn register_failure() -> Self {
        Self {
            register: CommandState::Error,
            ..Self::success()
        }
    }

    pub fn timeout() -> Self {
        Self {
            command: CommandState::Timeout,
            ..Self::success()
        }
    }

    pub fn terminal_abort() -> Self {
        Self {
            command: CommandState::Abort,
            ..Self::success()
        }
    }
}

fn result_for(state: CommandState) -> CommandResult {
    match state {
        CommandState::Successful => CommandResult::successful(),
        CommandState::Abort => CommandResult::failed(state, "aborted by terminal"),
        CommandState::NotSupported => CommandResult::failed(state, "command not supported"),
        CommandState::Unknown => CommandResult::failed(state, "unknown terminal response"),
        CommandState::Error => CommandResult::failed(state, "transaction declined by terminal"),
        CommandState::Timeout => CommandResult::failed(state, "terminal did not respond"),
    }
}

/// Terminal session adapter driven entirely by a [`TerminalScript`].
///
/// Plays the role a real wire-protocol adapter would play in production;
/// the test suite and the binary's scenario mode run against it.
pub struct ScriptedTerminal {
    script: TerminalScript,
    events_tx: mpsc::Sender<TerminalEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<TerminalEvent>>>,
    connect_calls: AtomicUsize,
    register_calls: AtomicUsize,
    pay_calls: AtomicUsize,
    reverse_calls: AtomicUsize,
    abort_calls: AtomicUsize,
    disposed: AtomicBool,
}

impl ScriptedTerminal {
    pub fn new(script: TerminalScript) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            script,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            connect_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            pay_calls: AtomicUsize::new(0),
            reverse_calls: AtomicUsize::new(0),
            abort_calls: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn pay_calls(&self) -> usize {
        self.pay_calls.load(Ordering::SeqCst)
    }

    pub fn reverse_calls(&self) -> usize {
        self.reverse_calls.load(Ordering::SeqCst)
    }

    pub fn abort_calls(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: TerminalEvent) {
        // The receiver may be gone when nobody consumed the stream.
        let _ = self.events_tx.send(event).await;
    }

    async fn run_command(&self, token: CancelToken) -> CommandResult {
        for status in &self.script.intermediate_statuses {
            self.emit(TerminalEvent::IntermediateStatus(status.clone()))
                .await;
        }
        if self.script.observe_cancellation {
            tokio::select! {
                _ = sleep(self.script.command_delay) => result_for(self.script.command),
                _ = token.cancelled() => {
                    debug!("scripted command interrupted by cancellation");
                    CommandResult::failed(CommandState::Abort, "command cancelled")
                }
            }
        } else {
            sleep(self.script.command_delay).await;
            result_for(self.script.command)
        }
    }
}

#[async_trait]
impl TerminalSession for ScriptedTerminal {
    async fn connect(&self, _token: CancelToken) -> bool {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        sleep(self.script.connect_delay).await;
        self.script.connect
    }

    async fn register(&self, _options: RegistrationOptions, _token: CancelToken) -> CommandResult {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        result_for(self.script.register)
    }

    async fn pay(&self, amount: Decimal, token: CancelToken) -> CommandResult {
        self.pay_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.run_command(token).await;
        if result.is_successful() {
            self.emit(TerminalEvent::StatusInformation {
                receipt_number: self.script.receipt_number,
                amount,
            })
            .await;
        }
        result
    }

    async fn reverse(&self, receipt_number: u32, token: CancelToken) -> CommandResult {
        self.reverse_calls.fetch_add(1, Ordering::SeqCst);
        debug!("scripted reversal of receipt {receipt_number}");
        self.run_command(token).await
    }

    async fn abort(&self) -> CommandResult {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        sleep(self.script.abort_delay).await;
        result_for(self.script.abort)
    }

    fn take_events(&self) -> mpsc::Receiver<TerminalEvent> {
        let mut slot = self.events_rx.lock().expect("events lock poisoned");
        slot.take().unwrap_or_else(|| {
            // Later callers get a receiver that reports a closed stream.
            let (_tx, rx) = mpsc::channel(1);
            rx
        })
    }

    async fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_successful_payment_emits_status_information() {
        let terminal = ScriptedTerminal::new(TerminalScript::success());
        let mut events = terminal.take_events();

        let result = terminal.pay(dec!(12.50), CancelToken::new()).await;
        assert!(result.is_successful());

        let mut saw_status_information = false;
        while let Ok(event) = events.try_recv() {
            if let TerminalEvent::StatusInformation {
                receipt_number,
                amount,
            } = event
            {
                assert_eq!(receipt_number, 4711);
                assert_eq!(amount, dec!(12.50));
                saw_status_information = true;
            }
        }
        assert!(saw_status_information);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_observing_command() {
        let mut script = TerminalScript::success();
        script.command_delay = Duration::from_secs(30);
        let terminal = ScriptedTerminal::new(script);
        let _events = terminal.take_events();

        let token = CancelToken::new();
        token.cancel();
        let result = terminal.pay(dec!(1.00), token).await;
        assert_eq!(result.state, CommandState::Abort);
    }

    #[tokio::test]
    async fn test_second_take_events_returns_closed_receiver() {
        let terminal = ScriptedTerminal::new(TerminalScript::success());
        let _first = terminal.take_events();
        let mut second = terminal.take_events();
        assert!(second.recv().await.is_none());
    }
}
