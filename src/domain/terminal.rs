use rust_decimal::Decimal;

/// Final state of a single terminal command exchange.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CommandState {
    Successful,
    Abort,
    NotSupported,
    Unknown,
    Error,
    Timeout,
}

/// Result of a terminal command, with an optional error message for
/// non-successful states.
#[derive(Debug, PartialEq, Clone)]
pub struct CommandResult {
    pub state: CommandState,
    pub error_message: Option<String>,
}

impl CommandResult {
    pub fn successful() -> Self {
        Self {
            state: CommandState::Successful,
            error_message: None,
        }
    }

    pub fn failed(state: CommandState, message: impl Into<String>) -> Self {
        Self {
            state,
            error_message: Some(message.into()),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.state == CommandState::Successful
    }

    /// The error message, or an empty string when none was supplied.
    pub fn message(&self) -> &str {
        self.error_message.as_deref().unwrap_or_default()
    }
}

/// Events delivered by the terminal session while a command is pending.
#[derive(Debug, PartialEq, Clone)]
pub enum TerminalEvent {
    /// Free-form progress text, relayed to the operator as it arrives.
    IntermediateStatus(String),
    /// Receipt number and settled amount, accumulated into the outcome
    /// without completing the transaction.
    StatusInformation {
        receipt_number: u32,
        amount: Decimal,
    },
}

/// Options for the registration command issued after connecting.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct RegistrationOptions {
    /// Ask the terminal to stream intermediate status events for the
    /// duration of the session.
    pub stream_status_events: bool,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            stream_status_events: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_result_message_defaults_to_empty() {
        assert_eq!(CommandResult::successful().message(), "");
        assert_eq!(
            CommandResult::failed(CommandState::Error, "card declined").message(),
            "card declined"
        );
    }
}
