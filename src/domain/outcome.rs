use crate::domain::terminal::CommandState;

/// Final classification of a transaction run. The numeric value is the
/// process exit code reported to the invoking cashier system.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ResultCode {
    Success,
    PaymentNotSuccessful,
    InvalidConfiguration,
    ConfigurationNotFound,
    CannotConnect,
    ClosedByUser,
    LicenseNotValid,
}

impl ResultCode {
    pub fn exit_code(self) -> i32 {
        match self {
            ResultCode::Success => 0,
            ResultCode::PaymentNotSuccessful => -1,
            ResultCode::InvalidConfiguration => -2,
            ResultCode::ConfigurationNotFound => -3,
            ResultCode::CannotConnect => -4,
            ResultCode::ClosedByUser => -5,
            ResultCode::LicenseNotValid => -6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResultCode::Success => "Success",
            ResultCode::PaymentNotSuccessful => "PaymentNotSuccessful",
            ResultCode::InvalidConfiguration => "InvalidConfiguration",
            ResultCode::ConfigurationNotFound => "ConfigurationNotFound",
            ResultCode::CannotConnect => "CannotConnect",
            ResultCode::ClosedByUser => "ClosedByUser",
            ResultCode::LicenseNotValid => "LicenseNotValid",
        }
    }

    /// Maps the final state of a terminal command to the reported result.
    pub fn from_command_state(state: CommandState) -> Self {
        match state {
            CommandState::Successful => ResultCode::Success,
            CommandState::Abort => ResultCode::ClosedByUser,
            CommandState::NotSupported | CommandState::Unknown | CommandState::Error => {
                ResultCode::PaymentNotSuccessful
            }
            CommandState::Timeout => ResultCode::CannotConnect,
        }
    }
}

/// Value of a persisted outcome field.
#[derive(Debug, PartialEq, Clone)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FieldKind {
    Int,
    Text,
}

/// One column of the persisted outcome layout.
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// The full persisted layout consumed by the external supervisor, as a
/// static table. [`TransactionOutcome::to_fields`] must emit exactly these
/// columns in this order; a unit test enforces the agreement.
pub const OUTPUT_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "active", kind: FieldKind::Int },
    FieldSpec { name: "result_code", kind: FieldKind::Int },
    FieldSpec { name: "result_text", kind: FieldKind::Text },
    FieldSpec { name: "result_detail", kind: FieldKind::Text },
    FieldSpec { name: "authorization_result", kind: FieldKind::Text },
    FieldSpec { name: "card_number", kind: FieldKind::Text },
    FieldSpec { name: "amount_minor", kind: FieldKind::Int },
    FieldSpec { name: "card_type", kind: FieldKind::Int },
    FieldSpec { name: "card_type_text", kind: FieldKind::Text },
    FieldSpec { name: "receipt_number", kind: FieldKind::Int },
    FieldSpec { name: "reference_number", kind: FieldKind::Text },
    FieldSpec { name: "terminal_id", kind: FieldKind::Text },
    FieldSpec { name: "device_type", kind: FieldKind::Text },
    FieldSpec { name: "software_version", kind: FieldKind::Text },
    FieldSpec { name: "aid", kind: FieldKind::Text },
];

/// Accumulated outcome of one transaction run.
///
/// The result slot is single-assignment: the first `set_result` wins and
/// later calls are rejected. Status fields are last-write-wins and may be
/// updated any number of times while a command is in flight.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct TransactionOutcome {
    result: Option<(ResultCode, String)>,
    pub receipt_number: u32,
    pub amount_minor: i64,
    pub authorization_result: String,
    pub card_number: String,
    pub card_type: i64,
    pub card_type_text: String,
    pub reference_number: String,
    pub terminal_id: String,
    pub device_type: String,
    pub software_version: String,
    pub aid: String,
}

impl TransactionOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the result slot. Returns `false` when a result was already
    /// recorded, leaving the existing value untouched.
    pub fn set_result(&mut self, code: ResultCode, detail: &str) -> bool {
        if self.result.is_some() {
            return false;
        }
        self.result = Some((code, detail.to_string()));
        true
    }

    pub fn result(&self) -> Option<(ResultCode, &str)> {
        self.result
            .as_ref()
            .map(|(code, detail)| (*code, detail.as_str()))
    }

    pub fn set_status(&mut self, receipt_number: u32, amount_minor: i64) {
        self.receipt_number = receipt_number;
        self.amount_minor = amount_minor;
    }

    /// Renders the outcome as the persisted column set.
    ///
    /// The result code is stored with its sign flipped (0 success, 1..6
    /// failures), matching the convention the supervisor expects.
    pub fn to_fields(&self, active: bool) -> Vec<(&'static str, FieldValue)> {
        let (code, text, detail) = match &self.result {
            Some((code, detail)) => (-code.exit_code(), code.label().to_string(), detail.clone()),
            None => (0, String::new(), String::new()),
        };
        vec![
            ("active", FieldValue::Int(i64::from(active))),
            ("result_code", FieldValue::Int(i64::from(code))),
            ("result_text", FieldValue::Text(text)),
            ("result_detail", FieldValue::Text(detail)),
            (
                "authorization_result",
                FieldValue::Text(self.authorization_result.clone()),
            ),
            ("card_number", FieldValue::Text(self.card_number.clone())),
            ("amount_minor", FieldValue::Int(self.amount_minor)),
            ("card_type", FieldValue::Int(self.card_type)),
            (
                "card_type_text",
                FieldValue::Text(self.card_type_text.clone()),
            ),
            (
                "receipt_number",
                FieldValue::Int(i64::from(self.receipt_number)),
            ),
            (
                "reference_number",
                FieldValue::Text(self.reference_number.clone()),
            ),
            ("terminal_id", FieldValue::Text(self.terminal_id.clone())),
            ("device_type", FieldValue::Text(self.device_type.clone())),
            (
                "software_version",
                FieldValue::Text(self.software_version.clone()),
            ),
            ("aid", FieldValue::Text(self.aid.clone())),
        ]
    }
}
