use crate::error::EasyPayError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// The kind of transaction dispatched to the terminal.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    #[default]
    Payment,
    Reversal,
}

/// Immutable input for a single transaction run.
///
/// Exactly one of `amount` / `receipt_number` is semantically required,
/// selected by `kind`: a payment carries the amount to charge, a reversal
/// carries the receipt number of the transaction to void.
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionConfig {
    pub address: String,
    pub port: u16,
    pub password: u32,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub receipt_number: u32,
}

impl TransactionConfig {
    /// Checks the field required by `kind`.
    pub fn validate(&self) -> Result<(), EasyPayError> {
        match self.kind {
            TransactionKind::Payment => {
                if self.amount <= Decimal::ZERO {
                    return Err(EasyPayError::InvalidConfiguration(format!(
                        "payment amount must be greater than zero, got {}",
                        self.amount
                    )));
                }
            }
            TransactionKind::Reversal => {
                if self.receipt_number == 0 {
                    return Err(EasyPayError::InvalidConfiguration(
                        "reversal requires a receipt number".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Converts a decimal amount to minor units (cents).
///
/// Returns `None` when the value does not fit an `i64`.
pub fn minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::from(100)).trunc().to_i64()
}
