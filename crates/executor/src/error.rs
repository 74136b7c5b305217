use core_types::{CoreError, Currency, Time};
use price_graph::PriceError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Not enough funds in account {currency}. Required: {required}, Available: {available}")]
    InsufficientFunds {
        currency: Currency,
        required: Decimal,
        available: Decimal,
    },

    #[error("Account {0} already exists")]
    AccountExists(Currency),

    #[error("Account not found for currency: {0}")]
    AccountNotFound(Currency),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Time must move forward. Current: {current}, Requested: {requested}")]
    TimeOrderViolation { current: Time, requested: Time },

    #[error("Pricing error: {0}")]
    Price(#[from] PriceError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Invalid simulator configuration: {0}")]
    Configuration(String),
}

impl ExecutorError {
    /// Whether the failure concerns a single order only.
    ///
    /// Order-scoped failures reject that order and let the rest of the batch proceed.
    /// Everything else aborts the step.
    pub fn is_order_scoped(&self) -> bool {
        matches!(
            self,
            ExecutorError::InvalidOrder(_)
                | ExecutorError::InsufficientFunds { .. }
                | ExecutorError::AccountExists(_)
                | ExecutorError::AccountNotFound(_)
                | ExecutorError::Overflow(_)
        )
    }
}
