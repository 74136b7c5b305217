use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    #[error("Value {value} for {key} outside of acceptable range [-{limit}, {limit}]")]
    ValueOutOfRange {
        key: String,
        value: String,
        limit: String,
    },

    #[error("Time outside of acceptable range: {0}")]
    TimeOutOfRange(String),

    #[error("Invalid quote: {0}")]
    InvalidQuote(String),
}
