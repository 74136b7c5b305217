use core_types::{CoreError, Currency, CurrencyPair, Time};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceError {
    #[error("No conversion path from {from} to {to}")]
    NoPath { from: Currency, to: Currency },

    #[error("No quote for {pair} at or before {time}")]
    NoQuote { pair: CurrencyPair, time: Time },

    #[error("Invalid quote: {0}")]
    InvalidQuote(#[from] CoreError),

    #[error("Arithmetic overflow while pricing {0}")]
    Overflow(String),
}
