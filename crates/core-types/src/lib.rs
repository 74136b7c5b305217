//! # Ledgerline Core Types
//!
//! Layer 0 value types shared by every other crate: currency codes, amounts,
//! quotes and the time bounds the engine accepts.

pub mod enums;
pub mod error;
pub mod primitives;
pub mod quote;

// Re-export the core types to provide a clean public API.
pub use enums::{ConvertDirection, OrderStatus};
pub use error::CoreError;
pub use primitives::{
    checked_time, checked_value, max_abs_value, negligible_amount, Amount, Currency, Time,
};
pub use quote::{CurrencyPair, Quote};
