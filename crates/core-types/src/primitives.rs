use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A point on the simulation clock.
pub type Time = DateTime<Utc>;

/// Seconds since the epoch of the first instant outside the accepted time range (2100-01-01).
const MAX_TIMESTAMP: i64 = 4_102_444_800;

/// Maximum absolute value of any amount handed to the engine.
pub fn max_abs_value() -> Decimal {
    Decimal::from_i128_with_scale(1_000_000_000_000_000_000_000_000, 0)
}

/// Balances below this magnitude are treated as empty.
pub fn negligible_amount() -> Decimal {
    Decimal::new(1, 12)
}

/// A currency or asset code, e.g. `EUR`, `XAU` or `SPX`.
///
/// Codes are non-empty and shorter than 256 characters. They are ordered
/// lexicographically, which the price graph relies on for deterministic path search.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> Result<Self, CoreError> {
        let code = code.into();
        if code.is_empty() || code.len() >= 256 {
            return Err(CoreError::InvalidCurrency(code));
        }
        if code.chars().any(char::is_control) {
            tracing::warn!("Non-printable characters detected in currency code {:?}", code);
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(value)
    }
}

impl TryFrom<&str> for Currency {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Currency::new(value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

/// A signed monetary quantity denominated in a currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub value: Decimal,
    pub currency: Currency,
}

impl Amount {
    /// Creates an amount, rejecting values outside of `±max_abs_value()`.
    pub fn new(value: Decimal, currency: Currency) -> Result<Self, CoreError> {
        let value = checked_value(currency.as_str(), value)?;
        Ok(Self { value, currency })
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            value: Decimal::ZERO,
            currency,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

/// Validates that `value` lies within the accepted range and returns it.
pub fn checked_value(key: &str, value: Decimal) -> Result<Decimal, CoreError> {
    let limit = max_abs_value();
    if value.abs() > limit {
        return Err(CoreError::ValueOutOfRange {
            key: key.to_string(),
            value: value.to_string(),
            limit: limit.to_string(),
        });
    }
    Ok(value)
}

/// Validates that `t` lies strictly between 1970-01-01 and 2100-01-01.
pub fn checked_time(t: Time) -> Result<Time, CoreError> {
    let ts = t.timestamp();
    if ts <= 0 || ts >= MAX_TIMESTAMP {
        return Err(CoreError::TimeOutOfRange(t.to_rfc3339()));
    }
    Ok(t)
}
