use crate::error::CoreError;
use crate::primitives::{checked_time, Currency, Time};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered pair of currencies. A quote on `base/quote` prices one unit of `base` in `quote`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: Currency,
    pub quote: Currency,
}

impl CurrencyPair {
    pub fn new(base: Currency, quote: Currency) -> Result<Self, CoreError> {
        if base == quote {
            return Err(CoreError::InvalidInput(
                "currency pair".to_string(),
                format!("base and quote must differ: {}", base),
            ));
        }
        Ok(Self { base, quote })
    }

    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// A timestamped bid/ask observation for a currency pair.
///
/// `bid` is what one unit of `base` sells for, `ask` what it costs to buy, both in `quote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub pair: CurrencyPair,
    pub time: Time,
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Quote {
    /// Creates a quote, enforcing `0 < bid <= ask` and the accepted time range.
    pub fn new(pair: CurrencyPair, time: Time, bid: Decimal, ask: Decimal) -> Result<Self, CoreError> {
        checked_time(time)?;
        if bid <= Decimal::ZERO || ask <= Decimal::ZERO {
            return Err(CoreError::InvalidQuote(format!(
                "{} at {}: prices must be strictly positive (bid={}, ask={})",
                pair, time, bid, ask
            )));
        }
        if bid > ask {
            return Err(CoreError::InvalidQuote(format!(
                "{} at {}: bid {} exceeds ask {}",
                pair, time, bid, ask
            )));
        }
        Ok(Self { pair, time, bid, ask })
    }

    /// A quote without spread.
    pub fn mid(pair: CurrencyPair, time: Time, price: Decimal) -> Result<Self, CoreError> {
        Self::new(pair, time, price, price)
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn pair() -> CurrencyPair {
        CurrencyPair::new(Currency::new("EUR").unwrap(), Currency::new("USD").unwrap()).unwrap()
    }

    #[test]
    fn pair_requires_distinct_currencies() {
        let eur = Currency::new("EUR").unwrap();
        assert!(CurrencyPair::new(eur.clone(), eur).is_err());
        assert_eq!(pair().inverse().to_string(), "USD/EUR");
    }

    #[test]
    fn crossed_or_non_positive_quotes_are_rejected() {
        let t = Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap();
        assert!(Quote::new(pair(), t, dec!(1.17), dec!(1.18)).is_ok());
        assert!(Quote::new(pair(), t, dec!(1.19), dec!(1.18)).is_err());
        assert!(Quote::new(pair(), t, dec!(0), dec!(1.18)).is_err());
        assert!(Quote::new(pair(), t, dec!(-1), dec!(-0.5)).is_err());
    }

    #[test]
    fn mid_quote_has_zero_spread() {
        let t = Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap();
        let q = Quote::mid(pair(), t, dec!(1.2)).unwrap();
        assert_eq!(q.spread(), dec!(0));
    }
}
