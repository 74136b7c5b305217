use crate::error::ExecutorError;
use crate::orders::Order;
use configuration::FilterSettings;
use core_types::{Amount, Currency, Time};
use price_graph::Price;
use rust_decimal::Decimal;
use serde::Serialize;

/// A cost levied on a trade, before the simulator decides which account pays it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostCharge {
    pub amount: Decimal,
    pub currency: Currency,
}

/// What a filter gets to see about a trade being executed.
#[derive(Debug, Clone)]
pub struct ExecutionContext<'a> {
    pub time: Time,
    pub from: &'a Currency,
    pub to: &'a Currency,
    /// Units leaving `from`, before costs.
    pub debited: Decimal,
    /// Units arriving in `to`, before costs.
    pub credited: Decimal,
    /// The `from -> to` price the trade executed at.
    pub price: Price,
}

/// A transaction cost model attached to the simulator.
///
/// Filters never block a trade. They only add charges, which are booked together with
/// the trade itself.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionCostFilter {
    /// A flat charge per trade.
    Fixed {
        name: String,
        charge: Amount,
        excluded: Vec<Currency>,
    },
    /// A fraction of the debited source units, with an optional floor.
    Proportional {
        name: String,
        rate: Decimal,
        minimum: Option<Decimal>,
        excluded: Vec<Currency>,
    },
}

impl TransactionCostFilter {
    pub fn fixed(name: impl Into<String>, charge: Amount) -> Result<Self, ExecutorError> {
        if charge.value < Decimal::ZERO {
            return Err(ExecutorError::Configuration(format!(
                "fixed charge must not be negative, got {}",
                charge
            )));
        }
        Ok(TransactionCostFilter::Fixed {
            name: name.into(),
            charge,
            excluded: Vec::new(),
        })
    }

    pub fn proportional(
        name: impl Into<String>,
        rate: Decimal,
        minimum: Option<Decimal>,
    ) -> Result<Self, ExecutorError> {
        if rate < Decimal::ZERO || rate >= Decimal::ONE {
            return Err(ExecutorError::Configuration(format!(
                "proportional rate must be in [0, 1), got {}",
                rate
            )));
        }
        if minimum.is_some_and(|m| m < Decimal::ZERO) {
            return Err(ExecutorError::Configuration(
                "proportional minimum must not be negative".to_string(),
            ));
        }
        Ok(TransactionCostFilter::Proportional {
            name: name.into(),
            rate,
            minimum,
            excluded: Vec::new(),
        })
    }

    /// Exempts trades whose both legs are among `currencies`.
    pub fn with_excluded(mut self, currencies: impl IntoIterator<Item = Currency>) -> Self {
        match &mut self {
            TransactionCostFilter::Fixed { excluded, .. }
            | TransactionCostFilter::Proportional { excluded, .. } => excluded.extend(currencies),
        }
        self
    }

    pub fn from_settings(settings: &FilterSettings) -> Result<Self, ExecutorError> {
        match settings {
            FilterSettings::Fixed {
                name,
                amount,
                currency,
                excluded,
            } => {
                let charge = Amount::new(*amount, currency.clone())
                    .map_err(|e| ExecutorError::Configuration(e.to_string()))?;
                Ok(Self::fixed(name.clone(), charge)?.with_excluded(excluded.iter().cloned()))
            }
            FilterSettings::Proportional {
                name,
                rate,
                minimum,
                excluded,
            } => Ok(Self::proportional(name.clone(), *rate, *minimum)?
                .with_excluded(excluded.iter().cloned())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TransactionCostFilter::Fixed { name, .. }
            | TransactionCostFilter::Proportional { name, .. } => name,
        }
    }

    fn excluded(&self) -> &[Currency] {
        match self {
            TransactionCostFilter::Fixed { excluded, .. }
            | TransactionCostFilter::Proportional { excluded, .. } => excluded,
        }
    }

    /// The charge for `order`, or `None` when this filter does not apply to it.
    pub fn apply(&self, order: &Order, context: &ExecutionContext<'_>) -> Option<CostCharge> {
        if !order.is_trade() {
            return None;
        }
        let excluded = self.excluded();
        if excluded.contains(context.from) && excluded.contains(context.to) {
            tracing::trace!(filter = self.name(), from = %context.from, to = %context.to, "Trade exempt from filter");
            return None;
        }

        let charge = match self {
            TransactionCostFilter::Fixed { charge, .. } => CostCharge {
                amount: charge.value,
                currency: charge.currency.clone(),
            },
            TransactionCostFilter::Proportional { rate, minimum, .. } => {
                // rate < 1, so the product never exceeds the debited amount.
                let proportional = *rate * context.debited;
                CostCharge {
                    amount: proportional.max(minimum.unwrap_or(Decimal::ZERO)),
                    currency: context.from.clone(),
                }
            }
        };
        if charge.amount.is_zero() {
            return None;
        }
        tracing::debug!(filter = self.name(), amount = %charge.amount, currency = %charge.currency, "Cost charged");
        Some(charge)
    }
}
