use crate::error::ExecutorError;
use configuration::{AccountSettings, OrderSettings};
use core_types::{checked_value, Amount, ConvertDirection, Currency};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Identifier handed out by the simulator on submission. Ids increase with submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An instruction against the ledger, executed at the next simulation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Order {
    /// Opens an account, optionally funded.
    CreateAccount {
        currency: Currency,
        initial_amount: Decimal,
    },
    /// External inflow into the account of `amount.currency`.
    Deposit { amount: Amount },
    /// External outflow from the account of `amount.currency`.
    Withdraw { amount: Amount },
    /// Moves value from one account into another at market prices.
    ///
    /// `amount` may be denominated in any currency. With `Sell` it measures what leaves
    /// `from`, with `Buy` what arrives in `to`.
    Convert {
        from: Currency,
        to: Currency,
        amount: Amount,
        direction: ConvertDirection,
    },
    /// Sells the entire balance of `from` into `to`.
    TransferAll { from: Currency, to: Currency },
}

impl Order {
    pub fn create_account(currency: Currency, initial_amount: Decimal) -> Result<Self, ExecutorError> {
        let order = Order::CreateAccount {
            currency,
            initial_amount,
        };
        order.validate()?;
        Ok(order)
    }

    pub fn deposit(amount: Amount) -> Result<Self, ExecutorError> {
        let order = Order::Deposit { amount };
        order.validate()?;
        Ok(order)
    }

    pub fn withdraw(amount: Amount) -> Result<Self, ExecutorError> {
        let order = Order::Withdraw { amount };
        order.validate()?;
        Ok(order)
    }

    pub fn convert(
        from: Currency,
        to: Currency,
        amount: Amount,
        direction: ConvertDirection,
    ) -> Result<Self, ExecutorError> {
        let order = Order::Convert {
            from,
            to,
            amount,
            direction,
        };
        order.validate()?;
        Ok(order)
    }

    /// Sells `value` units of `from` for `to`.
    pub fn sell(from: Currency, to: Currency, value: Decimal) -> Result<Self, ExecutorError> {
        let amount = amount_of(value, from.clone())?;
        Self::convert(from, to, amount, ConvertDirection::Sell)
    }

    /// Buys `value` units of `to`, paying with `from`.
    pub fn buy(from: Currency, to: Currency, value: Decimal) -> Result<Self, ExecutorError> {
        let amount = amount_of(value, to.clone())?;
        Self::convert(from, to, amount, ConvertDirection::Buy)
    }

    pub fn transfer_all(from: Currency, to: Currency) -> Result<Self, ExecutorError> {
        let order = Order::TransferAll { from, to };
        order.validate()?;
        Ok(order)
    }

    /// Checks the order's own parameters. Account existence and funds are checked at execution.
    pub fn validate(&self) -> Result<(), ExecutorError> {
        match self {
            Order::CreateAccount {
                currency,
                initial_amount,
            } => {
                in_range(currency, *initial_amount)?;
                if *initial_amount < Decimal::ZERO {
                    return Err(ExecutorError::InvalidOrder(format!(
                        "initial amount of account {} must not be negative, got {}",
                        currency, initial_amount
                    )));
                }
            }
            Order::Deposit { amount } | Order::Withdraw { amount } => {
                strictly_positive(self.kind(), amount)?;
            }
            Order::Convert {
                from, to, amount, ..
            } => {
                distinct(from, to)?;
                strictly_positive(self.kind(), amount)?;
            }
            Order::TransferAll { from, to } => distinct(from, to)?,
        }
        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Order::CreateAccount { .. } => "create_account",
            Order::Deposit { .. } => "deposit",
            Order::Withdraw { .. } => "withdraw",
            Order::Convert { .. } => "convert",
            Order::TransferAll { .. } => "transfer_all",
        }
    }

    /// Whether the order exchanges one currency for another and is therefore subject to costs.
    pub fn is_trade(&self) -> bool {
        matches!(self, Order::Convert { .. } | Order::TransferAll { .. })
    }

    /// Builds the opening order for a configured account.
    pub fn from_account_settings(settings: &AccountSettings) -> Result<Self, ExecutorError> {
        Self::create_account(settings.currency.clone(), settings.initial_amount)
    }

    /// Builds an order from its configuration form.
    pub fn from_settings(settings: &OrderSettings) -> Result<Self, ExecutorError> {
        match settings {
            OrderSettings::Deposit { currency, amount } => {
                Self::deposit(amount_of(*amount, currency.clone())?)
            }
            OrderSettings::Withdraw { currency, amount } => {
                Self::withdraw(amount_of(*amount, currency.clone())?)
            }
            OrderSettings::Convert {
                from,
                to,
                amount,
                currency,
                direction,
            } => {
                let direction = direction.unwrap_or(ConvertDirection::Sell);
                let denomination = match (currency, direction) {
                    (Some(currency), _) => currency.clone(),
                    (None, ConvertDirection::Sell) => from.clone(),
                    (None, ConvertDirection::Buy) => to.clone(),
                };
                let amount = amount_of(*amount, denomination)?;
                Self::convert(from.clone(), to.clone(), amount, direction)
            }
            OrderSettings::TransferAll { from, to } => Self::transfer_all(from.clone(), to.clone()),
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::CreateAccount {
                currency,
                initial_amount,
            } => write!(f, "open {} with {}", currency, initial_amount),
            Order::Deposit { amount } => write!(f, "deposit {}", amount),
            Order::Withdraw { amount } => write!(f, "withdraw {}", amount),
            Order::Convert {
                from,
                to,
                amount,
                direction,
            } => {
                let verb = match direction {
                    ConvertDirection::Sell => "sell",
                    ConvertDirection::Buy => "buy",
                };
                write!(f, "{} {} ({} -> {})", verb, amount, from, to)
            }
            Order::TransferAll { from, to } => write!(f, "transfer all {} -> {}", from, to),
        }
    }
}

fn amount_of(value: Decimal, currency: Currency) -> Result<Amount, ExecutorError> {
    Amount::new(value, currency).map_err(|e| ExecutorError::InvalidOrder(e.to_string()))
}

fn in_range(currency: &Currency, value: Decimal) -> Result<(), ExecutorError> {
    checked_value(currency.as_str(), value)
        .map(|_| ())
        .map_err(|e| ExecutorError::InvalidOrder(e.to_string()))
}

fn strictly_positive(kind: &str, amount: &Amount) -> Result<(), ExecutorError> {
    in_range(&amount.currency, amount.value)?;
    if amount.value <= Decimal::ZERO {
        return Err(ExecutorError::InvalidOrder(format!(
            "{} amount must be strictly positive, got {}",
            kind, amount
        )));
    }
    Ok(())
}

fn distinct(from: &Currency, to: &Currency) -> Result<(), ExecutorError> {
    if from == to {
        return Err(ExecutorError::InvalidOrder(format!(
            "source and target accounts must differ, got {} twice",
            from
        )));
    }
    Ok(())
}
