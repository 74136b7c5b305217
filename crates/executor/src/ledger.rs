use crate::error::ExecutorError;
use core_types::{checked_value, Currency};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// A single-currency balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    currency: Currency,
    balance: Decimal,
}

impl Account {
    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }
}

/// A set of balance changes booked together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerDelta {
    changes: BTreeMap<Currency, Decimal>,
}

impl LedgerDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&mut self, currency: &Currency, value: Decimal) -> Result<(), ExecutorError> {
        let entry = self.changes.entry(currency.clone()).or_insert(Decimal::ZERO);
        *entry = entry
            .checked_add(value)
            .ok_or_else(|| ExecutorError::Overflow(format!("crediting {} {}", value, currency)))?;
        Ok(())
    }

    pub fn debit(&mut self, currency: &Currency, value: Decimal) -> Result<(), ExecutorError> {
        let entry = self.changes.entry(currency.clone()).or_insert(Decimal::ZERO);
        *entry = entry
            .checked_sub(value)
            .ok_or_else(|| ExecutorError::Overflow(format!("debiting {} {}", value, currency)))?;
        Ok(())
    }

    /// Net change for `currency`.
    pub fn change(&self, currency: &Currency) -> Decimal {
        self.changes.get(currency).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Currency, &Decimal)> {
        self.changes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// All accounts of the simulated broker, at most one per currency.
///
/// Balances only change through `open` and `apply`, and `apply` never lets an account
/// that is being debited fall below zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    accounts: BTreeMap<Currency, Account>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an account for `currency`.
    pub fn open(&mut self, currency: Currency, initial_amount: Decimal) -> Result<(), ExecutorError> {
        if self.accounts.contains_key(&currency) {
            return Err(ExecutorError::AccountExists(currency));
        }
        if initial_amount < Decimal::ZERO {
            return Err(ExecutorError::InvalidOrder(format!(
                "initial amount of account {} must not be negative",
                currency
            )));
        }
        tracing::debug!(%currency, %initial_amount, "Account opened");
        self.accounts.insert(
            currency.clone(),
            Account {
                currency,
                balance: initial_amount,
            },
        );
        Ok(())
    }

    pub fn contains(&self, currency: &Currency) -> bool {
        self.accounts.contains_key(currency)
    }

    pub fn account(&self, currency: &Currency) -> Option<&Account> {
        self.accounts.get(currency)
    }

    pub fn balance(&self, currency: &Currency) -> Option<Decimal> {
        self.accounts.get(currency).map(Account::balance)
    }

    /// Accounts in currency order.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn balances(&self) -> BTreeMap<Currency, Decimal> {
        self.accounts
            .iter()
            .map(|(currency, account)| (currency.clone(), account.balance))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Books `delta` atomically.
    ///
    /// Every touched account must exist, and no decreasing account may end up negative.
    /// On error the ledger is left unchanged.
    pub fn apply(&mut self, delta: &LedgerDelta) -> Result<(), ExecutorError> {
        let mut updated = Vec::with_capacity(delta.changes.len());
        for (currency, change) in delta.iter() {
            let balance = self
                .balance(currency)
                .ok_or_else(|| ExecutorError::AccountNotFound(currency.clone()))?;
            let new_balance = balance
                .checked_add(*change)
                .ok_or_else(|| ExecutorError::Overflow(format!("balance of {}", currency)))?;
            checked_value(currency.as_str(), new_balance)
                .map_err(|e| ExecutorError::Overflow(e.to_string()))?;
            if *change < Decimal::ZERO && new_balance < Decimal::ZERO {
                return Err(ExecutorError::InsufficientFunds {
                    currency: currency.clone(),
                    required: -*change,
                    available: balance,
                });
            }
            updated.push((currency, new_balance));
        }

        for (currency, new_balance) in updated {
            if let Some(account) = self.accounts.get_mut(currency) {
                account.balance = new_balance;
            }
        }
        Ok(())
    }
}
