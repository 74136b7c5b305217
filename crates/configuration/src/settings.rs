use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use core_types::{ConvertDirection, Currency};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// The root configuration structure for a simulation run.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub broker: BrokerSettings,
    /// Accounts opened at the start of the run.
    #[serde(default)]
    pub accounts: Vec<AccountSettings>,
    /// Transaction cost filters, applied in the listed order.
    #[serde(default)]
    pub filters: Vec<FilterSettings>,
    /// Inline quote series feeding the price graph.
    #[serde(default)]
    pub quotes: Vec<QuoteSeriesSettings>,
    /// Orders replayed at fixed times by the command-line runner.
    #[serde(default)]
    pub orders: Vec<ScheduledOrderSettings>,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Parameters of the broker simulator itself.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSettings {
    /// The reference currency for valuations.
    pub default_numeraire: Currency,
    /// Time at which the initial orders are applied. Defaults to the earliest quote.
    pub start_time: Option<DateTime<Utc>>,
    /// Upper bound on the number of simulation steps.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_max_iterations() -> usize {
    1_000_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountSettings {
    pub currency: Currency,
    #[serde(default)]
    pub initial_amount: Decimal,
}

/// A transaction cost model.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSettings {
    /// A flat charge per trade.
    Fixed {
        name: String,
        amount: Decimal,
        currency: Currency,
        /// Trades between two of these currencies are free.
        #[serde(default)]
        excluded: Vec<Currency>,
    },
    /// A fraction of the traded source amount, charged in the source currency.
    Proportional {
        name: String,
        rate: Decimal,
        #[serde(default)]
        minimum: Option<Decimal>,
        #[serde(default)]
        excluded: Vec<Currency>,
    },
}

impl FilterSettings {
    pub fn name(&self) -> &str {
        match self {
            FilterSettings::Fixed { name, .. } | FilterSettings::Proportional { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteSeriesSettings {
    pub base: Currency,
    pub quote: Currency,
    pub series: Vec<ObservationSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservationSettings {
    pub time: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledOrderSettings {
    /// The order is submitted at the first step at or after this time.
    pub time: DateTime<Utc>,
    pub order: OrderSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderSettings {
    Deposit {
        currency: Currency,
        amount: Decimal,
    },
    Withdraw {
        currency: Currency,
        amount: Decimal,
    },
    Convert {
        from: Currency,
        to: Currency,
        amount: Decimal,
        /// Denomination of `amount`. Defaults to `from` when selling and `to` when buying.
        currency: Option<Currency>,
        direction: Option<ConvertDirection>,
    },
    TransferAll {
        from: Currency,
        to: Currency,
    },
}

/// Where and how much to log.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// An `EnvFilter` directive such as `info` or `executor=debug,info`. `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// When set, logs go to a daily rolling file in this directory instead of stderr.
    pub directory: Option<PathBuf>,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_file_prefix() -> String {
    "ledgerline.log".to_string()
}

fn default_ansi() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            file_prefix: default_file_prefix(),
            ansi: default_ansi(),
        }
    }
}

impl Settings {
    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut currencies = BTreeSet::new();
        for account in &self.accounts {
            if !currencies.insert(&account.currency) {
                return Err(ConfigError::ValidationError(format!(
                    "account {} is configured more than once",
                    account.currency
                )));
            }
            if account.initial_amount < Decimal::ZERO {
                return Err(ConfigError::ValidationError(format!(
                    "initial amount of account {} must not be negative",
                    account.currency
                )));
            }
        }

        let mut names = BTreeSet::new();
        for filter in &self.filters {
            if filter.name().is_empty() {
                return Err(ConfigError::ValidationError(
                    "filter names must not be empty".to_string(),
                ));
            }
            if !names.insert(filter.name()) {
                return Err(ConfigError::ValidationError(format!(
                    "filter {} is configured more than once",
                    filter.name()
                )));
            }
            match filter {
                FilterSettings::Fixed { amount, .. } if *amount < Decimal::ZERO => {
                    return Err(ConfigError::ValidationError(format!(
                        "fixed filter {} must not charge a negative amount",
                        filter.name()
                    )));
                }
                FilterSettings::Proportional { rate, .. }
                    if *rate < Decimal::ZERO || *rate >= Decimal::ONE =>
                {
                    return Err(ConfigError::ValidationError(format!(
                        "rate of filter {} must be in [0, 1)",
                        filter.name()
                    )));
                }
                _ => {}
            }
        }

        for series in &self.quotes {
            if series.base == series.quote {
                return Err(ConfigError::ValidationError(format!(
                    "quote series {}/{} must use two different currencies",
                    series.base, series.quote
                )));
            }
        }
        Ok(())
    }
}
