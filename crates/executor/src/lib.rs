//! # Ledgerline Executor Crate
//!
//! This crate owns the ledger and everything that changes it. A `BrokerSimulator`
//! queues `Order`s, prices them through the `PriceGraph` when time advances, runs them
//! through the configured `TransactionCostFilter`s and books trade and costs as a single
//! `LedgerDelta`.
//!
//! ## Architectural Principles
//!
//! - **Single owner:** only the simulator mutates the `Ledger`. Strategies and observers
//!   see it through read-only queries.
//! - **Batch semantics:** orders submitted during a step take effect at the next
//!   `advance_time`. Failures of a single order are reported in the `BatchReport`;
//!   pricing failures abort the whole step and leave the state untouched.
//!
//! ## Public API
//!
//! - `BrokerSimulator` / `SimulatorConfig`: the order-processing state machine.
//! - `Order` / `OrderId`: the instructions it accepts.
//! - `TransactionCostFilter`: fixed and proportional cost models.
//! - `Ledger` / `Account` / `LedgerDelta`: balances and staged changes.
//! - `ExecutorError`: the specific error types that can be returned from this crate.

pub mod error;
pub mod filters;
pub mod ledger;
pub mod orders;
pub mod simulator;

pub use error::ExecutorError;
pub use filters::{CostCharge, ExecutionContext, TransactionCostFilter};
pub use ledger::{Account, Ledger, LedgerDelta};
pub use orders::{Order, OrderId};
pub use simulator::{
    AppliedCost, BatchReport, BrokerSimulator, Execution, LedgerSnapshot, OrderRecord, Rejection,
    SimulatorConfig, SimulatorState, MAX_EXECUTED_ORDERS, MAX_REJECTED_ORDERS,
};
