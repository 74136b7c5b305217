//! # Ledgerline Backtester Crate
//!
//! Runs strategies against the broker simulator, either over a recorded quote history
//! (`Broker::run`) or over a live market feed (`LiveBroker::run`). Strategies only see
//! the `BrokerApi` trait, so the same strategy drives both.
//!
//! ## Public API
//!
//! - `Broker` / `BrokerApi`: the backtesting broker and the strategy-facing interface.
//! - `Strategy`, `ScheduledOrders`: the strategy seam and a replay strategy.
//! - `Observer`, `NavRecorder`, `ProgressObserver`: read-only per-step hooks.
//! - `LiveBroker`, `LiveHandle`, `MarketEventSource`, `MarketEvent`: live mode.
//! - `BacktestError`: the specific error types that can be returned from this crate.

pub mod broker;
pub mod error;
pub mod live;
pub mod observer;
pub mod strategy;

pub use broker::{simulator_from_settings, store_from_settings, Broker, BrokerApi, RunSummary};
pub use error::BacktestError;
pub use live::{
    replay_events, ChannelSource, LiveBroker, LiveHandle, LiveSession, MarketEvent,
    MarketEventSource,
};
pub use observer::{NavPoint, NavRecorder, Observer, ProgressObserver};
pub use strategy::{ScheduledOrders, Strategy};
