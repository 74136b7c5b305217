//! # Ledgerline Price Graph
//!
//! Answers "what is one unit of X worth in Y at time T". Currencies are vertices,
//! quoted pairs are edges carrying bid/ask series. Missing direct quotes are bridged by
//! the shortest chain of quoted pairs, compounding spreads hop by hop.
//!
//! ## Public API
//!
//! - `PriceGraph`: the graph and its `price`/`path` queries.
//! - `Price`: a bid/ask conversion factor.
//! - `SeriesStore` / `InMemorySeriesStore`: the boundary to historical quote data.
//! - `PriceError`: `NoPath`, `NoQuote` and friends.

pub mod error;
pub mod graph;
pub mod store;

pub use error::PriceError;
pub use graph::{Price, PriceGraph};
pub use store::{InMemorySeriesStore, SeriesStore};
