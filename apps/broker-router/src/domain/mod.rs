//! Domain Layer
//!
//! The innermost layer containing broker-neutral types with zero
//! infrastructure dependencies.
//!
//! # Contexts
//!
//! - [`ab_testing`]: Experiment configuration, lifecycle and results
//! - [`order_execution`]: Order requests, results and transaction records
//! - [`account`]: Account summaries and positions
//! - [`market_data`]: Quotes, candles and instrument classes
//! - [`capability`]: Broker features and declared trading structures
//! - [`errors`]: The standard error taxonomy
//! - [`performance`]: Samples, benchmarks, scores and comparisons
//! - [`statistics`]: Summary statistics and significance testing

pub mod ab_testing;
pub mod account;
pub mod capability;
pub mod errors;
pub mod market_data;
pub mod order_execution;
pub mod performance;
pub mod shared;
pub mod statistics;
