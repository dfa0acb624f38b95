//! Broker Adapters
//!
//! Implementations of `BrokerAdapter` for concrete brokers.

pub mod paper;

pub use paper::{PaperBroker, PaperConfig, PaperControls};
