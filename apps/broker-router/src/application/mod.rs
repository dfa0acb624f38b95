//! Application Layer
//!
//! - **Ports**: the broker adapter contract and transaction recorders
//! - **Services**: registry, routing, discovery, metrics and comparison

pub mod ports;
pub mod services;

pub use ports::*;
