//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer:
//!
//! - `broker/`: concrete [`BrokerAdapter`](crate::application::ports::BrokerAdapter)
//!   implementations (the in-process paper broker)
//! - `export`: JSON files for analysis reports

pub mod broker;
pub mod export;
