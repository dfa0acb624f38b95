//! Application Ports
//!
//! Ports define interfaces for interacting with external systems.
//! - [`BrokerAdapter`]: how the application talks to a brokerage
//! - [`TransactionRecorder`]: where adapters report account-changing calls

mod broker_adapter;
mod transaction_recorder;

#[cfg(test)]
pub use broker_adapter::MockBrokerAdapter;
pub use broker_adapter::{
    BrokerAdapter, BrokerResult, Credentials, HealthReport, HealthStatus, OrderValidationError,
    PriceStream, describe_problems, not_supported, require_instrument, require_instruments,
    validate_order_against,
};
pub use transaction_recorder::{
    DEFAULT_RECORDER_CAPACITY, InMemoryTransactionRecorder, RecorderError, TransactionRecorder,
    TransactionRecorders,
};
