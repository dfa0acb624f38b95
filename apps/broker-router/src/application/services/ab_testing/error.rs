//! Router errors.

use thiserror::Error;

use crate::domain::ab_testing::TestConfigError;
use crate::domain::errors::StandardBrokerError;
use crate::domain::shared::TestId;

/// Errors surfaced by routing and test management.
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// No test with the ID.
    #[error("Test not found: {0}")]
    TestNotFound(TestId),

    /// Test configuration or status change rejected.
    #[error("Invalid test: {0}")]
    InvalidTest(#[from] TestConfigError),

    /// A split names a broker the registry does not know.
    #[error("Broker {0} is not registered")]
    UnregisteredBroker(String),

    /// Nothing to route to.
    #[error("No brokers available for routing")]
    NoBrokersAvailable,

    /// Routed broker has no live instance.
    #[error("No available instance of broker {0}")]
    AdapterUnavailable(String),

    /// Placement failed at the broker. Recorded before being returned.
    #[error(transparent)]
    Broker(#[from] StandardBrokerError),
}
