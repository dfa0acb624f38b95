//! Registry errors.

use thiserror::Error;

use crate::domain::errors::StandardBrokerError;
use crate::domain::shared::InstanceId;

/// Errors surfaced by registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// No registration under the name.
    #[error("Unsupported broker: {0}")]
    UnsupportedBroker(String),

    /// Registration exists but is disabled.
    #[error("Broker {0} is disabled")]
    BrokerDisabled(String),

    /// Configuration failed schema validation or construction.
    #[error("Invalid configuration for {broker}: {}", errors.join("; "))]
    BrokerConfiguration {
        /// Broker name.
        broker: String,
        /// One message per violation.
        errors: Vec<String>,
    },

    /// Credentials rejected or authentication failed.
    #[error("Authentication failed for {broker}: {reason}")]
    BrokerAuthentication {
        /// Broker name.
        broker: String,
        /// Human-readable reason.
        reason: String,
        /// Underlying adapter error, if authentication raised one.
        #[source]
        source: Option<StandardBrokerError>,
    },

    /// No live instance with the ID.
    #[error("Instance not found: {0}")]
    InstanceNotFound(InstanceId),
}
