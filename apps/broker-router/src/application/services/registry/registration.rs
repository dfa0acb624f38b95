//! Broker registrations: the "class" side of the registry.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::schema::ConfigSchema;
use crate::application::ports::BrokerAdapter;
use crate::domain::capability::BrokerCapability;
use crate::domain::errors::StandardBrokerError;

/// Builds an adapter from an instance configuration.
///
/// The return type is the adapter contract itself, so any constructor that
/// compiles produces a conforming adapter.
pub type AdapterConstructor =
    Arc<dyn Fn(&Value) -> Result<Arc<dyn BrokerAdapter>, StandardBrokerError> + Send + Sync>;

/// Immutable metadata describing how to build adapters for one broker.
#[derive(Clone)]
pub struct BrokerRegistration {
    /// Registry key.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Adapter version.
    pub version: String,
    /// Declared capabilities.
    pub capabilities: BTreeSet<BrokerCapability>,
    /// Instance configuration schema.
    pub schema: ConfigSchema,
    /// Disabled registrations refuse new instances.
    pub enabled: bool,
    /// Adapter factory.
    pub constructor: AdapterConstructor,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
}

impl BrokerRegistration {
    /// Create an enabled registration with an empty schema and no declared
    /// capabilities.
    pub fn new<F>(name: impl Into<String>, version: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&Value) -> Result<Arc<dyn BrokerAdapter>, StandardBrokerError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            version: version.into(),
            capabilities: BTreeSet::new(),
            schema: ConfigSchema::default(),
            enabled: true,
            constructor: Arc::new(constructor),
            registered_at: Utc::now(),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Declare capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = BrokerCapability>) -> Self {
        self.capabilities.extend(caps);
        self
    }

    /// Set the configuration schema.
    #[must_use]
    pub fn with_schema(mut self, schema: ConfigSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Enable or disable the registration.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl fmt::Debug for BrokerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerRegistration")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("version", &self.version)
            .field("capabilities", &self.capabilities)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
