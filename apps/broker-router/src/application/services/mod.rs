//! Application Services
//!
//! Long-lived services over the adapter contract: the broker registry and
//! its health loop, error mapping, capability discovery, the traffic router
//! and the performance collector with its comparison engine.

pub mod ab_testing;
pub mod capability_discovery;
pub mod error_mapping;
pub mod performance;
pub mod registry;

pub use ab_testing::{RouterConfig, RouterError, RoutingDecision, TrafficRouter};
pub use capability_discovery::{CapabilityDiscoveryService, DiscoveryConfig, DiscoveryError};
pub use error_mapping::{BrokerErrorStats, ErrorAggregator, ErrorMapper, ErrorSummary};
pub use performance::{
    ComparisonEngine, ComparisonError, MetricsCollectorConfig, PerformanceMetricsCollector,
};
pub use registry::{BrokerRegistry, HealthCheckRound, RegistryConfig, RegistryError, RegistryStatus};
