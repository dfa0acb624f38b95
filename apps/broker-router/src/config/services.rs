//! Service tuning sections.

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::application::services::{
    DiscoveryConfig, MetricsCollectorConfig, RegistryConfig, RouterConfig,
};
use crate::domain::capability::TestingStrategy;
use crate::domain::performance::HealthThresholds;

/// Registry and health-check loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Seconds between health-check rounds.
    pub health_check_interval_secs: u64,
    /// Budget per health check.
    pub health_check_timeout_secs: u64,
    /// Budget for authentication.
    pub auth_timeout_secs: u64,
    /// Consecutive failures before eviction.
    pub max_consecutive_failures: u32,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 60,
            health_check_timeout_secs: 30,
            auth_timeout_secs: 30,
            max_consecutive_failures: 3,
        }
    }
}

impl RegistrySettings {
    /// Registry configuration.
    #[must_use]
    pub fn to_registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            health_check_interval: Duration::from_secs(self.health_check_interval_secs),
            health_check_timeout: Duration::from_secs(self.health_check_timeout_secs),
            auth_timeout: Duration::from_secs(self.auth_timeout_secs),
            max_consecutive_failures: self.max_consecutive_failures,
            ..RegistryConfig::default()
        }
    }
}

/// Performance metrics collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Seconds between collection rounds.
    pub collection_interval_secs: u64,
    /// Budget per timed health check.
    pub health_check_timeout_secs: u64,
    /// Budget per timed price fetch.
    pub price_timeout_secs: u64,
    /// Samples kept per broker.
    pub history_capacity: usize,
    /// Rolling order window.
    pub rolling_window_secs: i64,
    /// Instrument priced each round.
    pub probe_instrument: Option<String>,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            collection_interval_secs: 60,
            health_check_timeout_secs: 30,
            price_timeout_secs: 10,
            history_capacity: 10_000,
            rolling_window_secs: 3_600,
            probe_instrument: None,
        }
    }
}

impl MetricsSettings {
    /// Collector configuration.
    #[must_use]
    pub fn to_collector_config(&self) -> MetricsCollectorConfig {
        MetricsCollectorConfig {
            collection_interval: Duration::from_secs(self.collection_interval_secs),
            health_check_timeout: Duration::from_secs(self.health_check_timeout_secs),
            price_timeout: Duration::from_secs(self.price_timeout_secs),
            history_capacity: self.history_capacity,
            rolling_window: TimeDelta::seconds(self.rolling_window_secs),
            probe_instrument: self.probe_instrument.clone(),
        }
    }
}

/// Traffic router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Budget per order placement.
    pub order_timeout_secs: u64,
    /// Executions retained per test.
    pub execution_history_capacity: usize,
    /// Samples scored by performance-based routing.
    pub performance_window: usize,
    /// Warning thresholds for analysis and comparison.
    pub thresholds: HealthThresholds,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            order_timeout_secs: 30,
            execution_history_capacity: 10_000,
            performance_window: 10,
            thresholds: HealthThresholds::default(),
        }
    }
}

impl RouterSettings {
    /// Router configuration.
    #[must_use]
    pub fn to_router_config(&self) -> RouterConfig {
        RouterConfig {
            order_timeout: Duration::from_secs(self.order_timeout_secs),
            execution_history_capacity: self.execution_history_capacity,
            performance_window: self.performance_window,
            thresholds: self.thresholds,
        }
    }
}

/// Capability discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Strategy used at startup.
    pub strategy: TestingStrategy,
    /// Profile cache lifetime.
    pub cache_ttl_hours: i64,
    /// Budget per probe.
    pub probe_timeout_secs: u64,
    /// Budget for the streaming probe.
    pub stream_timeout_secs: u64,
    /// Ticks the streaming probe waits for.
    pub stream_sample_ticks: usize,
    /// Instruments probed per broker.
    pub max_instruments: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            strategy: TestingStrategy::Static,
            cache_ttl_hours: 24,
            probe_timeout_secs: 10,
            stream_timeout_secs: 30,
            stream_sample_ticks: 3,
            max_instruments: 50,
        }
    }
}

impl DiscoverySettings {
    /// Discovery configuration.
    #[must_use]
    pub fn to_discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            cache_ttl: TimeDelta::hours(self.cache_ttl_hours),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            stream_timeout: Duration::from_secs(self.stream_timeout_secs),
            stream_sample_ticks: self.stream_sample_ticks,
            max_instruments: self.max_instruments,
        }
    }
}
