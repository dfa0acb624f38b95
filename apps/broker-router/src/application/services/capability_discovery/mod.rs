//! Capability Discovery Engine
//!
//! Builds [`BrokerCapabilityProfile`]s from an adapter's declared
//! descriptor (static) or from live, side-effect-free probes (dynamic).
//! Profiles are cached per broker; `force_refresh` bypasses the cache.

mod probes;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use thiserror::Error;

use crate::application::ports::BrokerAdapter;
use crate::application::services::registry::BrokerRegistry;
use crate::domain::capability::{
    BrokerCapability, BrokerCapabilityProfile, CapabilityComparison, CapabilityTestResult,
    InstrumentProfile, TestingStrategy,
};

/// Discovery tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// How long a cached profile stays fresh.
    pub cache_ttl: TimeDelta,
    /// Budget for each request/response probe.
    pub probe_timeout: Duration,
    /// Budget for the streaming probe.
    pub stream_timeout: Duration,
    /// Ticks the streaming probe waits for.
    pub stream_sample_ticks: usize,
    /// Instruments probed per broker.
    pub max_instruments: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: TimeDelta::hours(24),
            probe_timeout: Duration::from_secs(10),
            stream_timeout: Duration::from_secs(30),
            stream_sample_ticks: 3,
            max_instruments: 50,
        }
    }
}

/// Discovery failures. Individual probe failures never surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// No routable instance of the broker.
    #[error("No available instance of broker {0}")]
    BrokerUnavailable(String),

    /// Empty comparison request.
    #[error("At least one broker is required for capability comparison")]
    NoBrokers,
}

/// Capability discovery with a per-broker profile cache.
pub struct CapabilityDiscoveryService {
    config: DiscoveryConfig,
    registry: Arc<BrokerRegistry>,
    cache: RwLock<HashMap<String, BrokerCapabilityProfile>>,
}

impl std::fmt::Debug for CapabilityDiscoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityDiscoveryService")
            .field("config", &self.config)
            .field("cached", &self.cache.read().len())
            .finish_non_exhaustive()
    }
}

impl CapabilityDiscoveryService {
    /// Create a discovery service over the registry's instances.
    #[must_use]
    pub fn new(config: DiscoveryConfig, registry: Arc<BrokerRegistry>) -> Self {
        Self {
            config,
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Discover a registered broker's profile, serving a fresh cached
    /// profile unless `force_refresh` is set.
    ///
    /// # Errors
    ///
    /// Returns `BrokerUnavailable` if the broker has no routable instance
    /// and nothing usable is cached.
    pub async fn discover(
        &self,
        broker: &str,
        strategy: TestingStrategy,
        force_refresh: bool,
    ) -> Result<BrokerCapabilityProfile, DiscoveryError> {
        if !force_refresh && let Some(profile) = self.cached_profile(broker) {
            tracing::debug!(broker, "Serving cached capability profile");
            return Ok(profile);
        }

        let adapter = self
            .registry
            .adapter_for(broker)
            .ok_or_else(|| DiscoveryError::BrokerUnavailable(broker.to_string()))?;

        let mut profile = self.discover_with(adapter.as_ref(), strategy).await;
        // Keyed by registry name, which may differ from the descriptor name.
        profile.broker = broker.to_string();
        self.cache.write().insert(broker.to_string(), profile.clone());
        Ok(profile)
    }

    /// Build a profile from an adapter without touching the cache.
    pub async fn discover_with(
        &self,
        adapter: &dyn BrokerAdapter,
        strategy: TestingStrategy,
    ) -> BrokerCapabilityProfile {
        let descriptor = adapter.descriptor();
        let started = std::time::Instant::now();

        let (results, instruments) = match strategy {
            TestingStrategy::Static => (self.static_results(adapter), self.static_instruments(adapter)),
            TestingStrategy::Dynamic => {
                let results = self.dynamic_results(adapter).await;
                (results, self.probe_instruments(adapter).await)
            }
            TestingStrategy::Synthetic => {
                tracing::debug!(
                    broker = %descriptor.name,
                    "Synthetic order testing not available, using static capabilities"
                );
                (self.static_results(adapter), self.static_instruments(adapter))
            }
        };

        let failed_probes = results.iter().filter(|r| r.error.is_some()).count();
        let profile = BrokerCapabilityProfile::assemble(descriptor, strategy, results, instruments);
        tracing::info!(
            broker = %profile.broker,
            strategy = %strategy,
            capabilities = profile.capabilities.len(),
            instruments = profile.instruments.len(),
            failed_probes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Capability discovery complete"
        );
        profile
    }

    fn static_results(&self, adapter: &dyn BrokerAdapter) -> Vec<CapabilityTestResult> {
        let descriptor = adapter.descriptor();
        BrokerCapability::ALL
            .iter()
            .map(|cap| CapabilityTestResult::declared(*cap, descriptor.supports(*cap)))
            .collect()
    }

    fn static_instruments(&self, adapter: &dyn BrokerAdapter) -> Vec<InstrumentProfile> {
        adapter
            .descriptor()
            .supported_instruments
            .iter()
            .take(self.config.max_instruments)
            .map(InstrumentProfile::unprobed)
            .collect()
    }

    /// Static baseline overridden by every live probe result.
    async fn dynamic_results(&self, adapter: &dyn BrokerAdapter) -> Vec<CapabilityTestResult> {
        let descriptor = adapter.descriptor();
        let instrument = probes::probe_instrument(descriptor);
        let budget = self.config.probe_timeout;

        let mut probed = probes::probe_order_types(adapter, &instrument);
        probed.push(probes::probe_fractional_units(adapter, &instrument));

        let (streaming, accounts, margin, positions, historical) = tokio::join!(
            probes::probe_streaming(
                adapter,
                &instrument,
                self.config.stream_sample_ticks,
                self.config.stream_timeout
            ),
            probes::probe_accounts(adapter, budget),
            probes::probe_margin(adapter, descriptor.supports(BrokerCapability::MarginTrading), budget),
            probes::probe_positions(adapter, descriptor.supports(BrokerCapability::Hedging), budget),
            probes::probe_historical(adapter, &instrument, budget),
        );
        probed.extend([streaming, accounts, margin, positions, historical]);

        for result in probed.iter().filter(|r| r.error.is_some()) {
            tracing::warn!(
                broker = %descriptor.name,
                capability = %result.capability,
                error = result.error.as_deref().unwrap_or_default(),
                "Capability probe failed"
            );
        }

        let mut merged: BTreeMap<BrokerCapability, CapabilityTestResult> = self
            .static_results(adapter)
            .into_iter()
            .map(|r| (r.capability, r))
            .collect();
        for result in probed {
            merged.insert(result.capability, result);
        }
        merged.into_values().collect()
    }

    async fn probe_instruments(&self, adapter: &dyn BrokerAdapter) -> Vec<InstrumentProfile> {
        let budget = self.config.probe_timeout;
        join_all(
            adapter
                .descriptor()
                .supported_instruments
                .iter()
                .take(self.config.max_instruments)
                .map(|symbol| probes::probe_instrument_price(adapter, symbol, budget)),
        )
        .await
    }

    /// Fresh cached profile of a broker.
    #[must_use]
    pub fn cached_profile(&self, broker: &str) -> Option<BrokerCapabilityProfile> {
        let now = Utc::now();
        self.cache
            .read()
            .get(broker)
            .filter(|p| !p.is_stale(now, self.config.cache_ttl))
            .cloned()
    }

    /// Drop a broker's cached profile.
    pub fn invalidate(&self, broker: &str) -> bool {
        self.cache.write().remove(broker).is_some()
    }

    /// Discover each broker and build the capability matrix.
    ///
    /// # Errors
    ///
    /// Returns `NoBrokers` for an empty list, otherwise the first discovery
    /// error.
    pub async fn compare_broker_capabilities(
        &self,
        brokers: &[String],
        strategy: TestingStrategy,
        force_refresh: bool,
    ) -> Result<CapabilityComparison, DiscoveryError> {
        if brokers.is_empty() {
            return Err(DiscoveryError::NoBrokers);
        }
        let mut profiles = Vec::with_capacity(brokers.len());
        for broker in brokers {
            profiles.push(self.discover(broker, strategy, force_refresh).await?);
        }
        Ok(CapabilityComparison::build(&profiles))
    }
}
