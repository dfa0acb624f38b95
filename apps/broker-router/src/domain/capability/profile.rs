//! Discovered capability profiles and cross-broker comparison.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    BrokerCapability, BrokerDescriptor, CommissionStructure, MarginStructure, RateLimits,
    TradingLimits,
};
use crate::domain::market_data::InstrumentClass;
use crate::domain::order_execution::{OrderType, TimeInForce};

/// How a capability was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestingStrategy {
    /// Read from the adapter's declared descriptor. No I/O.
    #[default]
    Static,
    /// Side-effect-free probes against the live broker.
    Dynamic,
    /// Real test orders. Falls back to static.
    Synthetic,
}

impl TestingStrategy {
    /// Confidence attached to a result from this strategy.
    #[must_use]
    pub const fn base_confidence(&self) -> f64 {
        match self {
            Self::Static => 0.9,
            Self::Dynamic => 0.8,
            Self::Synthetic => 0.95,
        }
    }
}

impl fmt::Display for TestingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Synthetic => "synthetic",
        };
        f.write_str(s)
    }
}

/// Outcome of testing one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityTestResult {
    /// Capability tested.
    pub capability: BrokerCapability,
    /// Whether the broker supports it.
    pub supported: bool,
    /// Strategy that produced the result.
    pub strategy: TestingStrategy,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Probe duration in milliseconds.
    pub latency_ms: Option<f64>,
    /// Probe error, when the probe failed.
    pub error: Option<String>,
    /// Probe-specific observations.
    #[serde(default)]
    pub details: BTreeMap<String, String>,
    /// Time of the test.
    pub tested_at: DateTime<Utc>,
}

impl CapabilityTestResult {
    /// Result read from a descriptor.
    #[must_use]
    pub fn declared(capability: BrokerCapability, supported: bool) -> Self {
        Self {
            capability,
            supported,
            strategy: TestingStrategy::Static,
            confidence: TestingStrategy::Static.base_confidence(),
            latency_ms: None,
            error: None,
            details: BTreeMap::new(),
            tested_at: Utc::now(),
        }
    }

    /// Result of a live probe.
    #[must_use]
    pub fn probed(capability: BrokerCapability, supported: bool, latency_ms: f64) -> Self {
        Self {
            strategy: TestingStrategy::Dynamic,
            confidence: TestingStrategy::Dynamic.base_confidence(),
            latency_ms: Some(latency_ms),
            ..Self::declared(capability, supported)
        }
    }

    /// A probe that failed; recorded as unsupported.
    #[must_use]
    pub fn probe_failed(capability: BrokerCapability, error: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::probed(capability, false, latency_ms)
        }
    }

    /// Override the confidence.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Attach an observation.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// What discovery learned about one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentProfile {
    /// Symbol.
    pub symbol: String,
    /// Class inferred from the symbol shape.
    pub class: InstrumentClass,
    /// Trading status; unknown without a live probe.
    pub tradeable: Option<bool>,
    /// Last bid.
    pub bid: Option<Decimal>,
    /// Last ask.
    pub ask: Option<Decimal>,
    /// Spread in basis points of mid.
    pub spread_bps: Option<f64>,
    /// Probe error.
    pub error: Option<String>,
}

impl InstrumentProfile {
    /// Profile without live data.
    #[must_use]
    pub fn unprobed(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self {
            class: InstrumentClass::infer(&symbol),
            symbol,
            tradeable: None,
            bid: None,
            ask: None,
            spread_bps: None,
            error: None,
        }
    }
}

/// Everything known about what a broker can do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerCapabilityProfile {
    /// Registry key.
    pub broker: String,
    /// Human-readable name.
    pub display_name: String,
    /// API version.
    pub api_version: String,
    /// Strategy requested for this profile.
    pub strategy: TestingStrategy,
    /// Capabilities found supported.
    pub capabilities: BTreeSet<BrokerCapability>,
    /// Discovered instruments (capped).
    pub instruments: Vec<InstrumentProfile>,
    /// Total instruments the broker declares.
    pub declared_instrument_count: usize,
    /// Accepted order types.
    pub order_types: BTreeSet<OrderType>,
    /// Accepted time-in-force values.
    pub time_in_force: BTreeSet<TimeInForce>,
    /// Size bounds.
    pub trading_limits: TradingLimits,
    /// Commission model.
    pub commission: CommissionStructure,
    /// Margin model.
    pub margin: MarginStructure,
    /// Rate limits.
    pub rate_limits: RateLimits,
    /// Individual test results that produced the profile.
    pub test_results: Vec<CapabilityTestResult>,
    /// Time of discovery.
    pub discovered_at: DateTime<Utc>,
}

impl BrokerCapabilityProfile {
    /// Assemble a profile from a descriptor and test results. Supported
    /// capabilities are exactly the results marked supported.
    #[must_use]
    pub fn assemble(
        descriptor: &BrokerDescriptor,
        strategy: TestingStrategy,
        test_results: Vec<CapabilityTestResult>,
        instruments: Vec<InstrumentProfile>,
    ) -> Self {
        Self {
            broker: descriptor.name.clone(),
            display_name: descriptor.display_name.clone(),
            api_version: descriptor.api_version.clone(),
            strategy,
            capabilities: test_results
                .iter()
                .filter(|r| r.supported)
                .map(|r| r.capability)
                .collect(),
            instruments,
            declared_instrument_count: descriptor.supported_instruments.len(),
            order_types: descriptor.supported_order_types.clone(),
            time_in_force: descriptor.supported_time_in_force.clone(),
            trading_limits: descriptor.trading_limits.clone(),
            commission: descriptor.commission.clone(),
            margin: descriptor.margin.clone(),
            rate_limits: descriptor.rate_limits,
            test_results,
            discovered_at: Utc::now(),
        }
    }

    /// Returns true if the capability was found supported.
    #[must_use]
    pub fn supports(&self, capability: BrokerCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Returns true if the profile is older than `max_age`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: TimeDelta) -> bool {
        now - self.discovered_at > max_age
    }
}

/// Capability × broker matrix for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityComparison {
    /// Brokers compared, in request order.
    pub brokers: Vec<String>,
    /// For every capability, whether each broker supports it.
    pub matrix: BTreeMap<BrokerCapability, BTreeMap<String, bool>>,
    /// Supported-capability count per broker.
    pub totals: BTreeMap<String, usize>,
    /// Capabilities every broker supports.
    pub common_capabilities: BTreeSet<BrokerCapability>,
    /// Capabilities only one broker supports.
    pub unique_capabilities: BTreeMap<String, BTreeSet<BrokerCapability>>,
    /// Time of comparison.
    pub generated_at: DateTime<Utc>,
}

impl CapabilityComparison {
    /// Build the comparison from profiles.
    #[must_use]
    pub fn build(profiles: &[BrokerCapabilityProfile]) -> Self {
        let brokers: Vec<String> = profiles.iter().map(|p| p.broker.clone()).collect();

        let matrix: BTreeMap<_, BTreeMap<String, bool>> = BrokerCapability::ALL
            .iter()
            .map(|cap| {
                let row = profiles
                    .iter()
                    .map(|p| (p.broker.clone(), p.supports(*cap)))
                    .collect();
                (*cap, row)
            })
            .collect();

        let totals = profiles
            .iter()
            .map(|p| (p.broker.clone(), p.capabilities.len()))
            .collect();

        let common_capabilities = if profiles.is_empty() {
            BTreeSet::new()
        } else {
            BrokerCapability::ALL
                .iter()
                .filter(|cap| profiles.iter().all(|p| p.supports(**cap)))
                .copied()
                .collect()
        };

        let unique_capabilities = profiles
            .iter()
            .map(|p| {
                let unique = p
                    .capabilities
                    .iter()
                    .filter(|cap| {
                        profiles
                            .iter()
                            .filter(|other| other.broker != p.broker)
                            .all(|other| !other.supports(**cap))
                    })
                    .copied()
                    .collect();
                (p.broker.clone(), unique)
            })
            .collect();

        Self {
            brokers,
            matrix,
            totals,
            common_capabilities,
            unique_capabilities,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, caps: &[BrokerCapability]) -> BrokerCapabilityProfile {
        let descriptor = BrokerDescriptor::new(name, name, "v1");
        let results = BrokerCapability::ALL
            .iter()
            .map(|c| CapabilityTestResult::declared(*c, caps.contains(c)))
            .collect();
        BrokerCapabilityProfile::assemble(&descriptor, TestingStrategy::Static, results, Vec::new())
    }

    #[test]
    fn comparison_matrix_common_and_unique() {
        let a = profile("a", &[BrokerCapability::MarketOrders, BrokerCapability::Hedging]);
        let b = profile("b", &[BrokerCapability::MarketOrders, BrokerCapability::TrailingStops]);
        let cmp = CapabilityComparison::build(&[a, b]);

        assert_eq!(cmp.brokers, vec!["a", "b"]);
        assert!(cmp.matrix[&BrokerCapability::Hedging]["a"]);
        assert!(!cmp.matrix[&BrokerCapability::Hedging]["b"]);
        assert_eq!(cmp.totals["a"], 2);
        assert_eq!(
            cmp.common_capabilities,
            BTreeSet::from([BrokerCapability::MarketOrders])
        );
        assert_eq!(
            cmp.unique_capabilities["b"],
            BTreeSet::from([BrokerCapability::TrailingStops])
        );
    }

    #[test]
    fn empty_comparison_has_no_common_capabilities() {
        let cmp = CapabilityComparison::build(&[]);
        assert!(cmp.common_capabilities.is_empty());
        assert_eq!(cmp.matrix.len(), BrokerCapability::ALL.len());
    }

    #[test]
    fn staleness() {
        let p = profile("a", &[]);
        assert!(!p.is_stale(p.discovered_at + TimeDelta::hours(23), TimeDelta::hours(24)));
        assert!(p.is_stale(p.discovered_at + TimeDelta::hours(25), TimeDelta::hours(24)));
    }

    #[test]
    fn probe_failure_is_unsupported() {
        let r = CapabilityTestResult::probe_failed(BrokerCapability::RealTimeStreaming, "timeout", 30_000.0);
        assert!(!r.supported);
        assert_eq!(r.strategy, TestingStrategy::Dynamic);
        assert_eq!(r.error.as_deref(), Some("timeout"));
    }
}
