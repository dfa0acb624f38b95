//! Performance Metrics and Broker Comparison
//!
//! [`PerformanceMetricsCollector`] accumulates samples; [`ComparisonEngine`]
//! reduces them into benchmarks, rankings and recommendations.

mod collector;

pub use collector::{MetricsCollectorConfig, PerformanceMetricsCollector};

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use thiserror::Error;

use crate::domain::performance::{BrokerBenchmark, BrokerComparison, HealthThresholds};

/// Comparison failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComparisonError {
    /// Empty broker list.
    #[error("At least one broker is required for comparison")]
    NoBrokers,

    /// Broker neither registered nor sampled.
    #[error("Unknown broker: {0}")]
    UnknownBroker(String),

    /// Zero or negative period.
    #[error("Benchmark period must be positive")]
    InvalidPeriod,
}

/// Produces benchmarks and comparisons from collected samples.
#[derive(Debug, Clone)]
pub struct ComparisonEngine {
    collector: Arc<PerformanceMetricsCollector>,
    thresholds: HealthThresholds,
}

impl ComparisonEngine {
    /// Create an engine over a collector.
    #[must_use]
    pub const fn new(collector: Arc<PerformanceMetricsCollector>, thresholds: HealthThresholds) -> Self {
        Self {
            collector,
            thresholds,
        }
    }

    /// Warning thresholds.
    #[must_use]
    pub const fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Benchmark one broker over the last `period`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPeriod` for a non-positive period and `UnknownBroker`
    /// if the broker is neither registered nor sampled.
    pub fn generate_broker_benchmark(
        &self,
        broker: &str,
        period: TimeDelta,
    ) -> Result<BrokerBenchmark, ComparisonError> {
        if period <= TimeDelta::zero() {
            return Err(ComparisonError::InvalidPeriod);
        }
        if !self.collector.knows(broker) {
            return Err(ComparisonError::UnknownBroker(broker.to_string()));
        }
        let to = Utc::now();
        let from = to - period;
        let samples = self.collector.history_between(broker, from, to);
        Ok(BrokerBenchmark::from_samples(broker, &samples, from, to))
    }

    /// Benchmark and rank several brokers over the last `period`.
    ///
    /// # Errors
    ///
    /// Returns `NoBrokers` for an empty list, otherwise the first benchmark
    /// error.
    pub fn compare_brokers(
        &self,
        brokers: &[String],
        period: TimeDelta,
    ) -> Result<BrokerComparison, ComparisonError> {
        if brokers.is_empty() {
            return Err(ComparisonError::NoBrokers);
        }
        if period <= TimeDelta::zero() {
            return Err(ComparisonError::InvalidPeriod);
        }

        let to = Utc::now();
        let from = to - period;
        let mut benchmarks = Vec::with_capacity(brokers.len());
        for broker in brokers {
            if !self.collector.knows(broker) {
                return Err(ComparisonError::UnknownBroker(broker.clone()));
            }
            let samples = self.collector.history_between(broker, from, to);
            benchmarks.push(BrokerBenchmark::from_samples(broker.as_str(), &samples, from, to));
        }

        let comparison = BrokerComparison::from_benchmarks(benchmarks, from, to, &self.thresholds);
        tracing::info!(
            comparison_id = %comparison.comparison_id,
            brokers = brokers.len(),
            winner = comparison.winner.as_deref().unwrap_or("none"),
            "Broker comparison generated"
        );
        Ok(comparison)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::registry::{BrokerRegistry, RegistryConfig};
    use crate::domain::performance::{PerformanceSample, RankingDimension};

    fn engine_with(samples: &[(&str, f64, bool)]) -> ComparisonEngine {
        let registry = Arc::new(BrokerRegistry::new(RegistryConfig::default()));
        let collector = Arc::new(PerformanceMetricsCollector::new(
            MetricsCollectorConfig::default(),
            registry,
        ));
        let at = Utc::now() - TimeDelta::minutes(5);
        for (broker, latency_ms, success) in samples {
            collector.record_sample(
                broker,
                PerformanceSample::Execution {
                    timestamp: at,
                    latency_ms: *latency_ms,
                    success: *success,
                    commission_bps: None,
                    slippage_bps: None,
                    error_code: None,
                },
            );
        }
        ComparisonEngine::new(collector, HealthThresholds::default())
    }

    #[test]
    fn faster_broker_ranks_first() {
        let mut samples = Vec::new();
        for _ in 0..30 {
            samples.push(("a", 40.0, true));
            samples.push(("b", 120.0, true));
        }
        let engine = engine_with(&samples);
        let cmp = engine
            .compare_brokers(&["b".to_string(), "a".to_string()], TimeDelta::hours(1))
            .unwrap();
        assert_eq!(cmp.rankings[&RankingDimension::Latency][0], "a");
        assert_eq!(cmp.winner.as_deref(), Some("a"));
        assert_eq!(cmp.benchmarks["a"].total_orders, 30);
    }

    #[test]
    fn comparison_errors() {
        let engine = engine_with(&[("a", 10.0, true)]);
        assert_eq!(
            engine.compare_brokers(&[], TimeDelta::hours(1)).unwrap_err(),
            ComparisonError::NoBrokers
        );
        assert_eq!(
            engine
                .compare_brokers(&["ghost".to_string()], TimeDelta::hours(1))
                .unwrap_err(),
            ComparisonError::UnknownBroker("ghost".to_string())
        );
        assert_eq!(
            engine.generate_broker_benchmark("a", TimeDelta::zero()).unwrap_err(),
            ComparisonError::InvalidPeriod
        );
        assert_eq!(
            engine
                .generate_broker_benchmark("a", TimeDelta::hours(1))
                .unwrap()
                .total_orders,
            1
        );
    }
}
