//! A/B test analysis results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::{RoutingStrategy, TestMetric, TestStatus};
use crate::domain::shared::TestId;
use crate::domain::statistics::SampleSummary;

/// Latency at or above which the latency component scores zero.
pub const LATENCY_CAP_MS: f64 = 5_000.0;

/// Composite performance score in `[0, 1]`:
/// 0.4 × success rate + 0.3 × inverse latency + 0.3 × (1 − error rate).
///
/// Latency is normalized against [`LATENCY_CAP_MS`].
#[must_use]
pub fn performance_score(success_rate: f64, mean_latency_ms: f64, error_rate: f64) -> f64 {
    let latency = 1.0 - mean_latency_ms.clamp(0.0, LATENCY_CAP_MS) / LATENCY_CAP_MS;
    0.4 * success_rate.clamp(0.0, 1.0) + 0.3 * latency + 0.3 * (1.0 - error_rate.clamp(0.0, 1.0))
}

/// Per-broker aggregates of a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerTestMetrics {
    /// Broker name.
    pub broker: String,
    /// Executions routed to the broker.
    pub sample_size: usize,
    /// Successful executions.
    pub success_count: usize,
    /// Fraction of successes.
    pub success_rate: f64,
    /// Fraction of failures.
    pub error_rate: f64,
    /// Mean placement latency in milliseconds.
    pub mean_latency_ms: f64,
    /// [`performance_score`] of the above.
    pub composite_score: f64,
    /// Summary per tracked metric with at least one observation.
    pub metrics: BTreeMap<TestMetric, SampleSummary>,
}

/// Pairwise significance test for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseSignificance {
    /// First broker.
    pub broker_a: String,
    /// Second broker.
    pub broker_b: String,
    /// Metric compared.
    pub metric: TestMetric,
    /// Mean of the first broker.
    pub mean_a: f64,
    /// Mean of the second broker.
    pub mean_b: f64,
    /// Welch t statistic.
    pub t_statistic: f64,
    /// Welch–Satterthwaite degrees of freedom.
    pub degrees_of_freedom: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// `p_value <= 1 - confidence_level`.
    pub significant: bool,
}

impl PairwiseSignificance {
    /// Returns true if the pair involves the broker.
    #[must_use]
    pub fn involves(&self, broker: &str) -> bool {
        self.broker_a == broker || self.broker_b == broker
    }
}

/// Outcome of analysing a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ABTestResults {
    /// Test ID.
    pub test_id: TestId,
    /// Test name.
    pub name: String,
    /// Status at analysis time.
    pub status: TestStatus,
    /// Routing strategy.
    pub strategy: RoutingStrategy,
    /// Start of the window.
    pub start_time: DateTime<Utc>,
    /// End of the window.
    pub end_time: Option<DateTime<Utc>>,
    /// Executions recorded for the test.
    pub total_executions: usize,
    /// Aggregates per broker.
    pub metrics: BTreeMap<String, BrokerTestMetrics>,
    /// Pairwise tests between brokers that met the minimum sample size.
    pub statistical_significance: Vec<PairwiseSignificance>,
    /// Significantly best broker, if any.
    pub winner: Option<String>,
    /// Confidence level used.
    pub confidence_level: f64,
    /// Human-readable findings.
    pub recommendations: Vec<String>,
    /// Time of analysis.
    pub analyzed_at: DateTime<Utc>,
}
