//! Performance samples, benchmarks and broker comparisons.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scoring::{
    HealthThresholds, cost_score, overall_score, reliability_score, speed_score,
};
use crate::domain::errors::StandardErrorCode;
use crate::domain::order_execution::OrderExecution;
use crate::domain::statistics::{mean, percentile};

/// One measurement in a broker's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PerformanceSample {
    /// Timed health check.
    HealthCheck {
        /// Time of the sample.
        timestamp: DateTime<Utc>,
        /// Round-trip time in milliseconds.
        latency_ms: f64,
        /// Whether the broker reported healthy within the timeout.
        available: bool,
    },
    /// Timed price fetch.
    PriceFeed {
        /// Time of the sample.
        timestamp: DateTime<Utc>,
        /// Round-trip time in milliseconds.
        latency_ms: f64,
        /// Whether a price came back within the timeout.
        success: bool,
        /// Quoted spread in basis points.
        spread_bps: Option<f64>,
    },
    /// Routed order.
    Execution {
        /// Time of the sample.
        timestamp: DateTime<Utc>,
        /// Placement latency in milliseconds.
        latency_ms: f64,
        /// Whether placement succeeded.
        success: bool,
        /// Commission in basis points of notional.
        commission_bps: Option<f64>,
        /// Adverse fill distance in basis points.
        slippage_bps: Option<f64>,
        /// Standard code of the failure.
        error_code: Option<StandardErrorCode>,
    },
    /// Rolling order statistics over the collector's window.
    Rolling {
        /// Time of the sample.
        timestamp: DateTime<Utc>,
        /// Orders in the window.
        orders: usize,
        /// Fraction of successful orders.
        success_rate: f64,
        /// Fraction of failed orders.
        error_rate: f64,
        /// Orders per minute.
        throughput_per_minute: f64,
    },
}

impl PerformanceSample {
    /// Time of the sample.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::HealthCheck { timestamp, .. }
            | Self::PriceFeed { timestamp, .. }
            | Self::Execution { timestamp, .. }
            | Self::Rolling { timestamp, .. } => *timestamp,
        }
    }

    /// Execution sample from a recorded order.
    #[must_use]
    pub fn from_execution(execution: &OrderExecution) -> Self {
        Self::Execution {
            timestamp: execution.executed_at,
            latency_ms: execution.latency_ms,
            success: execution.success,
            commission_bps: execution.commission_bps(),
            slippage_bps: execution.slippage_bps(),
            error_code: execution.error_code,
        }
    }
}

/// Latency distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Observations.
    pub samples: usize,
    /// Mean.
    pub mean_ms: f64,
    /// Median.
    pub p50_ms: f64,
    /// 95th percentile.
    pub p95_ms: f64,
    /// 99th percentile.
    pub p99_ms: f64,
    /// Minimum.
    pub min_ms: f64,
    /// Maximum.
    pub max_ms: f64,
}

impl LatencyStats {
    /// Summarize latencies; `None` when empty.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        Some(Self {
            samples: values.len(),
            mean_ms: mean(values)?,
            p50_ms: percentile(values, 50.0)?,
            p95_ms: percentile(values, 95.0)?,
            p99_ms: percentile(values, 99.0)?,
            min_ms: values.iter().copied().fold(f64::INFINITY, f64::min),
            max_ms: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

/// One broker's aggregated performance over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerBenchmark {
    /// Broker name.
    pub broker: String,
    /// Window start.
    pub period_start: DateTime<Utc>,
    /// Window end.
    pub period_end: DateTime<Utc>,
    /// Samples inside the window.
    pub sample_count: usize,
    /// Order placement latency.
    pub order_latency: Option<LatencyStats>,
    /// Health-check latency.
    pub health_latency: Option<LatencyStats>,
    /// Price-fetch latency.
    pub price_feed_latency: Option<LatencyStats>,
    /// Orders in the window.
    pub total_orders: usize,
    /// Successful orders.
    pub successful_orders: usize,
    /// Fraction of successful orders; 1 without orders.
    pub success_rate: f64,
    /// Fraction of failed orders; 0 without orders.
    pub error_rate: f64,
    /// Orders per minute over the window.
    pub throughput_per_minute: f64,
    /// Share of available health checks; 100 without checks.
    pub uptime_percent: f64,
    /// Mean commission in bps.
    pub avg_commission_bps: Option<f64>,
    /// Mean quoted spread in bps.
    pub avg_spread_bps: Option<f64>,
    /// Mean slippage in bps.
    pub avg_slippage_bps: Option<f64>,
    /// Spread + slippage + commission, when any is known.
    pub total_cost_bps: Option<f64>,
    /// 0–100.
    pub speed_score: f64,
    /// 0–100.
    pub reliability_score: f64,
    /// 0–100.
    pub cost_score: f64,
    /// 0–100.
    pub overall_score: f64,
}

impl BrokerBenchmark {
    /// Reduce the samples inside `[from, to]` into a benchmark.
    #[must_use]
    pub fn from_samples<'a>(
        broker: impl Into<String>,
        samples: impl IntoIterator<Item = &'a PerformanceSample>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Self {
        let mut order_latencies = Vec::new();
        let mut health_latencies = Vec::new();
        let mut price_latencies = Vec::new();
        let mut commissions = Vec::new();
        let mut spreads = Vec::new();
        let mut slippages = Vec::new();
        let (mut sample_count, mut successful_orders) = (0, 0);
        let (mut health_checks, mut available_checks) = (0usize, 0usize);

        for sample in samples {
            let ts = sample.timestamp();
            if ts < from || ts > to {
                continue;
            }
            sample_count += 1;
            match sample {
                PerformanceSample::HealthCheck {
                    latency_ms,
                    available,
                    ..
                } => {
                    health_checks += 1;
                    if *available {
                        available_checks += 1;
                        health_latencies.push(*latency_ms);
                    }
                }
                PerformanceSample::PriceFeed {
                    latency_ms,
                    success,
                    spread_bps,
                    ..
                } => {
                    if *success {
                        price_latencies.push(*latency_ms);
                    }
                    spreads.extend(*spread_bps);
                }
                PerformanceSample::Execution {
                    latency_ms,
                    success,
                    commission_bps,
                    slippage_bps,
                    ..
                } => {
                    order_latencies.push(*latency_ms);
                    if *success {
                        successful_orders += 1;
                    }
                    commissions.extend(*commission_bps);
                    slippages.extend(*slippage_bps);
                }
                PerformanceSample::Rolling { .. } => {}
            }
        }

        let total_orders = order_latencies.len();
        let (success_rate, error_rate) = if total_orders == 0 {
            (1.0, 0.0)
        } else {
            let rate = successful_orders as f64 / total_orders as f64;
            (rate, 1.0 - rate)
        };
        let minutes = ((to - from).num_milliseconds() as f64 / 60_000.0).max(1.0 / 60.0);
        let uptime_percent = if health_checks == 0 {
            100.0
        } else {
            available_checks as f64 / health_checks as f64 * 100.0
        };

        let avg_commission_bps = mean(&commissions);
        let avg_spread_bps = mean(&spreads);
        let avg_slippage_bps = mean(&slippages);
        let total_cost_bps = match (avg_commission_bps, avg_spread_bps, avg_slippage_bps) {
            (None, None, None) => None,
            (c, s, sl) => Some(c.unwrap_or(0.0) + s.unwrap_or(0.0) + sl.unwrap_or(0.0).max(0.0)),
        };

        let order_latency = LatencyStats::from_values(&order_latencies);
        let health_latency = LatencyStats::from_values(&health_latencies);
        let mean_latency = order_latency.or(health_latency).map(|l| l.mean_ms);

        let speed = speed_score(mean_latency);
        let reliability = reliability_score(success_rate, uptime_percent, error_rate);
        let cost = cost_score(total_cost_bps);

        Self {
            broker: broker.into(),
            period_start: from,
            period_end: to,
            sample_count,
            order_latency,
            health_latency,
            price_feed_latency: LatencyStats::from_values(&price_latencies),
            total_orders,
            successful_orders,
            success_rate,
            error_rate,
            throughput_per_minute: total_orders as f64 / minutes,
            uptime_percent,
            avg_commission_bps,
            avg_spread_bps,
            avg_slippage_bps,
            total_cost_bps,
            speed_score: speed,
            reliability_score: reliability,
            cost_score: cost,
            overall_score: overall_score(speed, reliability, cost),
        }
    }

    /// Mean order latency, falling back to health-check latency.
    #[must_use]
    pub fn mean_latency_ms(&self) -> Option<f64> {
        self.order_latency.or(self.health_latency).map(|l| l.mean_ms)
    }
}

/// Dimension brokers are ranked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingDimension {
    /// Lowest mean latency first.
    Latency,
    /// Highest reliability score first.
    Reliability,
    /// Highest cost score first.
    Cost,
    /// Highest throughput first.
    Throughput,
    /// Highest overall score first.
    Overall,
}

impl RankingDimension {
    /// Every dimension.
    pub const ALL: [Self; 5] = [
        Self::Latency,
        Self::Reliability,
        Self::Cost,
        Self::Throughput,
        Self::Overall,
    ];
}

impl fmt::Display for RankingDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Latency => "latency",
            Self::Reliability => "reliability",
            Self::Cost => "cost",
            Self::Throughput => "throughput",
            Self::Overall => "overall",
        };
        f.write_str(s)
    }
}

/// Benchmarks of several brokers with rankings and a winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerComparison {
    /// Comparison ID.
    pub comparison_id: String,
    /// Brokers compared, in request order.
    pub brokers: Vec<String>,
    /// Window start.
    pub period_start: DateTime<Utc>,
    /// Window end.
    pub period_end: DateTime<Utc>,
    /// Benchmark per broker.
    pub benchmarks: BTreeMap<String, BrokerBenchmark>,
    /// Broker order per dimension, best first.
    pub rankings: BTreeMap<RankingDimension, Vec<String>>,
    /// Highest overall score.
    pub winner: Option<String>,
    /// Human-readable findings.
    pub recommendations: Vec<String>,
    /// Time of comparison.
    pub generated_at: DateTime<Utc>,
}

/// Lower mean latency first (unknown last), then name.
fn tie_break(a: &BrokerBenchmark, b: &BrokerBenchmark) -> Ordering {
    let latency = match (a.mean_latency_ms(), b.mean_latency_ms()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    latency.then_with(|| a.broker.cmp(&b.broker))
}

fn rank(benchmarks: &[BrokerBenchmark], dimension: RankingDimension) -> Vec<String> {
    let mut ordered: Vec<&BrokerBenchmark> = benchmarks.iter().collect();
    ordered.sort_by(|a, b| {
        let primary = match dimension {
            RankingDimension::Latency => Ordering::Equal,
            RankingDimension::Reliability => b.reliability_score.total_cmp(&a.reliability_score),
            RankingDimension::Cost => b.cost_score.total_cmp(&a.cost_score),
            RankingDimension::Throughput => {
                b.throughput_per_minute.total_cmp(&a.throughput_per_minute)
            }
            RankingDimension::Overall => b.overall_score.total_cmp(&a.overall_score),
        };
        primary.then_with(|| tie_break(a, b))
    });
    ordered.into_iter().map(|b| b.broker.clone()).collect()
}

impl BrokerComparison {
    /// Rank benchmarks and derive the winner and recommendations.
    #[must_use]
    pub fn from_benchmarks(
        benchmarks: Vec<BrokerBenchmark>,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        thresholds: &HealthThresholds,
    ) -> Self {
        let rankings: BTreeMap<RankingDimension, Vec<String>> = RankingDimension::ALL
            .iter()
            .map(|d| (*d, rank(&benchmarks, *d)))
            .collect();
        let winner = rankings
            .get(&RankingDimension::Overall)
            .and_then(|r| r.first())
            .cloned();

        let by_name: BTreeMap<String, BrokerBenchmark> = benchmarks
            .iter()
            .map(|b| (b.broker.clone(), b.clone()))
            .collect();
        let recommendations = recommendations(&by_name, &rankings, winner.as_deref(), thresholds);

        Self {
            comparison_id: uuid::Uuid::new_v4().to_string(),
            brokers: benchmarks.iter().map(|b| b.broker.clone()).collect(),
            period_start,
            period_end,
            benchmarks: by_name,
            rankings,
            winner,
            recommendations,
            generated_at: Utc::now(),
        }
    }
}

fn recommendations(
    benchmarks: &BTreeMap<String, BrokerBenchmark>,
    rankings: &BTreeMap<RankingDimension, Vec<String>>,
    winner: Option<&str>,
    thresholds: &HealthThresholds,
) -> Vec<String> {
    let leader = |d: RankingDimension| {
        rankings
            .get(&d)
            .and_then(|r| r.first())
            .and_then(|name| benchmarks.get(name))
    };
    let mut out = Vec::new();

    if let Some(w) = winner.and_then(|w| benchmarks.get(w)) {
        out.push(format!(
            "Recommended broker: {} (overall score {:.1})",
            w.broker, w.overall_score
        ));
    }
    if benchmarks.len() > 1 {
        if let Some(fastest) = leader(RankingDimension::Latency)
            && let Some(latency) = fastest.mean_latency_ms()
        {
            out.push(format!(
                "Fastest: {} (mean latency {latency:.1} ms)",
                fastest.broker
            ));
        }
        if let Some(reliable) = leader(RankingDimension::Reliability) {
            out.push(format!(
                "Most reliable: {} (reliability score {:.1})",
                reliable.broker, reliable.reliability_score
            ));
        }
        if let Some(cheapest) = leader(RankingDimension::Cost)
            && cheapest.total_cost_bps.is_some()
        {
            out.push(format!(
                "Most cost-effective: {} (cost score {:.1})",
                cheapest.broker, cheapest.cost_score
            ));
        }
    }
    for b in benchmarks.values() {
        let orders_seen = b.total_orders > 0;
        out.extend(thresholds.warnings(
            &b.broker,
            if orders_seen { b.success_rate } else { 1.0 },
            if orders_seen { b.error_rate } else { 0.0 },
            b.mean_latency_ms(),
            Some(b.uptime_percent),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn execution(at: DateTime<Utc>, latency_ms: f64, success: bool) -> PerformanceSample {
        PerformanceSample::Execution {
            timestamp: at,
            latency_ms,
            success,
            commission_bps: None,
            slippage_bps: None,
            error_code: None,
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let end = Utc::now();
        (end - TimeDelta::hours(1), end)
    }

    #[test]
    fn benchmark_aggregates_window() {
        let (from, to) = window();
        let mid = from + TimeDelta::minutes(30);
        let samples = vec![
            execution(mid, 100.0, true),
            execution(mid, 300.0, false),
            execution(from - TimeDelta::minutes(1), 9_999.0, false),
            PerformanceSample::HealthCheck {
                timestamp: mid,
                latency_ms: 20.0,
                available: true,
            },
            PerformanceSample::HealthCheck {
                timestamp: mid,
                latency_ms: 30_000.0,
                available: false,
            },
            PerformanceSample::PriceFeed {
                timestamp: mid,
                latency_ms: 15.0,
                success: true,
                spread_bps: Some(1.0),
            },
        ];

        let b = BrokerBenchmark::from_samples("a", &samples, from, to);
        assert_eq!(b.sample_count, 5);
        assert_eq!(b.total_orders, 2);
        assert!((b.success_rate - 0.5).abs() < 1e-12);
        assert!((b.uptime_percent - 50.0).abs() < 1e-12);
        assert!((b.mean_latency_ms().unwrap() - 200.0).abs() < 1e-12);
        assert_eq!(b.total_cost_bps, Some(1.0));
        assert!((b.throughput_per_minute - 2.0 / 60.0).abs() < 1e-9);
        assert!((b.cost_score - 95.0).abs() < 1e-9);
    }

    #[test]
    fn empty_benchmark_is_neutral() {
        let (from, to) = window();
        let b = BrokerBenchmark::from_samples("idle", &[], from, to);
        assert_eq!(b.total_orders, 0);
        assert_eq!(b.speed_score, 50.0);
        assert_eq!(b.cost_score, 50.0);
        assert!((b.reliability_score - 100.0).abs() < 1e-12);
    }

    #[test]
    fn lower_latency_ranks_first_and_wins_overall() {
        let (from, to) = window();
        let mid = from + TimeDelta::minutes(10);
        let fast: Vec<_> = (0..20).map(|_| execution(mid, 50.0, true)).collect();
        let slow: Vec<_> = (0..20).map(|_| execution(mid, 400.0, true)).collect();
        let comparison = BrokerComparison::from_benchmarks(
            vec![
                BrokerBenchmark::from_samples("b", &slow, from, to),
                BrokerBenchmark::from_samples("a", &fast, from, to),
            ],
            from,
            to,
            &HealthThresholds::default(),
        );

        assert_eq!(comparison.brokers, vec!["b", "a"]);
        assert_eq!(comparison.rankings[&RankingDimension::Latency], vec!["a", "b"]);
        assert_eq!(comparison.rankings[&RankingDimension::Overall], vec!["a", "b"]);
        assert_eq!(comparison.winner.as_deref(), Some("a"));
        assert!(comparison.recommendations[0].starts_with("Recommended broker: a"));
        assert!(comparison.recommendations.iter().any(|r| r.starts_with("Fastest: a")));
    }

    #[test]
    fn ties_break_on_name() {
        let (from, to) = window();
        let comparison = BrokerComparison::from_benchmarks(
            vec![
                BrokerBenchmark::from_samples("z", &[], from, to),
                BrokerBenchmark::from_samples("m", &[], from, to),
            ],
            from,
            to,
            &HealthThresholds::default(),
        );
        assert_eq!(comparison.winner.as_deref(), Some("m"));
    }

    #[test]
    fn unhealthy_broker_gets_warnings() {
        let (from, to) = window();
        let mid = from + TimeDelta::minutes(5);
        let samples: Vec<_> = (0..10).map(|i| execution(mid, 1_500.0, i % 2 == 0)).collect();
        let comparison = BrokerComparison::from_benchmarks(
            vec![BrokerBenchmark::from_samples("flaky", &samples, from, to)],
            from,
            to,
            &HealthThresholds::default(),
        );
        let warnings: Vec<_> = comparison
            .recommendations
            .iter()
            .filter(|r| r.starts_with("Warning: flaky"))
            .collect();
        assert_eq!(warnings.len(), 3);
    }
}
