//! Statistical analysis of a test's executions.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::domain::ab_testing::{
    ABTestConfig, ABTestResults, BrokerTestMetrics, PairwiseSignificance, TestMetric,
    performance_score,
};
use crate::domain::order_execution::OrderExecution;
use crate::domain::performance::HealthThresholds;
use crate::domain::statistics::{SampleSummary, mean, welch_t_test};

/// Observation of a metric for one execution, if it has one.
fn observe(metric: TestMetric, execution: &OrderExecution) -> Option<f64> {
    match metric {
        TestMetric::Latency => Some(execution.latency_ms),
        TestMetric::SuccessRate => Some(if execution.success { 1.0 } else { 0.0 }),
        TestMetric::ErrorRate => Some(if execution.success { 0.0 } else { 1.0 }),
        TestMetric::FillRate => execution.fill_ratio(),
        TestMetric::Commission => execution.commission_bps(),
        TestMetric::Slippage => execution.slippage_bps(),
    }
}

struct BrokerSamples<'a> {
    broker: &'a str,
    executions: Vec<&'a OrderExecution>,
}

impl BrokerSamples<'_> {
    fn values(&self, metric: TestMetric) -> Vec<f64> {
        self.executions
            .iter()
            .filter_map(|e| observe(metric, e))
            .collect()
    }

    fn metrics(&self, tracked: &[TestMetric]) -> BrokerTestMetrics {
        let sample_size = self.executions.len();
        let success_count = self.executions.iter().filter(|e| e.success).count();
        let success_rate = if sample_size == 0 {
            0.0
        } else {
            success_count as f64 / sample_size as f64
        };
        let error_rate = 1.0 - success_rate;
        let mean_latency_ms = mean(&self.values(TestMetric::Latency)).unwrap_or(0.0);

        let metrics = tracked
            .iter()
            .filter_map(|m| SampleSummary::from_values(&self.values(*m)).map(|s| (*m, s)))
            .collect();

        BrokerTestMetrics {
            broker: self.broker.to_string(),
            sample_size,
            success_count,
            success_rate,
            error_rate,
            mean_latency_ms,
            composite_score: performance_score(success_rate, mean_latency_ms, error_rate),
            metrics,
        }
    }
}

/// Analyze the retained executions of a test.
///
/// Pairwise Welch tests run between every pair of brokers that reached the
/// minimum sample size. The broker with the highest composite score wins
/// only if every comparison against it, on every tracked metric, has a
/// p-value of at most `1 - confidence_level`.
pub(super) fn analyze(
    config: &ABTestConfig,
    executions: &[OrderExecution],
    thresholds: &HealthThresholds,
) -> ABTestResults {
    let alpha = 1.0 - config.confidence_level;
    let samples: Vec<BrokerSamples<'_>> = config
        .brokers()
        .map(|broker| BrokerSamples {
            broker,
            executions: executions.iter().filter(|e| e.broker == broker).collect(),
        })
        .collect();

    let metrics: BTreeMap<String, BrokerTestMetrics> = samples
        .iter()
        .filter(|s| !s.executions.is_empty())
        .map(|s| (s.broker.to_string(), s.metrics(&config.target_metrics)))
        .collect();

    let eligible: Vec<&BrokerSamples<'_>> = samples
        .iter()
        .filter(|s| s.executions.len() >= config.minimum_sample_size.max(2))
        .collect();

    let mut significance = Vec::new();
    for (i, a) in eligible.iter().enumerate() {
        for b in &eligible[i + 1..] {
            for metric in &config.target_metrics {
                let (values_a, values_b) = (a.values(*metric), b.values(*metric));
                let (Some(test), Some(mean_a), Some(mean_b)) = (
                    welch_t_test(&values_a, &values_b),
                    mean(&values_a),
                    mean(&values_b),
                ) else {
                    continue;
                };
                significance.push(PairwiseSignificance {
                    broker_a: a.broker.to_string(),
                    broker_b: b.broker.to_string(),
                    metric: *metric,
                    mean_a,
                    mean_b,
                    // Finite so the results survive JSON export.
                    t_statistic: test.t_statistic.clamp(f64::MIN, f64::MAX),
                    degrees_of_freedom: test.degrees_of_freedom,
                    p_value: test.p_value,
                    significant: test.is_significant(alpha),
                });
            }
        }
    }

    let winner = pick_winner(&eligible, &metrics, &significance, alpha);
    let recommendations = recommend(
        config,
        &samples,
        &metrics,
        eligible.len(),
        winner.as_deref(),
        thresholds,
    );

    ABTestResults {
        test_id: config.test_id.clone(),
        name: config.name.clone(),
        status: config.status(),
        strategy: config.strategy,
        start_time: config.start_time,
        end_time: config.end_time,
        total_executions: executions.len(),
        metrics,
        statistical_significance: significance,
        winner,
        confidence_level: config.confidence_level,
        recommendations,
        analyzed_at: Utc::now(),
    }
}

fn pick_winner(
    eligible: &[&BrokerSamples<'_>],
    metrics: &BTreeMap<String, BrokerTestMetrics>,
    significance: &[PairwiseSignificance],
    alpha: f64,
) -> Option<String> {
    if eligible.len() < 2 {
        return None;
    }
    let candidate = eligible
        .iter()
        .filter_map(|s| metrics.get(s.broker))
        .max_by(|a, b| a.composite_score.total_cmp(&b.composite_score))?;

    let separated_from_all = eligible
        .iter()
        .filter(|s| s.broker != candidate.broker)
        .all(|other| {
            let mut pairs = significance
                .iter()
                .filter(|p| p.involves(&candidate.broker) && p.involves(other.broker))
                .peekable();
            pairs.peek().is_some() && pairs.all(|p| p.p_value <= alpha)
        });

    separated_from_all.then(|| candidate.broker.clone())
}

fn recommend(
    config: &ABTestConfig,
    samples: &[BrokerSamples<'_>],
    metrics: &BTreeMap<String, BrokerTestMetrics>,
    eligible: usize,
    winner: Option<&str>,
    thresholds: &HealthThresholds,
) -> Vec<String> {
    let mut out = Vec::new();
    let confidence = config.confidence_level * 100.0;

    match winner {
        Some(broker) => out.push(format!(
            "Winner: {broker} (composite score {:.3}, significant at {confidence:.0}% confidence)",
            metrics.get(broker).map_or(0.0, |m| m.composite_score)
        )),
        None if eligible < 2 => {
            let counts: Vec<String> = config
                .brokers()
                .map(|b| format!("{b}={}", metrics.get(b).map_or(0, |m| m.sample_size)))
                .collect();
            out.push(format!(
                "Insufficient data: each broker needs at least {} executions ({})",
                config.minimum_sample_size,
                counts.join(", ")
            ));
        }
        None => out.push(format!(
            "No statistically significant winner at {confidence:.0}% confidence"
        )),
    }

    if metrics.is_empty() {
        return out;
    }

    if let Some(fastest) = metrics
        .values()
        .min_by(|a, b| a.mean_latency_ms.total_cmp(&b.mean_latency_ms))
    {
        out.push(format!(
            "Fastest: {} ({:.1} ms mean latency)",
            fastest.broker, fastest.mean_latency_ms
        ));
    }
    if let Some(reliable) = metrics
        .values()
        .max_by(|a, b| a.success_rate.total_cmp(&b.success_rate))
    {
        out.push(format!(
            "Most reliable: {} ({:.1}% success rate)",
            reliable.broker,
            reliable.success_rate * 100.0
        ));
    }
    // Commission is observed whether or not it is a tracked metric.
    if let Some((broker, commission)) = samples
        .iter()
        .filter_map(|s| mean(&s.values(TestMetric::Commission)).map(|c| (s.broker, c)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
    {
        out.push(format!(
            "Most cost-effective: {broker} ({commission:.2} bps commission)"
        ));
    }

    for m in metrics.values() {
        out.extend(thresholds.warnings(
            &m.broker,
            m.success_rate,
            m.error_rate,
            Some(m.mean_latency_ms),
            None,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ab_testing::{RoutingStrategy, TrafficSplit};
    use crate::domain::errors::{StandardBrokerError, StandardErrorCode};
    use crate::domain::order_execution::{BrokerOrder, OrderResult, OrderSide, OrderStatus};
    use crate::domain::shared::BrokerOrderId;
    use rust_decimal_macros::dec;

    fn config(min_samples: usize) -> ABTestConfig {
        ABTestConfig::new(
            "latency",
            vec![TrafficSplit::new("a", 50.0), TrafficSplit::new("b", 50.0)],
            RoutingStrategy::RoundRobin,
        )
        .unwrap()
        .with_minimum_sample_size(min_samples)
    }

    fn run(config: &ABTestConfig, broker: &str, latency_ms: f64, success: bool) -> OrderExecution {
        let order = BrokerOrder::market("EUR_USD", OrderSide::Buy, dec!(100));
        if success {
            let result = OrderResult::accepted(BrokerOrderId::new("x"), OrderStatus::Filled)
                .with_fill(dec!(100), dec!(1.1))
                .with_commission(dec!(0.011));
            OrderExecution::succeeded(Some(config.test_id.clone()), broker, order, result, latency_ms)
        } else {
            let err = StandardBrokerError::new(StandardErrorCode::ServiceUnavailable, "down");
            OrderExecution::failed(Some(config.test_id.clone()), broker, order, &err, latency_ms)
        }
    }

    #[test]
    fn identical_small_samples_have_no_winner() {
        let config = config(30);
        let executions: Vec<OrderExecution> = (0..20)
            .map(|i| {
                let broker = if i % 2 == 0 { "a" } else { "b" };
                run(&config, broker, 100.0 + f64::from(i / 2), true)
            })
            .collect();

        let results = analyze(&config, &executions, &HealthThresholds::default());
        assert_eq!(results.winner, None);
        assert_eq!(results.total_executions, 20);
        assert_eq!(results.metrics["a"].sample_size, 10);
        assert!(results.statistical_significance.is_empty());
        assert!(results.recommendations[0].starts_with("Insufficient data"));
    }

    #[test]
    fn identical_large_samples_have_no_winner() {
        let config = config(30);
        let executions: Vec<OrderExecution> = (0..80)
            .map(|i| {
                let broker = if i % 2 == 0 { "a" } else { "b" };
                run(&config, broker, 100.0 + f64::from((i / 2) % 10), true)
            })
            .collect();

        let results = analyze(&config, &executions, &HealthThresholds::default());
        assert_eq!(results.winner, None);
        assert!(!results.statistical_significance.is_empty());
        assert!(results.statistical_significance.iter().all(|p| !p.significant));
    }

    #[test]
    fn clearly_faster_broker_wins_on_latency_alone() {
        let config = config(30).with_target_metrics([TestMetric::Latency]);
        let mut executions = Vec::new();
        for i in 0..40 {
            let jitter = f64::from(i % 5);
            executions.push(run(&config, "a", 50.0 + jitter, true));
            executions.push(run(&config, "b", 400.0 + jitter, true));
        }

        let results = analyze(&config, &executions, &HealthThresholds::default());
        assert_eq!(results.winner.as_deref(), Some("a"));
        assert!(results.recommendations[0].starts_with("Winner: a"));
        assert!(results.recommendations.iter().any(|r| r.starts_with("Fastest: a")));
        assert!(
            results
                .recommendations
                .iter()
                .any(|r| r.starts_with("Most cost-effective:"))
        );
    }

    #[test]
    fn one_insignificant_metric_blocks_the_winner() {
        // Latency separates the brokers; success and error rates are identical.
        let config = config(30);
        let mut executions = Vec::new();
        for i in 0..40 {
            let jitter = f64::from(i % 5);
            executions.push(run(&config, "a", 50.0 + jitter, true));
            executions.push(run(&config, "b", 400.0 + jitter, true));
        }

        let results = analyze(&config, &executions, &HealthThresholds::default());
        let latency = results
            .statistical_significance
            .iter()
            .find(|p| p.metric == TestMetric::Latency)
            .unwrap();
        assert!(latency.significant);
        assert!(
            results
                .statistical_significance
                .iter()
                .any(|p| p.metric == TestMetric::SuccessRate && !p.significant)
        );
        assert_eq!(results.winner, None);
    }

    #[test]
    fn faster_and_more_reliable_broker_wins_on_every_metric() {
        let config = config(30);
        let mut executions = Vec::new();
        for i in 0..40 {
            let jitter = f64::from(i % 5);
            executions.push(run(&config, "a", 50.0 + jitter, true));
            executions.push(run(&config, "b", 400.0 + jitter, i % 2 == 0));
        }

        let results = analyze(&config, &executions, &HealthThresholds::default());
        assert_eq!(results.statistical_significance.len(), 3);
        assert!(results.statistical_significance.iter().all(|p| p.significant));
        assert_eq!(results.winner.as_deref(), Some("a"));
    }

    #[test]
    fn unhealthy_broker_gets_warning() {
        let config = config(5);
        let mut executions = Vec::new();
        for i in 0..10 {
            executions.push(run(&config, "a", 80.0, true));
            executions.push(run(&config, "b", 80.0, i % 2 == 0));
        }

        let results = analyze(&config, &executions, &HealthThresholds::default());
        assert!((results.metrics["b"].error_rate - 0.5).abs() < 1e-12);
        assert!(
            results
                .recommendations
                .iter()
                .any(|r| r.starts_with("Warning: b success rate"))
        );
        assert!(
            !results
                .recommendations
                .iter()
                .any(|r| r.starts_with("Warning: a"))
        );
    }
}
