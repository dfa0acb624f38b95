//! Broker selection strategies.
//!
//! Each strategy maps an order and a set of traffic splits to one broker.
//! Only round-robin and performance-based selection read shared state, and
//! they receive it as plain arguments.

use md5::{Digest, Md5};
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

use crate::domain::ab_testing::{TrafficSplit, performance_score};
use crate::domain::order_execution::BrokerOrder;
use crate::domain::performance::PerformanceSample;

/// Splits that can receive traffic.
fn live_splits(splits: &[TrafficSplit]) -> impl Iterator<Item = &TrafficSplit> {
    splits.iter().filter(|s| s.percentage > 0.0)
}

/// Broker whose cumulative percentage band contains `point` (0..100).
pub(super) fn select_by_point(splits: &[TrafficSplit], point: f64) -> Option<&str> {
    let mut cumulative = 0.0;
    for split in live_splits(splits) {
        cumulative += split.percentage;
        if point < cumulative {
            return Some(split.broker.as_str());
        }
    }
    // Rounding can leave the sum a hair under 100.
    live_splits(splits).last().map(|s| s.broker.as_str())
}

/// Stable bucket in `0..100` for a routing key.
pub(super) fn hash_bucket(key: &str) -> u8 {
    let digest = Md5::digest(key.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    #[allow(clippy::cast_possible_truncation)]
    let bucket = (u128::from_be_bytes(bytes) % 100) as u8;
    bucket
}

/// Uniform draw against cumulative percentages.
pub(super) fn route_random<'a, R: Rng>(
    splits: &'a [TrafficSplit],
    rng: &mut R,
) -> Option<&'a str> {
    select_by_point(splits, rng.random_range(0.0..100.0))
}

/// Deterministic: the same routing key always lands on the same broker.
pub(super) fn route_hash_based<'a>(splits: &'a [TrafficSplit], order: &BrokerOrder) -> Option<&'a str> {
    select_by_point(splits, f64::from(hash_bucket(order.routing_key())))
}

/// Weighted draw over the split percentages.
pub(super) fn route_weighted<'a, R: Rng>(
    splits: &'a [TrafficSplit],
    rng: &mut R,
) -> Option<&'a str> {
    let live: Vec<&TrafficSplit> = live_splits(splits).collect();
    let index = WeightedIndex::new(live.iter().map(|s| s.percentage)).ok()?;
    live.get(index.sample(rng)).map(|s| s.broker.as_str())
}

/// `recorded mod N` over the splits that receive traffic.
pub(super) fn route_round_robin(splits: &[TrafficSplit], recorded: u64) -> Option<&str> {
    let live: Vec<&TrafficSplit> = live_splits(splits).collect();
    if live.is_empty() {
        return None;
    }
    let index = usize::try_from(recorded % live.len() as u64).ok()?;
    live.get(index).map(|s| s.broker.as_str())
}

/// Composite score over recent execution samples, `None` without samples.
pub(super) fn recent_score(samples: &[PerformanceSample]) -> Option<f64> {
    let (mut count, mut successes, mut latency) = (0usize, 0usize, 0.0_f64);
    for sample in samples {
        if let PerformanceSample::Execution {
            latency_ms,
            success,
            ..
        } = sample
        {
            count += 1;
            successes += usize::from(*success);
            latency += *latency_ms;
        }
    }
    if count == 0 {
        return None;
    }
    let n = count as f64;
    let success_rate = successes as f64 / n;
    Some(performance_score(success_rate, latency / n, 1.0 - success_rate))
}

/// Highest recent score wins; ties go to the earlier split. `None` when no
/// broker has samples yet.
pub(super) fn route_performance_based<'a, F>(splits: &'a [TrafficSplit], mut recent: F) -> Option<&'a str>
where
    F: FnMut(&str) -> Vec<PerformanceSample>,
{
    let mut best: Option<(&str, f64)> = None;
    for split in live_splits(splits) {
        let Some(score) = recent_score(&recent(&split.broker)) else {
            continue;
        };
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((split.broker.as_str(), score));
        }
    }
    best.map(|(broker, _)| broker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::OrderSide;
    use chrono::Utc;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn splits(pairs: &[(&str, f64)]) -> Vec<TrafficSplit> {
        pairs.iter().map(|(b, p)| TrafficSplit::new(*b, *p)).collect()
    }

    fn execution(latency_ms: f64, success: bool) -> PerformanceSample {
        PerformanceSample::Execution {
            timestamp: Utc::now(),
            latency_ms,
            success,
            commission_bps: None,
            slippage_bps: None,
            error_code: None,
        }
    }

    #[test_case(0.0, "a")]
    #[test_case(69.99, "a")]
    #[test_case(70.0, "b")]
    #[test_case(99.99, "b")]
    #[test_case(100.0, "b")]
    fn point_selects_band(point: f64, expected: &str) {
        let splits = splits(&[("a", 70.0), ("b", 30.0)]);
        assert_eq!(select_by_point(&splits, point), Some(expected));
    }

    #[test]
    fn zero_percent_split_never_selected() {
        let splits = splits(&[("a", 0.0), ("b", 100.0)]);
        assert_eq!(select_by_point(&splits, 0.0), Some("b"));
        assert_eq!(route_round_robin(&splits, 1), Some("b"));
    }

    #[test]
    fn round_robin_alternates() {
        let splits = splits(&[("a", 50.0), ("b", 50.0)]);
        let picks: Vec<&str> = (0..10).filter_map(|i| route_round_robin(&splits, i)).collect();
        assert_eq!(picks.iter().filter(|b| **b == "a").count(), 5);
        assert_eq!(picks[0], "a");
        assert_eq!(picks[1], "b");
    }

    #[test]
    fn weighted_respects_zero_weight() {
        let splits = splits(&[("a", 100.0), ("b", 0.0)]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(route_weighted(&splits, &mut rng), Some("a"));
        }
    }

    #[test]
    fn random_distribution_roughly_follows_splits() {
        let splits = splits(&[("a", 80.0), ("b", 20.0)]);
        let mut rng = StdRng::seed_from_u64(42);
        let a = (0..2_000)
            .filter(|_| route_random(&splits, &mut rng) == Some("a"))
            .count();
        assert!((1_450..=1_750).contains(&a), "a picked {a} times");
    }

    #[test]
    fn performance_prefers_faster_and_falls_back() {
        let splits = splits(&[("slow", 50.0), ("fast", 50.0)]);
        let pick = route_performance_based(&splits, |broker| match broker {
            "slow" => vec![execution(2_000.0, true); 10],
            _ => vec![execution(50.0, true); 10],
        });
        assert_eq!(pick, Some("fast"));
        assert_eq!(route_performance_based(&splits, |_| Vec::new()), None);
    }

    #[test]
    fn failures_outweigh_speed() {
        let splits = splits(&[("flaky", 50.0), ("steady", 50.0)]);
        let pick = route_performance_based(&splits, |broker| match broker {
            "flaky" => vec![execution(10.0, false); 10],
            _ => vec![execution(400.0, true); 10],
        });
        assert_eq!(pick, Some("steady"));
    }

    proptest! {
        #[test]
        fn hash_routing_is_deterministic(key in "[a-zA-Z0-9-]{1,36}", pct in 1.0f64..99.0) {
            let splits = splits(&[("a", pct), ("b", 100.0 - pct)]);
            let order = BrokerOrder::market("EUR_USD", OrderSide::Buy, dec!(1))
                .with_client_order_id(key.clone());
            let again = BrokerOrder::market("GBP_USD", OrderSide::Sell, dec!(5))
                .with_client_order_id(key);
            prop_assert_eq!(route_hash_based(&splits, &order), route_hash_based(&splits, &again));
        }

        #[test]
        fn bucket_in_range(key in ".*") {
            prop_assert!(hash_bucket(&key) < 100);
        }
    }
}
