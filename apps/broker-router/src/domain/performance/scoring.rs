//! Fixed score tables and health thresholds.
//!
//! Scores are on 0–100. Speed and cost use piecewise-linear interpolation
//! between fixed points; values beyond the last point clamp.

use serde::{Deserialize, Serialize};

/// Mean order latency (ms) → speed score.
const SPEED_POINTS: [(f64, f64); 8] = [
    (0.0, 100.0),
    (50.0, 95.0),
    (100.0, 90.0),
    (250.0, 75.0),
    (500.0, 60.0),
    (1_000.0, 40.0),
    (2_000.0, 20.0),
    (5_000.0, 0.0),
];

/// Total cost (bps) → cost score.
const COST_POINTS: [(f64, f64); 8] = [
    (0.0, 100.0),
    (1.0, 95.0),
    (2.0, 90.0),
    (5.0, 75.0),
    (10.0, 60.0),
    (20.0, 40.0),
    (50.0, 20.0),
    (100.0, 0.0),
];

/// Score used when a dimension has no data.
pub const NEUTRAL_SCORE: f64 = 50.0;

fn interpolate(points: &[(f64, f64)], x: f64) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return NEUTRAL_SCORE;
    };
    if x <= first.0 {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }
    points
        .windows(2)
        .find(|w| x <= w[1].0)
        .map_or(last.1, |w| {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            y0 + (y1 - y0) * (x - x0) / (x1 - x0)
        })
}

/// Speed score from mean latency; no data scores neutral.
#[must_use]
pub fn speed_score(mean_latency_ms: Option<f64>) -> f64 {
    mean_latency_ms.map_or(NEUTRAL_SCORE, |ms| interpolate(&SPEED_POINTS, ms))
}

/// Cost score from spread + slippage + commission in bps; no data scores
/// neutral.
#[must_use]
pub fn cost_score(total_cost_bps: Option<f64>) -> f64 {
    total_cost_bps.map_or(NEUTRAL_SCORE, |bps| interpolate(&COST_POINTS, bps.max(0.0)))
}

/// 50% success rate + 30% uptime + 20% (1 − error rate).
///
/// Rates are fractions; uptime is a percentage.
#[must_use]
pub fn reliability_score(success_rate: f64, uptime_percent: f64, error_rate: f64) -> f64 {
    0.5 * success_rate.clamp(0.0, 1.0) * 100.0
        + 0.3 * uptime_percent.clamp(0.0, 100.0)
        + 0.2 * (1.0 - error_rate.clamp(0.0, 1.0)) * 100.0
}

/// 0.35 speed + 0.40 reliability + 0.25 cost.
#[must_use]
pub fn overall_score(speed: f64, reliability: f64, cost: f64) -> f64 {
    0.35 * speed + 0.40 * reliability + 0.25 * cost
}

/// Levels below which a broker earns a warning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Minimum success rate (fraction).
    pub min_success_rate: f64,
    /// Maximum error rate (fraction).
    pub max_error_rate: f64,
    /// Maximum mean latency in milliseconds.
    pub max_latency_ms: f64,
    /// Minimum uptime percentage.
    pub min_uptime_percent: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            min_success_rate: 0.95,
            max_error_rate: 0.05,
            max_latency_ms: 1_000.0,
            min_uptime_percent: 99.0,
        }
    }
}

impl HealthThresholds {
    /// Warnings for every threshold the broker misses.
    #[must_use]
    pub fn warnings(
        &self,
        broker: &str,
        success_rate: f64,
        error_rate: f64,
        mean_latency_ms: Option<f64>,
        uptime_percent: Option<f64>,
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        if success_rate < self.min_success_rate {
            warnings.push(format!(
                "Warning: {broker} success rate {:.1}% is below {:.1}%",
                success_rate * 100.0,
                self.min_success_rate * 100.0
            ));
        }
        if error_rate > self.max_error_rate {
            warnings.push(format!(
                "Warning: {broker} error rate {:.1}% exceeds {:.1}%",
                error_rate * 100.0,
                self.max_error_rate * 100.0
            ));
        }
        if let Some(latency) = mean_latency_ms
            && latency > self.max_latency_ms
        {
            warnings.push(format!(
                "Warning: {broker} mean latency {latency:.0} ms exceeds {:.0} ms",
                self.max_latency_ms
            ));
        }
        if let Some(uptime) = uptime_percent
            && uptime < self.min_uptime_percent
        {
            warnings.push(format!(
                "Warning: {broker} uptime {uptime:.2}% is below {:.2}%",
                self.min_uptime_percent
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0.0 => 100.0; "zero")]
    #[test_case(50.0 => 95.0; "fifty")]
    #[test_case(75.0 => 92.5; "between points")]
    #[test_case(750.0 => 50.0; "mid table")]
    #[test_case(5_000.0 => 0.0; "cap")]
    #[test_case(9_000.0 => 0.0; "beyond cap")]
    fn speed(ms: f64) -> f64 {
        speed_score(Some(ms))
    }

    #[test_case(0.0 => 100.0; "free")]
    #[test_case(1.5 => 92.5; "between points")]
    #[test_case(10.0 => 60.0; "ten")]
    #[test_case(200.0 => 0.0; "beyond cap")]
    fn cost(bps: f64) -> f64 {
        cost_score(Some(bps))
    }

    #[test]
    fn missing_data_is_neutral() {
        assert_eq!(speed_score(None), NEUTRAL_SCORE);
        assert_eq!(cost_score(None), NEUTRAL_SCORE);
    }

    #[test]
    fn composite_scores() {
        assert!((reliability_score(1.0, 100.0, 0.0) - 100.0).abs() < 1e-9);
        assert!((reliability_score(0.9, 99.0, 0.1) - 92.7).abs() < 1e-9);
        assert!((overall_score(100.0, 100.0, 100.0) - 100.0).abs() < 1e-9);
        assert!((overall_score(80.0, 90.0, 50.0) - 76.5).abs() < 1e-9);
    }

    #[test]
    fn threshold_warnings() {
        let t = HealthThresholds::default();
        assert!(t.warnings("a", 0.99, 0.01, Some(20.0), Some(100.0)).is_empty());
        let w = t.warnings("b", 0.9, 0.1, Some(1_500.0), Some(95.0));
        assert_eq!(w.len(), 4);
        assert!(w[0].contains("success rate"));
    }
}
