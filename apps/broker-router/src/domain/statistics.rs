//! Statistical helpers for benchmark and experiment analysis.

use serde::{Deserialize, Serialize};

const MAX_ITERATIONS: usize = 200;
const EPSILON: f64 = 3.0e-14;
const FP_MIN: f64 = 1.0e-300;

/// Arithmetic mean.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n - 1 denominator).
#[must_use]
pub fn variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let sum: f64 = values.iter().map(|v| (v - avg) * (v - avg)).sum();
    Some(sum / (values.len() - 1) as f64)
}

/// Sample standard deviation.
#[must_use]
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

/// Nearest-rank percentile (`percentile` in 0..=100).
#[must_use]
pub fn percentile(values: &[f64], percentile: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let index = ((sorted.len() as f64) * percentile / 100.0).ceil() as usize;
    let index = index.saturating_sub(1).min(sorted.len() - 1);
    Some(sorted[index])
}

/// Mean, spread and size of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    /// Mean.
    pub mean: f64,
    /// Sample standard deviation (0 for a single observation).
    pub std_dev: f64,
    /// Number of observations.
    pub count: usize,
}

impl SampleSummary {
    /// Summarize a sample. `None` when empty.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        Some(Self {
            mean: mean(values)?,
            std_dev: std_dev(values).unwrap_or(0.0),
            count: values.len(),
        })
    }
}

/// Result of a two-sample t-test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTestResult {
    /// t statistic (positive when the first sample has the larger mean).
    pub t_statistic: f64,
    /// Welch-Satterthwaite degrees of freedom.
    pub degrees_of_freedom: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

impl TTestResult {
    /// Returns true when `p_value <= alpha`.
    #[must_use]
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value <= alpha
    }
}

/// Welch's unequal-variance two-sample t-test.
///
/// Needs at least two observations per sample. Two constant samples give
/// `p = 1` when their means are equal and `p = 0` otherwise.
#[must_use]
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<TTestResult> {
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (m1, m2) = (mean(a)?, mean(b)?);
    let (v1, v2) = (variance(a)?, variance(b)?);

    let se1 = v1 / n1;
    let se2 = v2 / n2;
    let se = (se1 + se2).sqrt();

    if se == 0.0 || !se.is_finite() {
        let equal = (m1 - m2).abs() <= f64::EPSILON * m1.abs().max(m2.abs()).max(1.0);
        return Some(TTestResult {
            t_statistic: if equal {
                0.0
            } else {
                (m1 - m2).signum() * f64::INFINITY
            },
            degrees_of_freedom: n1 + n2 - 2.0,
            p_value: if equal { 1.0 } else { 0.0 },
        });
    }

    let t = (m1 - m2) / se;
    let df = (se1 + se2).powi(2) / (se1.powi(2) / (n1 - 1.0) + se2.powi(2) / (n2 - 1.0));
    let p = student_t_two_sided_p(t, df);

    Some(TTestResult {
        t_statistic: t,
        degrees_of_freedom: df,
        p_value: p.clamp(0.0, 1.0),
    })
}

/// Two-sided tail probability of Student's t distribution.
#[must_use]
pub fn student_t_two_sided_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(df / 2.0, 0.5, x)
}

/// Regularized incomplete beta function `I_x(a, b)`.
#[must_use]
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = libm::lgamma(a + b) - libm::lgamma(a) - libm::lgamma(b)
        + a * x.ln()
        + b * (1.0 - x).ln();
    let front = ln_front.exp();

    // The continued fraction converges fastest below the mean of the distribution.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = clamp_tiny(1.0 - qab * x / qap).recip();
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = clamp_tiny(1.0 + aa * d).recip();
        c = clamp_tiny(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = clamp_tiny(1.0 + aa * d).recip();
        c = clamp_tiny(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }

    h
}

fn clamp_tiny(value: f64) -> f64 {
    if value.abs() < FP_MIN { FP_MIN } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(approx(mean(&values).unwrap(), 5.0, 1e-12));
        assert!(approx(std_dev(&values).unwrap(), 2.138_089_935, 1e-6));
        assert!(mean(&[]).is_none());
        assert!(std_dev(&[1.0]).is_none());
    }

    #[test]
    fn nearest_rank_percentiles() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&values, 50.0), Some(50.0));
        assert_eq!(percentile(&values, 95.0), Some(95.0));
        assert_eq!(percentile(&values, 99.0), Some(99.0));
        assert_eq!(percentile(&[3.0], 99.0), Some(3.0));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn incomplete_beta_known_values() {
        // I_x(1, 1) is the uniform CDF.
        assert!(approx(regularized_incomplete_beta(1.0, 1.0, 0.3), 0.3, 1e-10));
        // I_x(a, b) = 1 - I_{1-x}(b, a)
        let left = regularized_incomplete_beta(2.5, 4.0, 0.35);
        let right = 1.0 - regularized_incomplete_beta(4.0, 2.5, 0.65);
        assert!(approx(left, right, 1e-10));
    }

    #[test]
    fn student_t_p_values() {
        // Two-sided p for t = 2.0 with 10 degrees of freedom.
        assert!(approx(student_t_two_sided_p(2.0, 10.0), 0.073_388, 1e-4));
        // t = 1.96 with large df approaches the normal value 0.05.
        assert!(approx(student_t_two_sided_p(1.96, 100_000.0), 0.05, 1e-3));
        assert!(approx(student_t_two_sided_p(0.0, 5.0), 1.0, 1e-12));
    }

    #[test]
    fn welch_identical_samples_not_significant() {
        let a: Vec<f64> = (0..30).map(|i| 100.0 + f64::from(i % 5)).collect();
        let result = welch_t_test(&a, &a.clone()).unwrap();
        assert!(approx(result.t_statistic, 0.0, 1e-12));
        assert!(approx(result.p_value, 1.0, 1e-9));
        assert!(!result.is_significant(0.05));
    }

    #[test]
    fn welch_separated_samples_significant() {
        let a: Vec<f64> = (0..30).map(|i| 50.0 + f64::from(i % 7)).collect();
        let b: Vec<f64> = (0..30).map(|i| 150.0 + f64::from(i % 7)).collect();
        let result = welch_t_test(&a, &b).unwrap();
        assert!(result.t_statistic < 0.0);
        assert!(result.p_value < 1e-6);
        assert!(result.is_significant(0.05));
    }

    #[test]
    fn welch_constant_samples() {
        let same = welch_t_test(&[5.0, 5.0, 5.0], &[5.0, 5.0]).unwrap();
        assert_eq!(same.p_value, 1.0);
        let different = welch_t_test(&[5.0, 5.0, 5.0], &[6.0, 6.0]).unwrap();
        assert_eq!(different.p_value, 0.0);
    }

    #[test]
    fn welch_requires_two_observations() {
        assert!(welch_t_test(&[1.0], &[1.0, 2.0]).is_none());
    }
}
