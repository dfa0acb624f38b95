//! Bounded history of mapped errors for rate and pattern analysis.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{ErrorCategory, ErrorSeverity, StandardBrokerError, StandardErrorCode};

/// Default number of errors retained.
pub const DEFAULT_ERROR_HISTORY: usize = 10_000;

const UNKNOWN_BROKER: &str = "unknown";

/// Aggregate view of errors inside a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Window length in seconds.
    pub window_secs: i64,
    /// Errors inside the window.
    pub total_errors: usize,
    /// Counts per standard code.
    pub by_code: BTreeMap<StandardErrorCode, usize>,
    /// Counts per category.
    pub by_category: BTreeMap<ErrorCategory, usize>,
    /// Counts per severity.
    pub by_severity: BTreeMap<ErrorSeverity, usize>,
    /// Counts per broker.
    pub by_broker: BTreeMap<String, usize>,
    /// Errors per minute over the window.
    pub error_rate_per_minute: f64,
    /// Errors flagged retryable.
    pub retryable_count: usize,
    /// Most frequent code (ties broken by code order).
    pub most_common_code: Option<StandardErrorCode>,
}

/// Per-broker error statistics over the retained history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerErrorStats {
    /// Errors retained for the broker.
    pub total_errors: usize,
    /// Counts per category.
    pub by_category: BTreeMap<ErrorCategory, usize>,
    /// High or critical severity errors.
    pub severe_count: usize,
    /// Errors flagged retryable.
    pub retryable_count: usize,
    /// Most frequent code.
    pub most_common_code: Option<StandardErrorCode>,
    /// Time of the latest error.
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Ring buffer of mapped errors.
#[derive(Debug)]
pub struct ErrorAggregator {
    capacity: usize,
    errors: Mutex<VecDeque<StandardBrokerError>>,
}

impl Default for ErrorAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_HISTORY)
    }
}

impl ErrorAggregator {
    /// Create an aggregator retaining at most `capacity` errors.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            errors: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Append an error, evicting the oldest when full.
    pub fn record(&self, error: StandardBrokerError) {
        let mut errors = self.errors.lock();
        if errors.len() == self.capacity {
            errors.pop_front();
        }
        errors.push_back(error);
    }

    /// Errors currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    /// Returns true if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    /// Summarize errors newer than `now - window`.
    #[must_use]
    pub fn error_summary(&self, window: TimeDelta) -> ErrorSummary {
        let cutoff = Utc::now() - window;
        let errors = self.errors.lock();
        let recent: Vec<&StandardBrokerError> =
            errors.iter().filter(|e| e.timestamp() >= cutoff).collect();

        let mut by_code = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        let mut by_broker = BTreeMap::new();
        let mut retryable_count = 0;

        for error in &recent {
            *by_code.entry(error.error_code()).or_insert(0) += 1;
            *by_category.entry(error.category()).or_insert(0) += 1;
            *by_severity.entry(error.severity()).or_insert(0) += 1;
            *by_broker
                .entry(error.broker_name().unwrap_or(UNKNOWN_BROKER).to_string())
                .or_insert(0) += 1;
            if error.is_retryable() {
                retryable_count += 1;
            }
        }

        let minutes = (window.num_seconds() as f64 / 60.0).max(f64::MIN_POSITIVE);
        ErrorSummary {
            window_secs: window.num_seconds(),
            total_errors: recent.len(),
            most_common_code: most_common(&by_code),
            by_code,
            by_category,
            by_severity,
            by_broker,
            error_rate_per_minute: recent.len() as f64 / minutes,
            retryable_count,
        }
    }

    /// Per-broker statistics over everything retained.
    #[must_use]
    pub fn broker_error_comparison(&self) -> BTreeMap<String, BrokerErrorStats> {
        let errors = self.errors.lock();
        let mut codes: BTreeMap<String, BTreeMap<StandardErrorCode, usize>> = BTreeMap::new();
        let mut stats: BTreeMap<String, BrokerErrorStats> = BTreeMap::new();

        for error in errors.iter() {
            let broker = error.broker_name().unwrap_or(UNKNOWN_BROKER).to_string();
            *codes
                .entry(broker.clone())
                .or_default()
                .entry(error.error_code())
                .or_insert(0) += 1;

            let entry = stats.entry(broker).or_insert_with(|| BrokerErrorStats {
                total_errors: 0,
                by_category: BTreeMap::new(),
                severe_count: 0,
                retryable_count: 0,
                most_common_code: None,
                last_error_at: None,
            });
            entry.total_errors += 1;
            *entry.by_category.entry(error.category()).or_insert(0) += 1;
            if error.severity() >= ErrorSeverity::High {
                entry.severe_count += 1;
            }
            if error.is_retryable() {
                entry.retryable_count += 1;
            }
            entry.last_error_at = entry.last_error_at.max(Some(error.timestamp()));
        }

        for (broker, entry) in &mut stats {
            entry.most_common_code = codes.get(broker).and_then(most_common);
        }
        stats
    }
}

fn most_common(counts: &BTreeMap<StandardErrorCode, usize>) -> Option<StandardErrorCode> {
    // max_by_key keeps the last maximum; iterate in reverse so the first code wins ties.
    counts
        .iter()
        .rev()
        .max_by_key(|(_, count)| **count)
        .map(|(code, _)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(broker: &str, code: StandardErrorCode) -> StandardBrokerError {
        StandardBrokerError::new(code, "test").with_broker(broker)
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let aggregator = ErrorAggregator::new(3);
        for _ in 0..5 {
            aggregator.record(error("oanda", StandardErrorCode::RequestTimeout));
        }
        assert_eq!(aggregator.len(), 3);
    }

    #[test]
    fn summary_counts_by_dimension() {
        let aggregator = ErrorAggregator::default();
        aggregator.record(error("oanda", StandardErrorCode::RequestTimeout));
        aggregator.record(error("oanda", StandardErrorCode::RequestTimeout));
        aggregator.record(error("ib", StandardErrorCode::InsufficientMargin));

        let summary = aggregator.error_summary(TimeDelta::hours(1));
        assert_eq!(summary.total_errors, 3);
        assert_eq!(summary.by_code[&StandardErrorCode::RequestTimeout], 2);
        assert_eq!(summary.by_category[&ErrorCategory::Technical], 2);
        assert_eq!(summary.by_broker["ib"], 1);
        assert_eq!(summary.retryable_count, 2);
        assert_eq!(summary.most_common_code, Some(StandardErrorCode::RequestTimeout));
        assert!((summary.error_rate_per_minute - 0.05).abs() < 1e-9);
    }

    #[test]
    fn empty_summary() {
        let summary = ErrorAggregator::default().error_summary(TimeDelta::minutes(5));
        assert_eq!(summary.total_errors, 0);
        assert_eq!(summary.most_common_code, None);
    }

    #[test]
    fn broker_comparison() {
        let aggregator = ErrorAggregator::default();
        aggregator.record(error("oanda", StandardErrorCode::InvalidCredentials));
        aggregator.record(error("paper", StandardErrorCode::StalePrice));
        aggregator.record(error("paper", StandardErrorCode::StalePrice));

        let comparison = aggregator.broker_error_comparison();
        assert_eq!(comparison.len(), 2);
        assert_eq!(comparison["oanda"].severe_count, 1);
        assert_eq!(comparison["paper"].total_errors, 2);
        assert_eq!(
            comparison["paper"].most_common_code,
            Some(StandardErrorCode::StalePrice)
        );
        assert!(comparison["paper"].last_error_at.is_some());
    }

    #[test]
    fn summary_serializes_with_string_keys() {
        let aggregator = ErrorAggregator::default();
        aggregator.record(error("oanda", StandardErrorCode::RequestTimeout));
        let json = serde_json::to_value(aggregator.error_summary(TimeDelta::hours(1))).unwrap();
        assert_eq!(json["by_code"]["REQUEST_TIMEOUT"], 1);
        assert_eq!(json["by_category"]["technical"], 1);
    }
}
