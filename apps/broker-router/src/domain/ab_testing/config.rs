//! A/B test configuration.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order_execution::{BrokerOrder, OrderType};
use crate::domain::shared::TestId;

/// Allowed deviation of the split total from 100%.
pub const SPLIT_TOLERANCE: f64 = 0.01;

/// Minimum executions per broker before pairwise testing.
pub const DEFAULT_MINIMUM_SAMPLE_SIZE: usize = 30;

/// Share of traffic sent to one broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSplit {
    /// Registered broker name.
    pub broker: String,
    /// Share of traffic, 0–100.
    pub percentage: f64,
}

impl TrafficSplit {
    /// Create a split.
    #[must_use]
    pub fn new(broker: impl Into<String>, percentage: f64) -> Self {
        Self {
            broker: broker.into(),
            percentage,
        }
    }
}

/// How a test picks a broker for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Uniform draw against cumulative percentages.
    #[default]
    Random,
    /// Stable hash of the order's routing key.
    HashBased,
    /// Weighted draw by percentage.
    WeightedRandom,
    /// Cycle through splits by recorded execution count.
    RoundRobin,
    /// Best recent composite performance.
    PerformanceBased,
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Random => "random",
            Self::HashBased => "hash_based",
            Self::WeightedRandom => "weighted_random",
            Self::RoundRobin => "round_robin",
            Self::PerformanceBased => "performance_based",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Created, not yet routing.
    #[default]
    Draft,
    /// Routing orders.
    Active,
    /// Temporarily not routing.
    Paused,
    /// Finished normally or expired.
    Completed,
    /// Aborted.
    Cancelled,
}

impl TestStatus {
    /// Completed and cancelled tests never change again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns true if `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft | Self::Paused, Self::Active)
                | (Self::Active, Self::Paused)
                | (Self::Draft | Self::Active | Self::Paused, Self::Completed | Self::Cancelled)
        )
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Per-execution quantity tracked by a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMetric {
    /// Placement latency in milliseconds.
    Latency,
    /// 1 for success, 0 for failure.
    SuccessRate,
    /// 1 for failure, 0 for success.
    ErrorRate,
    /// Filled fraction of requested units.
    FillRate,
    /// Commission in basis points of notional.
    Commission,
    /// Adverse fill distance in basis points.
    Slippage,
}

impl TestMetric {
    /// Metrics tracked when a test names none.
    pub const DEFAULTS: [Self; 3] = [Self::Latency, Self::SuccessRate, Self::ErrorRate];

    /// Direction of improvement.
    #[must_use]
    pub const fn higher_is_better(&self) -> bool {
        matches!(self, Self::SuccessRate | Self::FillRate)
    }
}

impl fmt::Display for TestMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Latency => "latency",
            Self::SuccessRate => "success_rate",
            Self::ErrorRate => "error_rate",
            Self::FillRate => "fill_rate",
            Self::Commission => "commission",
            Self::Slippage => "slippage",
        };
        f.write_str(s)
    }
}

/// Time-of-day range in UTC. `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive start.
    pub start: NaiveTime,
    /// Exclusive end.
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Create a window.
    #[must_use]
    pub const fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Returns true if `time` falls inside the window.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

/// Which orders a test applies to. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFilters {
    /// Instrument allow-list.
    #[serde(default)]
    pub instruments: BTreeSet<String>,
    /// Order-type allow-list.
    #[serde(default)]
    pub order_types: BTreeSet<OrderType>,
    /// Minimum order size.
    #[serde(default)]
    pub min_units: Option<Decimal>,
    /// Maximum order size.
    #[serde(default)]
    pub max_units: Option<Decimal>,
    /// Time-of-day windows; any match suffices.
    #[serde(default)]
    pub time_windows: Vec<TimeWindow>,
}

impl TestFilters {
    /// Returns true if the order passes every filter at `now`.
    #[must_use]
    pub fn matches(&self, order: &BrokerOrder, now: DateTime<Utc>) -> bool {
        if !self.instruments.is_empty() && !self.instruments.contains(&order.instrument) {
            return false;
        }
        if !self.order_types.is_empty() && !self.order_types.contains(&order.order_type) {
            return false;
        }
        let units = order.units.abs();
        if self.min_units.is_some_and(|min| units < min) {
            return false;
        }
        if self.max_units.is_some_and(|max| units > max) {
            return false;
        }
        self.time_windows.is_empty() || self.time_windows.iter().any(|w| w.contains(now.time()))
    }
}

/// Invalid test configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TestConfigError {
    /// No splits.
    #[error("A test needs at least one traffic split")]
    EmptySplits,

    /// Percentage outside 0–100.
    #[error("Split for {broker} has invalid percentage {percentage}")]
    InvalidPercentage {
        /// Broker of the split.
        broker: String,
        /// Offending value.
        percentage: f64,
    },

    /// Same broker listed twice.
    #[error("Broker {0} appears in more than one split")]
    DuplicateBroker(String),

    /// Percentages do not total 100.
    #[error("Traffic splits must sum to 100%, got {0}%")]
    SplitSum(f64),

    /// End precedes start.
    #[error("Test window ends before it starts")]
    InvalidWindow,

    /// Confidence outside (0, 1).
    #[error("Confidence level must be between 0 and 1, got {0}")]
    InvalidConfidence(f64),

    /// Illegal status change.
    #[error("Cannot move test from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: TestStatus,
        /// Requested status.
        to: TestStatus,
    },
}

/// An A/B routing experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ABTestConfig {
    /// Test ID.
    pub test_id: TestId,
    /// Name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    splits: Vec<TrafficSplit>,
    /// Broker selection strategy.
    pub strategy: RoutingStrategy,
    /// Start of the routing window.
    pub start_time: DateTime<Utc>,
    /// End of the routing window; open-ended when absent.
    pub end_time: Option<DateTime<Utc>>,
    /// Metrics compared during analysis.
    pub target_metrics: Vec<TestMetric>,
    /// Order filters.
    pub filters: TestFilters,
    /// Minimum executions per broker before pairwise testing.
    pub minimum_sample_size: usize,
    /// Confidence level for significance, e.g. 0.95.
    pub confidence_level: f64,
    status: TestStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ABTestConfig {
    /// Create a draft test starting now.
    ///
    /// # Errors
    ///
    /// Returns an error if the splits are empty, contain a duplicate broker
    /// or an out-of-range percentage, or do not total 100 ± 0.01.
    pub fn new(
        name: impl Into<String>,
        splits: Vec<TrafficSplit>,
        strategy: RoutingStrategy,
    ) -> Result<Self, TestConfigError> {
        validate_splits(&splits)?;
        let now = Utc::now();
        Ok(Self {
            test_id: TestId::generate(),
            name: name.into(),
            description: None,
            splits,
            strategy,
            start_time: now,
            end_time: None,
            target_metrics: TestMetric::DEFAULTS.to_vec(),
            filters: TestFilters::default(),
            minimum_sample_size: DEFAULT_MINIMUM_SAMPLE_SIZE,
            confidence_level: 0.95,
            status: TestStatus::Draft,
            created_at: now,
        })
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// End the window `duration` after the start.
    #[must_use]
    pub fn with_duration(mut self, duration: TimeDelta) -> Self {
        self.end_time = Some(self.start_time + duration);
        self
    }

    /// Set an explicit window.
    #[must_use]
    pub const fn with_window(mut self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// Set the order filters.
    #[must_use]
    pub fn with_filters(mut self, filters: TestFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Set the tracked metrics. An empty list keeps the defaults.
    #[must_use]
    pub fn with_target_metrics(mut self, metrics: impl IntoIterator<Item = TestMetric>) -> Self {
        let metrics: Vec<TestMetric> = metrics.into_iter().collect();
        if !metrics.is_empty() {
            self.target_metrics = metrics;
        }
        self
    }

    /// Set the minimum sample size.
    #[must_use]
    pub const fn with_minimum_sample_size(mut self, size: usize) -> Self {
        self.minimum_sample_size = size;
        self
    }

    /// Set the confidence level.
    #[must_use]
    pub const fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    /// Traffic splits.
    #[must_use]
    pub fn splits(&self) -> &[TrafficSplit] {
        &self.splits
    }

    /// Brokers in split order.
    pub fn brokers(&self) -> impl Iterator<Item = &str> {
        self.splits.iter().map(|s| s.broker.as_str())
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> TestStatus {
        self.status
    }

    /// Check every invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), TestConfigError> {
        validate_splits(&self.splits)?;
        if self.end_time.is_some_and(|end| end <= self.start_time) {
            return Err(TestConfigError::InvalidWindow);
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(TestConfigError::InvalidConfidence(self.confidence_level));
        }
        Ok(())
    }

    /// Move to another status.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for illegal moves.
    pub fn transition(&mut self, to: TestStatus) -> Result<(), TestConfigError> {
        if !self.status.can_transition_to(to) {
            return Err(TestConfigError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Returns true if `now` falls inside the routing window.
    #[must_use]
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time && !self.is_expired(now)
    }

    /// Returns true once `now` is past the end of the window.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_time.is_some_and(|end| now > end)
    }

    /// Returns true if the test is active and the order passes its filters.
    #[must_use]
    pub fn applies_to(&self, order: &BrokerOrder, now: DateTime<Utc>) -> bool {
        self.status == TestStatus::Active && self.filters.matches(order, now)
    }
}

fn validate_splits(splits: &[TrafficSplit]) -> Result<(), TestConfigError> {
    if splits.is_empty() {
        return Err(TestConfigError::EmptySplits);
    }
    let mut seen = BTreeSet::new();
    for split in splits {
        if !split.percentage.is_finite() || !(0.0..=100.0).contains(&split.percentage) {
            return Err(TestConfigError::InvalidPercentage {
                broker: split.broker.clone(),
                percentage: split.percentage,
            });
        }
        if !seen.insert(split.broker.as_str()) {
            return Err(TestConfigError::DuplicateBroker(split.broker.clone()));
        }
    }
    let total: f64 = splits.iter().map(|s| s.percentage).sum();
    if (total - 100.0).abs() > SPLIT_TOLERANCE {
        return Err(TestConfigError::SplitSum(total));
    }
    Ok(())
}
