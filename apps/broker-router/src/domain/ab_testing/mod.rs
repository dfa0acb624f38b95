//! A/B Testing Context
//!
//! Experiment configuration (traffic splits, strategy, window, filters),
//! its lifecycle, and the shape of analysis results.

mod config;
mod results;

pub use config::{
    ABTestConfig, DEFAULT_MINIMUM_SAMPLE_SIZE, RoutingStrategy, SPLIT_TOLERANCE, TestConfigError,
    TestFilters, TestMetric, TestStatus, TimeWindow, TrafficSplit,
};
pub use results::{
    ABTestResults, BrokerTestMetrics, LATENCY_CAP_MS, PairwiseSignificance, performance_score,
};
