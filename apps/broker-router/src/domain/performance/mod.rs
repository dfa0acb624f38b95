//! Performance Context
//!
//! Per-broker measurement samples, their reduction into time-windowed
//! benchmarks with 0–100 scores, and multi-broker comparisons.

mod benchmark;
mod scoring;

pub use benchmark::{
    BrokerBenchmark, BrokerComparison, LatencyStats, PerformanceSample, RankingDimension,
};
pub use scoring::{
    HealthThresholds, NEUTRAL_SCORE, cost_score, overall_score, reliability_score, speed_score,
};
