// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Broker Router - Rust Core Library
//!
//! Multi-broker abstraction, routing and comparison engine.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Broker-neutral types with no infrastructure dependencies
//!   - `order_execution`: Order requests, results, executions, transactions
//!   - `errors`: Standard error codes, categories and severities
//!   - `capability`: Broker features, descriptors and discovered profiles
//!   - `ab_testing`: Experiment configuration, lifecycle and results
//!   - `performance`: Samples, benchmarks, scores and comparisons
//!   - `statistics`: Summary statistics and Welch's t-test
//!
//! - **Application**: Ports and long-lived services
//!   - `ports`: The `BrokerAdapter` contract and transaction recorders
//!   - `services`: Registry, error mapping, discovery, traffic router,
//!     metrics collector and comparison engine
//!
//! - **Infrastructure**: Adapters
//!   - `broker::paper`: In-process simulated broker
//!   - `export`: JSON report files
//!
//! Cross-cutting: [`config`] (layered YAML with hot reload),
//! [`observability`] (Prometheus metrics) and [`telemetry`] (tracing).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core types with no external dependencies.
pub mod domain;

/// Application layer - Ports and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// Layered configuration and hot reload.
pub mod config;

/// Prometheus metrics.
pub mod observability;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::ab_testing::{
    ABTestConfig, ABTestResults, RoutingStrategy, TestMetric, TestStatus, TrafficSplit,
};
pub use domain::capability::{BrokerCapability, BrokerCapabilityProfile, BrokerDescriptor};
pub use domain::errors::{ErrorCategory, ErrorSeverity, StandardBrokerError, StandardErrorCode};
pub use domain::order_execution::{
    BrokerOrder, OrderExecution, OrderResult, OrderSide, OrderStatus, OrderType, TimeInForce,
};
pub use domain::performance::{BrokerBenchmark, BrokerComparison, PerformanceSample};
pub use domain::shared::{BrokerOrderId, InstanceId, TestId};

// Application re-exports
pub use application::ports::{BrokerAdapter, BrokerResult, Credentials, TransactionRecorders};
pub use application::services::{
    BrokerRegistry, CapabilityDiscoveryService, ComparisonEngine, ErrorMapper,
    PerformanceMetricsCollector, TrafficRouter,
};

// Infrastructure re-exports
pub use infrastructure::broker::{PaperBroker, PaperConfig, PaperControls};

// Config re-exports
pub use config::{AppConfig, ConfigError, ConfigManager, Environment};
