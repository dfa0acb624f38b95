//! Observability module for metrics.
//!
//! Prometheus export of routing, health, eviction and error counters.
//! Tracing setup lives in [`crate::telemetry`].

mod metrics;

pub use metrics::{
    MetricsConfig, MetricsError, init_metrics, record_broker_error, record_health_check,
    record_instance_evicted, record_order_routed, record_price_feed_latency, update_active_tests,
};
