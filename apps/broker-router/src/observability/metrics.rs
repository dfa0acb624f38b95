//! Prometheus metrics for the broker router.
//!
//! Counters and histograms for order routing, adapter health, instance
//! eviction, mapped broker errors and A/B test activity. Every function is a
//! no-op until [`init_metrics`] installs a recorder.
//!
//! # Example
//!
//! ```ignore
//! use broker_router::observability::{init_metrics, MetricsConfig};
//!
//! init_metrics(&MetricsConfig::default())?;
//! record_order_routed("oanda", "hash_based", true, 0.042);
//! ```

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for latency measurements (in seconds).
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            // 1ms to 30s; broker REST calls are far slower than in-process work
            latency_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ],
        }
    }
}

impl MetricsConfig {
    /// Create a new metrics configuration with custom address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

/// Initialize the Prometheus metrics exporter.
///
/// This starts an HTTP server that exposes metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the metrics exporter fails to start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(
        addr = %config.listen_addr,
        "Prometheus metrics exporter started"
    );

    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

// ============================================================================
// Routing Metrics
// ============================================================================

/// Record an order routed and placed through the router.
///
/// # Arguments
///
/// * `broker` - Broker the order went to
/// * `strategy` - Routing strategy (e.g., `"hash_based"`, or `"fallback"`)
/// * `success` - Whether placement succeeded
/// * `latency_seconds` - Wall-clock placement latency in seconds
pub fn record_order_routed(broker: &str, strategy: &str, success: bool, latency_seconds: f64) {
    counter!(
        "broker_orders_routed_total",
        "broker" => broker.to_string(),
        "strategy" => strategy.to_string(),
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);

    histogram!(
        "broker_order_latency_seconds",
        "broker" => broker.to_string()
    )
    .record(latency_seconds);
}

/// Update the active A/B tests gauge.
pub fn update_active_tests(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("ab_tests_active").set(count as f64);
}

// ============================================================================
// Registry Metrics
// ============================================================================

/// Record a health check outcome.
///
/// # Arguments
///
/// * `broker` - Broker name
/// * `outcome` - `"healthy"`, `"unhealthy"`, `"error"` or `"timeout"`
pub fn record_health_check(broker: &str, outcome: &str) {
    counter!(
        "broker_health_checks_total",
        "broker" => broker.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an instance evicted after repeated health failures.
pub fn record_instance_evicted(broker: &str) {
    counter!(
        "broker_instances_evicted_total",
        "broker" => broker.to_string()
    )
    .increment(1);
}

// ============================================================================
// Collector Metrics
// ============================================================================

/// Record a timed price fetch made by the metrics collector.
pub fn record_price_feed_latency(broker: &str, success: bool, latency_seconds: f64) {
    histogram!(
        "broker_price_feed_latency_seconds",
        "broker" => broker.to_string(),
        "outcome" => if success { "success" } else { "failure" }
    )
    .record(latency_seconds);
}

// ============================================================================
// Error Metrics
// ============================================================================

/// Record a broker error after mapping to the standard taxonomy.
///
/// # Arguments
///
/// * `broker` - Broker name
/// * `code` - Standard error code reason (e.g., `"INSUFFICIENT_MARGIN"`)
/// * `category` - Error category (e.g., `"business_logic"`)
pub fn record_broker_error(broker: &str, code: &str, category: &str) {
    counter!(
        "broker_errors_total",
        "broker" => broker.to_string(),
        "code" => code.to_string(),
        "category" => category.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_order_routed("paper", "random", true, 0.01);
        record_health_check("paper", "healthy");
        record_instance_evicted("paper");
        record_broker_error("paper", "UNKNOWN_ERROR", "technical");
        update_active_tests(2);
    }

    #[test]
    fn default_config_listens_on_9090() {
        assert_eq!(MetricsConfig::default().listen_addr.port(), 9090);
    }
}
