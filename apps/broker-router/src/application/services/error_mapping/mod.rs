//! Error Mapping Service
//!
//! Translates `(broker, native code)` pairs into [`StandardBrokerError`]s
//! through a lookup table. The table is the mapper's only mutable state and
//! only grows: [`ErrorMapper::add_mapping`] inserts or replaces a row, there
//! is no removal. Every mapped error is also appended to the mapper's
//! [`ErrorAggregator`].

mod aggregator;
mod defaults;

pub use aggregator::{BrokerErrorStats, ErrorAggregator, ErrorSummary};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::errors::{
    ErrorContext, ErrorMapping, NativeBrokerError, StandardBrokerError, StandardErrorCode,
};
use crate::observability;

/// Native-to-standard error translator.
#[derive(Debug, Default)]
pub struct ErrorMapper {
    /// broker (lowercase) -> native code -> mapping
    tables: RwLock<HashMap<String, HashMap<String, ErrorMapping>>>,
    aggregator: Arc<ErrorAggregator>,
}

impl ErrorMapper {
    /// Create a mapper with an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mapper preloaded with the OANDA, Interactive Brokers, Alpaca
    /// and paper broker tables.
    #[must_use]
    pub fn with_default_mappings() -> Self {
        let mapper = Self::new();
        for (broker, rows) in defaults::default_tables() {
            for (native_code, mapping) in rows {
                mapper.add_mapping(broker, native_code, mapping);
            }
        }
        mapper
    }

    /// Record mapped errors into a shared aggregator.
    #[must_use]
    pub fn with_aggregator(mut self, aggregator: Arc<ErrorAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Aggregator receiving every mapped error.
    #[must_use]
    pub fn aggregator(&self) -> Arc<ErrorAggregator> {
        Arc::clone(&self.aggregator)
    }

    /// Add or replace one mapping row.
    pub fn add_mapping(&self, broker: &str, native_code: impl Into<String>, mapping: ErrorMapping) {
        self.tables
            .write()
            .entry(broker.to_ascii_lowercase())
            .or_default()
            .insert(native_code.into(), mapping);
    }

    /// Look up a mapping row.
    #[must_use]
    pub fn lookup(&self, broker: &str, native_code: &str) -> Option<ErrorMapping> {
        self.tables
            .read()
            .get(&broker.to_ascii_lowercase())
            .and_then(|rows| rows.get(native_code))
            .cloned()
    }

    /// Number of rows for a broker.
    #[must_use]
    pub fn mapping_count(&self, broker: &str) -> usize {
        self.tables
            .read()
            .get(&broker.to_ascii_lowercase())
            .map_or(0, HashMap::len)
    }

    /// Brokers with at least one mapping row, sorted.
    #[must_use]
    pub fn brokers(&self) -> Vec<String> {
        let mut brokers: Vec<String> = self.tables.read().keys().cloned().collect();
        brokers.sort();
        brokers
    }

    /// Map a native error code. Unknown pairs become `UnknownError` with
    /// medium severity and no retry.
    #[must_use]
    pub fn map_error(
        &self,
        broker: &str,
        native_code: &str,
        message: &str,
        context: Option<ErrorContext>,
    ) -> StandardBrokerError {
        let mapping = self.lookup(broker, native_code).unwrap_or_else(|| {
            tracing::debug!(broker, native_code, "No error mapping, using UNKNOWN_ERROR");
            ErrorMapping::unknown()
        });
        self.finish(broker, build_error(broker, native_code, message, &mapping, context))
    }

    /// Map a native error, falling back to its HTTP status when the code
    /// has no row.
    #[must_use]
    pub fn map_native(
        &self,
        broker: &str,
        native: &NativeBrokerError,
        context: Option<ErrorContext>,
    ) -> StandardBrokerError {
        if self.lookup(broker, &native.code).is_none()
            && let Some(mapping) = native.http_status.and_then(defaults::http_status_mapping)
        {
            let error = build_error(broker, &native.code, &native.message, &mapping, context);
            return self.finish(broker, error);
        }
        self.map_error(broker, &native.code, &native.message, context)
    }

    fn finish(&self, broker: &str, error: StandardBrokerError) -> StandardBrokerError {
        observability::record_broker_error(
            broker,
            error.error_code().reason(),
            error.category().as_str(),
        );
        self.aggregator.record(error.clone());
        error
    }
}

fn build_error(
    broker: &str,
    native_code: &str,
    message: &str,
    mapping: &ErrorMapping,
    context: Option<ErrorContext>,
) -> StandardBrokerError {
    let mut context = context.unwrap_or_default();
    if context.broker_name.is_none() {
        context.broker_name = Some(broker.to_string());
    }

    let text = if mapping.code == StandardErrorCode::UnknownError {
        format!("Unmapped {broker} error {native_code}: {message}")
    } else {
        message.to_string()
    };

    let mut error = StandardBrokerError::new(mapping.code, text)
        .with_severity(mapping.severity)
        .with_retry(mapping.retryable, mapping.retry_after_secs)
        .with_native(native_code, message)
        .with_context(context);
    if let Some(action) = &mapping.suggested_action {
        error = error.with_suggested_action(action.clone());
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{ErrorCategory, ErrorSeverity};

    #[test]
    fn oanda_insufficient_margin() {
        let mapper = ErrorMapper::with_default_mappings();
        let error = mapper.map_error("oanda", "INSUFFICIENT_MARGIN", "Margin too low", None);
        assert_eq!(error.error_code(), StandardErrorCode::InsufficientMargin);
        assert!(!error.is_retryable());
        assert_eq!(error.category(), ErrorCategory::BusinessLogic);
        assert_eq!(error.broker_name(), Some("oanda"));
        assert_eq!(error.broker_error_code(), Some("INSUFFICIENT_MARGIN"));
        assert_eq!(error.message(), "Margin too low");
    }

    #[test]
    fn unknown_pair_maps_to_unknown_error() {
        let mapper = ErrorMapper::with_default_mappings();
        let error = mapper.map_error("oanda", "SOMETHING_NEW", "???", None);
        assert_eq!(error.error_code(), StandardErrorCode::UnknownError);
        assert_eq!(error.severity(), ErrorSeverity::Medium);
        assert!(!error.is_retryable());

        let error = mapper.map_error("unlisted-broker", "X", "", None);
        assert_eq!(error.error_code(), StandardErrorCode::UnknownError);
    }

    #[test]
    fn broker_name_is_case_insensitive() {
        let mapper = ErrorMapper::with_default_mappings();
        let error = mapper.map_error("OANDA", "RATE_LIMIT_EXCEEDED", "slow down", None);
        assert_eq!(error.error_code(), StandardErrorCode::RateLimitExceeded);
        assert!(error.is_retryable());
        assert!(error.retry_after_secs().is_some());
    }

    #[test]
    fn add_mapping_extends_table() {
        let mapper = ErrorMapper::new();
        assert_eq!(mapper.mapping_count("acme"), 0);
        mapper.add_mapping(
            "acme",
            "E42",
            ErrorMapping::new(StandardErrorCode::StalePrice)
                .retry_after(3)
                .action("Refresh quotes"),
        );
        let error = mapper.map_error("acme", "E42", "stale", None);
        assert_eq!(error.error_code(), StandardErrorCode::StalePrice);
        assert_eq!(error.retry_after_secs(), Some(3));
        assert_eq!(error.suggested_action(), Some("Refresh quotes"));
        assert_eq!(mapper.brokers(), vec!["acme".to_string()]);
    }

    #[test]
    fn context_is_preserved() {
        let mapper = ErrorMapper::with_default_mappings();
        let context = ErrorContext {
            order_id: Some("o-1".to_string()),
            ..ErrorContext::default()
        };
        let error = mapper.map_error("ib", "201", "Order rejected", Some(context));
        assert_eq!(error.context().order_id.as_deref(), Some("o-1"));
        assert_eq!(error.broker_name(), Some("ib"));
    }

    #[test]
    fn http_status_fallback() {
        let mapper = ErrorMapper::with_default_mappings();
        let native = NativeBrokerError::new("???", "Too many requests").with_http_status(429);
        let error = mapper.map_native("alpaca", &native, None);
        assert_eq!(error.error_code(), StandardErrorCode::RateLimitExceeded);

        let native = NativeBrokerError::new("???", "teapot").with_http_status(418);
        let error = mapper.map_native("alpaca", &native, None);
        assert_eq!(error.error_code(), StandardErrorCode::UnknownError);
    }

    #[test]
    fn mapped_errors_reach_shared_aggregator() {
        let aggregator = Arc::new(ErrorAggregator::default());
        let mapper = ErrorMapper::with_default_mappings().with_aggregator(Arc::clone(&aggregator));

        let _ = mapper.map_error("oanda", "INSUFFICIENT_MARGIN", "Margin too low", None);
        let native = NativeBrokerError::new("???", "Too many requests").with_http_status(429);
        let _ = mapper.map_native("alpaca", &native, None);

        assert_eq!(aggregator.len(), 2);
        assert!(Arc::ptr_eq(&aggregator, &mapper.aggregator()));
        let summary = aggregator.error_summary(chrono::TimeDelta::hours(1));
        assert_eq!(summary.by_broker["oanda"], 1);
        assert_eq!(summary.by_broker["alpaca"], 1);
        assert_eq!(summary.by_code[&StandardErrorCode::InsufficientMargin], 1);
    }
}
