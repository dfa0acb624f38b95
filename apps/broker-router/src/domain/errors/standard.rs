//! The broker-neutral error value.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::codes::{ErrorCategory, ErrorSeverity, StandardErrorCode};
use crate::domain::shared::CorrelationId;

/// Where an error happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Broker that produced the error.
    pub broker_name: Option<String>,
    /// Account involved.
    pub account_id: Option<String>,
    /// Order involved.
    pub order_id: Option<String>,
    /// Instrument involved.
    pub instrument: Option<String>,
    /// Correlation ID of the request.
    pub correlation_id: Option<CorrelationId>,
    /// Additional key/value details.
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl ErrorContext {
    /// Context naming only the broker.
    #[must_use]
    pub fn for_broker(broker_name: impl Into<String>) -> Self {
        Self {
            broker_name: Some(broker_name.into()),
            ..Self::default()
        }
    }
}

/// An error as reported natively by a broker API, before mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeBrokerError {
    /// Broker-native code, e.g. `INSUFFICIENT_MARGIN` or `201`.
    pub code: String,
    /// Broker-native message.
    pub message: String,
    /// HTTP status, when the error came from a REST call.
    pub http_status: Option<u16>,
}

impl NativeBrokerError {
    /// Create a native error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            http_status: None,
        }
    }

    /// Attach an HTTP status.
    #[must_use]
    pub const fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

/// Broker-neutral error.
///
/// Constructed once and never mutated: the `with_*` builders consume the
/// value. The category is always derived from the code.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{}] {message}", .error_code.reason())]
#[serde(from = "RawStandardBrokerError")]
pub struct StandardBrokerError {
    error_code: StandardErrorCode,
    message: String,
    severity: ErrorSeverity,
    category: ErrorCategory,
    broker_error_code: Option<String>,
    broker_error_message: Option<String>,
    retryable: bool,
    retry_after_secs: Option<u64>,
    suggested_action: Option<String>,
    context: ErrorContext,
    timestamp: DateTime<Utc>,
}

/// Deserialization shape. The category on the wire is ignored and
/// recomputed from the code.
#[derive(Deserialize)]
struct RawStandardBrokerError {
    error_code: StandardErrorCode,
    message: String,
    severity: ErrorSeverity,
    #[serde(default)]
    broker_error_code: Option<String>,
    #[serde(default)]
    broker_error_message: Option<String>,
    retryable: bool,
    #[serde(default)]
    retry_after_secs: Option<u64>,
    #[serde(default)]
    suggested_action: Option<String>,
    #[serde(default)]
    context: ErrorContext,
    timestamp: DateTime<Utc>,
}

impl From<RawStandardBrokerError> for StandardBrokerError {
    fn from(raw: RawStandardBrokerError) -> Self {
        Self {
            category: raw.error_code.category(),
            error_code: raw.error_code,
            message: raw.message,
            severity: raw.severity,
            broker_error_code: raw.broker_error_code,
            broker_error_message: raw.broker_error_message,
            retryable: raw.retryable,
            retry_after_secs: raw.retry_after_secs,
            suggested_action: raw.suggested_action,
            context: raw.context,
            timestamp: raw.timestamp,
        }
    }
}

impl StandardBrokerError {
    /// Create an error with the code's default severity and retryability.
    #[must_use]
    pub fn new(code: StandardErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code: code,
            message: message.into(),
            severity: code.default_severity(),
            category: code.category(),
            broker_error_code: None,
            broker_error_message: None,
            retryable: code.default_retryable(),
            retry_after_secs: None,
            suggested_action: None,
            context: ErrorContext::default(),
            timestamp: Utc::now(),
        }
    }

    /// Set the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Set retryability and the backoff hint.
    #[must_use]
    pub const fn with_retry(mut self, retryable: bool, retry_after_secs: Option<u64>) -> Self {
        self.retryable = retryable;
        self.retry_after_secs = retry_after_secs;
        self
    }

    /// Attach the broker-native code and message.
    #[must_use]
    pub fn with_native(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.broker_error_code = Some(code.into());
        self.broker_error_message = Some(message.into());
        self
    }

    /// Set the suggested action.
    #[must_use]
    pub fn with_suggested_action(mut self, action: impl Into<String>) -> Self {
        self.suggested_action = Some(action.into());
        self
    }

    /// Replace the context.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    /// Set the broker name in the context.
    #[must_use]
    pub fn with_broker(mut self, broker_name: impl Into<String>) -> Self {
        self.context.broker_name = Some(broker_name.into());
        self
    }

    /// Set the order ID in the context.
    #[must_use]
    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.context.order_id = Some(order_id.into());
        self
    }

    /// Set the instrument in the context.
    #[must_use]
    pub fn with_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.context.instrument = Some(instrument.into());
        self
    }

    /// Add a detail to the context.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.details.insert(key.into(), value.into());
        self
    }

    /// Standard code.
    #[must_use]
    pub const fn error_code(&self) -> StandardErrorCode {
        self.error_code
    }

    /// Message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Severity.
    #[must_use]
    pub const fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    /// Category, derived from the code.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Broker-native code.
    #[must_use]
    pub fn broker_error_code(&self) -> Option<&str> {
        self.broker_error_code.as_deref()
    }

    /// Broker-native message.
    #[must_use]
    pub fn broker_error_message(&self) -> Option<&str> {
        self.broker_error_message.as_deref()
    }

    /// Whether retrying may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Backoff hint in seconds.
    #[must_use]
    pub const fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after_secs
    }

    /// Suggested remediation.
    #[must_use]
    pub fn suggested_action(&self) -> Option<&str> {
        self.suggested_action.as_deref()
    }

    /// Context.
    #[must_use]
    pub const fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Broker name from the context.
    #[must_use]
    pub fn broker_name(&self) -> Option<&str> {
        self.context.broker_name.as_deref()
    }

    /// Creation time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Convenience constructors for errors raised outside an adapter.
impl StandardBrokerError {
    /// A call exceeded its time budget.
    #[must_use]
    pub fn timeout(operation: &str, secs: u64) -> Self {
        Self::new(
            StandardErrorCode::RequestTimeout,
            format!("{operation} timed out after {secs}s"),
        )
        .with_detail("operation", operation)
    }

    /// Order failed local validation.
    #[must_use]
    pub fn validation(code: StandardErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message).with_retry(false, None)
    }

    /// Required input missing.
    #[must_use]
    pub fn missing_field(field: &str) -> Self {
        Self::validation(
            StandardErrorCode::MissingRequiredField,
            format!("{field} is required"),
        )
        .with_detail("field", field)
    }

    /// Order ID not known to the broker.
    #[must_use]
    pub fn order_not_found(order_id: &str) -> Self {
        Self::new(
            StandardErrorCode::OrderNotFound,
            format!("Order {order_id} not found"),
        )
        .with_order_id(order_id)
    }
}
