//! Error Taxonomy
//!
//! A closed vocabulary of broker errors. Adapters translate native broker
//! errors into [`StandardBrokerError`] once, at the adapter boundary;
//! everything above the adapter only sees standard errors.

mod codes;
mod standard;

pub use codes::{ErrorCategory, ErrorSeverity, StandardErrorCode};
pub use standard::{ErrorContext, NativeBrokerError, StandardBrokerError};

use serde::{Deserialize, Serialize};

/// One row of the native-to-standard mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMapping {
    /// Standard code the native code maps to.
    pub code: StandardErrorCode,
    /// Severity.
    pub severity: ErrorSeverity,
    /// Whether retrying may succeed.
    pub retryable: bool,
    /// Backoff hint in seconds.
    pub retry_after_secs: Option<u64>,
    /// Remediation hint shown to operators.
    pub suggested_action: Option<String>,
}

impl ErrorMapping {
    /// Mapping with the code's default severity and retryability.
    #[must_use]
    pub const fn new(code: StandardErrorCode) -> Self {
        Self {
            code,
            severity: code.default_severity(),
            retryable: code.default_retryable(),
            retry_after_secs: None,
            suggested_action: None,
        }
    }

    /// Override the severity.
    #[must_use]
    pub const fn severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Mark as retryable after the given backoff.
    #[must_use]
    pub const fn retry_after(mut self, secs: u64) -> Self {
        self.retryable = true;
        self.retry_after_secs = Some(secs);
        self
    }

    /// Mark as not retryable.
    #[must_use]
    pub const fn no_retry(mut self) -> Self {
        self.retryable = false;
        self.retry_after_secs = None;
        self
    }

    /// Set the suggested action.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.suggested_action = Some(action.into());
        self
    }

    /// The mapping used for unknown native codes.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            code: StandardErrorCode::UnknownError,
            severity: ErrorSeverity::Medium,
            retryable: false,
            retry_after_secs: None,
            suggested_action: None,
        }
    }
}
