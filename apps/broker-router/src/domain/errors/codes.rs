//! Standard error codes, categories and severities.
//!
//! The code set is closed. Every code belongs to exactly one category through
//! the fixed table in [`StandardErrorCode::category`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Credentials and sessions.
    Authentication,
    /// Permissions and account restrictions.
    Authorization,
    /// Malformed requests.
    Validation,
    /// Requests the broker understood but refused.
    BusinessLogic,
    /// Transport, availability and throttling.
    Technical,
    /// Rules imposed by regulators.
    Regulatory,
    /// Quotes and historical data.
    MarketData,
}

impl ErrorCategory {
    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Validation => "validation",
            Self::BusinessLogic => "business_logic",
            Self::Technical => "technical",
            Self::Regulatory => "regulatory",
            Self::MarketData => "market_data",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Informational, no action needed.
    Low,
    /// Needs attention.
    #[default]
    Medium,
    /// Blocks trading on the affected request.
    High,
    /// Blocks trading on the broker.
    Critical,
}

impl ErrorSeverity {
    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker-neutral error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StandardErrorCode {
    // Authentication
    /// Login rejected.
    AuthenticationFailed,
    /// Credentials malformed or unknown.
    InvalidCredentials,
    /// Session or token expired.
    SessionExpired,

    // Authorization
    /// Credentials lack the needed permission.
    InsufficientPermissions,
    /// Account restricted from the operation.
    AccountRestricted,
    /// Account suspended or closed.
    AccountSuspended,
    /// Trading disabled for the account or instrument.
    TradingDisabled,

    // Validation
    /// Unknown or unsupported instrument.
    InvalidInstrument,
    /// Unsupported order type.
    InvalidOrderType,
    /// Units missing, zero, negative or outside bounds.
    InvalidUnits,
    /// Price missing or invalid.
    InvalidPrice,
    /// Unsupported time in force.
    InvalidTimeInForce,
    /// Stop-loss on the wrong side of the market.
    InvalidStopLoss,
    /// Take-profit on the wrong side of the market.
    InvalidTakeProfit,
    /// A required request field is absent.
    MissingRequiredField,

    // Business logic
    /// Not enough margin for the order.
    InsufficientMargin,
    /// Not enough cash for the order.
    InsufficientFunds,
    /// Position size limit reached.
    PositionLimitExceeded,
    /// Order ID unknown.
    OrderNotFound,
    /// No position in the instrument.
    PositionNotFound,
    /// Order already filled.
    OrderAlreadyFilled,
    /// Order already canceled.
    OrderAlreadyCancelled,
    /// Market closed for the instrument.
    MarketClosed,
    /// Instrument halted or not tradeable.
    InstrumentNotTradeable,
    /// Client order ID reused.
    DuplicateOrder,

    // Technical
    /// Could not reach the broker.
    ConnectionError,
    /// The broker did not answer in time.
    RequestTimeout,
    /// Throttled by the broker.
    RateLimitExceeded,
    /// Broker down or in maintenance.
    ServiceUnavailable,
    /// Broker-side internal failure.
    InternalError,
    /// Response could not be parsed.
    InvalidResponse,

    // Regulatory
    /// Generic regulatory block.
    RegulatoryRestriction,
    /// Pattern day trader rule.
    PatternDayTrader,
    /// First-in-first-out rule.
    FifoViolation,
    /// Hedging prohibited for the account.
    HedgingNotAllowed,
    /// Leverage above the regulatory maximum.
    LeverageLimitExceeded,

    // Market data
    /// No price available.
    PriceUnavailable,
    /// Price too old to trade on.
    StalePrice,
    /// Market data subscription missing.
    MarketDataSubscriptionRequired,
    /// Historical data not available for the request.
    HistoricalDataUnavailable,

    /// Native error with no mapping.
    UnknownError,
}

impl StandardErrorCode {
    /// Every code other than `UnknownError`, grouped by category.
    pub const ALL: [Self; 40] = [
        Self::AuthenticationFailed,
        Self::InvalidCredentials,
        Self::SessionExpired,
        Self::InsufficientPermissions,
        Self::AccountRestricted,
        Self::AccountSuspended,
        Self::TradingDisabled,
        Self::InvalidInstrument,
        Self::InvalidOrderType,
        Self::InvalidUnits,
        Self::InvalidPrice,
        Self::InvalidTimeInForce,
        Self::InvalidStopLoss,
        Self::InvalidTakeProfit,
        Self::MissingRequiredField,
        Self::InsufficientMargin,
        Self::InsufficientFunds,
        Self::PositionLimitExceeded,
        Self::OrderNotFound,
        Self::PositionNotFound,
        Self::OrderAlreadyFilled,
        Self::OrderAlreadyCancelled,
        Self::MarketClosed,
        Self::InstrumentNotTradeable,
        Self::DuplicateOrder,
        Self::ConnectionError,
        Self::RequestTimeout,
        Self::RateLimitExceeded,
        Self::ServiceUnavailable,
        Self::InternalError,
        Self::InvalidResponse,
        Self::RegulatoryRestriction,
        Self::PatternDayTrader,
        Self::FifoViolation,
        Self::HedgingNotAllowed,
        Self::LeverageLimitExceeded,
        Self::PriceUnavailable,
        Self::StalePrice,
        Self::MarketDataSubscriptionRequired,
        Self::HistoricalDataUnavailable,
    ];

    /// Category of the code. Fixed, not configurable.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationFailed | Self::InvalidCredentials | Self::SessionExpired => {
                ErrorCategory::Authentication
            }
            Self::InsufficientPermissions
            | Self::AccountRestricted
            | Self::AccountSuspended
            | Self::TradingDisabled => ErrorCategory::Authorization,
            Self::InvalidInstrument
            | Self::InvalidOrderType
            | Self::InvalidUnits
            | Self::InvalidPrice
            | Self::InvalidTimeInForce
            | Self::InvalidStopLoss
            | Self::InvalidTakeProfit
            | Self::MissingRequiredField => ErrorCategory::Validation,
            Self::InsufficientMargin
            | Self::InsufficientFunds
            | Self::PositionLimitExceeded
            | Self::OrderNotFound
            | Self::PositionNotFound
            | Self::OrderAlreadyFilled
            | Self::OrderAlreadyCancelled
            | Self::MarketClosed
            | Self::InstrumentNotTradeable
            | Self::DuplicateOrder => ErrorCategory::BusinessLogic,
            Self::ConnectionError
            | Self::RequestTimeout
            | Self::RateLimitExceeded
            | Self::ServiceUnavailable
            | Self::InternalError
            | Self::InvalidResponse
            | Self::UnknownError => ErrorCategory::Technical,
            Self::RegulatoryRestriction
            | Self::PatternDayTrader
            | Self::FifoViolation
            | Self::HedgingNotAllowed
            | Self::LeverageLimitExceeded => ErrorCategory::Regulatory,
            Self::PriceUnavailable
            | Self::StalePrice
            | Self::MarketDataSubscriptionRequired
            | Self::HistoricalDataUnavailable => ErrorCategory::MarketData,
        }
    }

    /// Severity used when a mapping does not specify one.
    #[must_use]
    pub const fn default_severity(&self) -> ErrorSeverity {
        match self {
            Self::AccountSuspended | Self::ServiceUnavailable => ErrorSeverity::Critical,
            Self::UnknownError => ErrorSeverity::Medium,
            _ => match self.category() {
                ErrorCategory::Authentication
                | ErrorCategory::Authorization
                | ErrorCategory::Regulatory => ErrorSeverity::High,
                ErrorCategory::Validation => ErrorSeverity::Low,
                ErrorCategory::BusinessLogic
                | ErrorCategory::Technical
                | ErrorCategory::MarketData => ErrorSeverity::Medium,
            },
        }
    }

    /// Whether retrying the same request may succeed, absent a mapping.
    #[must_use]
    pub const fn default_retryable(&self) -> bool {
        matches!(
            self,
            Self::SessionExpired
                | Self::ConnectionError
                | Self::RequestTimeout
                | Self::RateLimitExceeded
                | Self::ServiceUnavailable
                | Self::InternalError
                | Self::PriceUnavailable
                | Self::StalePrice
        )
    }

    /// Stable SCREAMING_SNAKE_CASE name for logs and metrics labels.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::AccountRestricted => "ACCOUNT_RESTRICTED",
            Self::AccountSuspended => "ACCOUNT_SUSPENDED",
            Self::TradingDisabled => "TRADING_DISABLED",
            Self::InvalidInstrument => "INVALID_INSTRUMENT",
            Self::InvalidOrderType => "INVALID_ORDER_TYPE",
            Self::InvalidUnits => "INVALID_UNITS",
            Self::InvalidPrice => "INVALID_PRICE",
            Self::InvalidTimeInForce => "INVALID_TIME_IN_FORCE",
            Self::InvalidStopLoss => "INVALID_STOP_LOSS",
            Self::InvalidTakeProfit => "INVALID_TAKE_PROFIT",
            Self::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            Self::InsufficientMargin => "INSUFFICIENT_MARGIN",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::PositionLimitExceeded => "POSITION_LIMIT_EXCEEDED",
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::PositionNotFound => "POSITION_NOT_FOUND",
            Self::OrderAlreadyFilled => "ORDER_ALREADY_FILLED",
            Self::OrderAlreadyCancelled => "ORDER_ALREADY_CANCELLED",
            Self::MarketClosed => "MARKET_CLOSED",
            Self::InstrumentNotTradeable => "INSTRUMENT_NOT_TRADEABLE",
            Self::DuplicateOrder => "DUPLICATE_ORDER",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::RegulatoryRestriction => "REGULATORY_RESTRICTION",
            Self::PatternDayTrader => "PATTERN_DAY_TRADER",
            Self::FifoViolation => "FIFO_VIOLATION",
            Self::HedgingNotAllowed => "HEDGING_NOT_ALLOWED",
            Self::LeverageLimitExceeded => "LEVERAGE_LIMIT_EXCEEDED",
            Self::PriceUnavailable => "PRICE_UNAVAILABLE",
            Self::StalePrice => "STALE_PRICE",
            Self::MarketDataSubscriptionRequired => "MARKET_DATA_SUBSCRIPTION_REQUIRED",
            Self::HistoricalDataUnavailable => "HISTORICAL_DATA_UNAVAILABLE",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for StandardErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}
