//! Broker Adapter Port (Driven Port)
//!
//! The single surface every concrete broker client implements. Adapters
//! translate native errors into [`StandardBrokerError`] at this boundary,
//! so nothing above an adapter ever sees a broker-specific error.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::account::{AccountSummary, Position};
use crate::domain::capability::{BrokerCapability, BrokerDescriptor};
use crate::domain::errors::{NativeBrokerError, StandardBrokerError, StandardErrorCode};
use crate::domain::market_data::{Candle, HistoricalDataRequest, PriceTick};
use crate::domain::order_execution::{
    BrokerOrder, OrderFilter, OrderInfo, OrderModification, OrderResult, OrderType, TimeInForce,
};
use crate::domain::shared::{AccountId, BrokerOrderId};

/// Lazy, unbounded price stream. The consumer cancels by dropping it.
pub type PriceStream = BoxStream<'static, Result<PriceTick, StandardBrokerError>>;

/// Result alias for adapter calls.
pub type BrokerResult<T> = Result<T, StandardBrokerError>;

/// Broker login credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// API key or token.
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret.
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Default account.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Broker environment (e.g. `practice`, `live`, `paper`).
    #[serde(default)]
    pub environment: Option<String>,
    /// Broker-specific extra fields.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Credentials {
    /// Credentials with only an API key.
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
            .field("account_id", &self.account_id)
            .field("environment", &self.environment)
            .field("extra_keys", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Health status reported by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational with issues.
    Degraded,
    /// Not operational.
    Unhealthy,
}

/// Result of an adapter health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Round-trip latency measured by the adapter, in milliseconds.
    pub latency_ms: Option<f64>,
    /// Adapter-specific fields.
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl HealthReport {
    /// A healthy report.
    #[must_use]
    pub const fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            latency_ms: None,
            details: BTreeMap::new(),
        }
    }

    /// An unhealthy report with a reason.
    #[must_use]
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        let mut details = BTreeMap::new();
        details.insert("reason".to_string(), reason.into());
        Self {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            details,
        }
    }

    /// Returns true for [`HealthStatus::Healthy`].
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Port implemented by every broker client.
///
/// All async operations may block on network I/O; callers bound them with
/// timeouts. `validate_order` and `map_error` are pure and local.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Identity and declared capabilities.
    fn descriptor(&self) -> &BrokerDescriptor;

    /// Log in. `Ok(false)` means the broker rejected the credentials.
    async fn authenticate(&self, credentials: &Credentials) -> BrokerResult<bool>;

    /// Close sessions and streams.
    async fn disconnect(&self) -> BrokerResult<bool>;

    /// Probe connectivity.
    async fn health_check(&self) -> BrokerResult<HealthReport>;

    /// Summary of one account (the default account when `None`).
    async fn get_account_summary(&self, account_id: Option<AccountId>)
    -> BrokerResult<AccountSummary>;

    /// Every account reachable with the current credentials.
    async fn get_accounts(&self) -> BrokerResult<Vec<AccountSummary>>;

    /// Submit an order.
    async fn place_order(&self, order: &BrokerOrder) -> BrokerResult<OrderResult>;

    /// Change an open order.
    async fn modify_order(
        &self,
        order_id: &BrokerOrderId,
        modification: &OrderModification,
    ) -> BrokerResult<OrderResult>;

    /// Cancel an open order.
    async fn cancel_order(&self, order_id: &BrokerOrderId) -> BrokerResult<OrderResult>;

    /// Fetch one order.
    async fn get_order(&self, order_id: &BrokerOrderId) -> BrokerResult<OrderInfo>;

    /// Fetch orders matching a filter.
    async fn get_orders(&self, filter: &OrderFilter) -> BrokerResult<Vec<OrderInfo>>;

    /// Position in one instrument, `None` when flat.
    async fn get_position(
        &self,
        instrument: &str,
        account_id: Option<AccountId>,
    ) -> BrokerResult<Option<Position>>;

    /// All open positions.
    async fn get_positions(&self, account_id: Option<AccountId>) -> BrokerResult<Vec<Position>>;

    /// Close a position fully (`units == None`) or partially.
    async fn close_position(
        &self,
        instrument: &str,
        units: Option<Decimal>,
        account_id: Option<AccountId>,
    ) -> BrokerResult<OrderResult>;

    /// Latest quote for one instrument. Fails on an empty instrument.
    async fn get_current_price(&self, instrument: &str) -> BrokerResult<PriceTick>;

    /// Latest quotes for several instruments. Fails on an empty list.
    async fn get_current_prices(&self, instruments: &[String]) -> BrokerResult<Vec<PriceTick>>;

    /// Open a quote stream.
    async fn stream_prices(&self, instruments: &[String]) -> BrokerResult<PriceStream>;

    /// Historical candles.
    async fn get_historical_data(
        &self,
        request: &HistoricalDataRequest,
    ) -> BrokerResult<Vec<Candle>>;

    /// Check an order locally against the declared capabilities.
    /// Returns one entry per problem; empty means valid.
    fn validate_order(&self, order: &BrokerOrder) -> Vec<OrderValidationError> {
        validate_order_against(self.descriptor(), order)
    }

    /// Translate a native broker error.
    fn map_error(&self, native: &NativeBrokerError) -> StandardBrokerError;
}

/// One problem found by local order validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderValidationError {
    /// Blank instrument.
    #[error("Instrument is required")]
    MissingInstrument,

    /// Instrument outside the broker's list.
    #[error("Instrument {instrument} is not supported by {broker}")]
    UnsupportedInstrument {
        /// Requested instrument.
        instrument: String,
        /// Broker display name.
        broker: String,
    },

    /// Order type the broker does not accept.
    #[error("Order type {order_type} is not supported by {broker}")]
    UnsupportedOrderType {
        /// Requested type.
        order_type: OrderType,
        /// Broker display name.
        broker: String,
    },

    /// Time in force the broker does not accept.
    #[error("Time in force {time_in_force} is not supported by {broker}")]
    UnsupportedTimeInForce {
        /// Requested time in force.
        time_in_force: TimeInForce,
        /// Broker display name.
        broker: String,
    },

    /// Zero or negative units.
    #[error("Units must be positive")]
    NonPositiveUnits,

    /// Units under the minimum trade size.
    #[error("Units {units} below minimum trade size {min}")]
    BelowMinimumUnits {
        /// Requested units.
        units: Decimal,
        /// Minimum trade size.
        min: Decimal,
    },

    /// Units over the maximum trade size.
    #[error("Units {units} above maximum trade size {max}")]
    AboveMaximumUnits {
        /// Requested units.
        units: Decimal,
        /// Maximum trade size.
        max: Decimal,
    },

    /// Fractional units at a broker without `FractionalUnits`.
    #[error("Fractional units are not supported by {broker}")]
    FractionalUnits {
        /// Broker display name.
        broker: String,
    },

    /// Limit or stop order without a price.
    #[error("Price is required for {0} orders")]
    MissingPrice(OrderType),

    /// Zero or negative price.
    #[error("Price must be positive")]
    NonPositivePrice,

    /// Trailing stop without a distance.
    #[error("Trailing distance is required for TRAILING_STOP orders")]
    MissingTrailingDistance,

    /// Zero or negative trailing distance.
    #[error("Trailing distance must be positive")]
    NonPositiveTrailingDistance,

    /// GTD order without an expiry.
    #[error("Expiry is required for GTD orders")]
    MissingExpiry,
}

/// Validate an order against a broker descriptor. Pure, no I/O.
#[must_use]
pub fn validate_order_against(
    descriptor: &BrokerDescriptor,
    order: &BrokerOrder,
) -> Vec<OrderValidationError> {
    let mut errors = Vec::new();
    let broker = || descriptor.display_name.clone();

    if order.instrument.trim().is_empty() {
        errors.push(OrderValidationError::MissingInstrument);
    } else if !descriptor.supports_instrument(&order.instrument) {
        errors.push(OrderValidationError::UnsupportedInstrument {
            instrument: order.instrument.clone(),
            broker: broker(),
        });
    }

    if !descriptor.supported_order_types.contains(&order.order_type) {
        errors.push(OrderValidationError::UnsupportedOrderType {
            order_type: order.order_type,
            broker: broker(),
        });
    }

    if !descriptor.supported_time_in_force.is_empty()
        && !descriptor
            .supported_time_in_force
            .contains(&order.time_in_force)
    {
        errors.push(OrderValidationError::UnsupportedTimeInForce {
            time_in_force: order.time_in_force,
            broker: broker(),
        });
    }

    if order.units <= Decimal::ZERO {
        errors.push(OrderValidationError::NonPositiveUnits);
    } else {
        let limits = &descriptor.trading_limits;
        if order.units < limits.min_units {
            errors.push(OrderValidationError::BelowMinimumUnits {
                units: order.units,
                min: limits.min_units,
            });
        }
        if let Some(max) = limits.max_units
            && order.units > max
        {
            errors.push(OrderValidationError::AboveMaximumUnits {
                units: order.units,
                max,
            });
        }
        if order.units.fract() != Decimal::ZERO
            && !descriptor.supports(BrokerCapability::FractionalUnits)
        {
            errors.push(OrderValidationError::FractionalUnits { broker: broker() });
        }
    }

    if order.order_type.requires_price() {
        match order.price {
            None => errors.push(OrderValidationError::MissingPrice(order.order_type)),
            Some(price) if price <= Decimal::ZERO => {
                errors.push(OrderValidationError::NonPositivePrice);
            }
            Some(_) => {}
        }
    }

    if order.order_type == OrderType::TrailingStop {
        match order.trailing_distance {
            None => errors.push(OrderValidationError::MissingTrailingDistance),
            Some(distance) if distance <= Decimal::ZERO => {
                errors.push(OrderValidationError::NonPositiveTrailingDistance);
            }
            Some(_) => {}
        }
    }

    if order.time_in_force == TimeInForce::Gtd && order.expiry.is_none() {
        errors.push(OrderValidationError::MissingExpiry);
    }

    errors
}

/// Join validation problems into one message.
#[must_use]
pub fn describe_problems(problems: &[OrderValidationError]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Reject an empty instrument symbol.
///
/// # Errors
///
/// Returns `MissingRequiredField` when `instrument` is blank.
pub fn require_instrument(instrument: &str) -> BrokerResult<()> {
    if instrument.trim().is_empty() {
        return Err(StandardBrokerError::missing_field("instrument"));
    }
    Ok(())
}

/// Reject an empty instrument list or any blank symbol in it.
///
/// # Errors
///
/// Returns `MissingRequiredField` when the list is empty or contains a blank
/// symbol.
pub fn require_instruments(instruments: &[String]) -> BrokerResult<()> {
    if instruments.is_empty() {
        return Err(StandardBrokerError::missing_field("instruments"));
    }
    for instrument in instruments {
        require_instrument(instrument)?;
    }
    Ok(())
}

/// Error for calls an adapter does not implement.
#[must_use]
pub fn not_supported(broker: &str, operation: &str) -> StandardBrokerError {
    StandardBrokerError::new(
        StandardErrorCode::ServiceUnavailable,
        format!("{operation} is not supported by {broker}"),
    )
    .with_retry(false, None)
    .with_broker(broker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::OrderSide;
    use rust_decimal_macros::dec;

    fn descriptor() -> BrokerDescriptor {
        BrokerDescriptor::new("test", "Test Broker", "v1")
            .with_capabilities([BrokerCapability::MarketOrders, BrokerCapability::LimitOrders])
            .with_instruments(["EUR_USD", "GBP_USD"])
            .with_order_types([OrderType::Market, OrderType::Limit, OrderType::TrailingStop])
            .with_time_in_force([TimeInForce::Gtc, TimeInForce::Fok, TimeInForce::Gtd])
    }

    #[test]
    fn well_formed_market_order_is_valid() {
        let order = BrokerOrder::market("EUR_USD", OrderSide::Buy, dec!(1000));
        assert!(validate_order_against(&descriptor(), &order).is_empty());
    }

    #[test]
    fn limit_order_without_price_is_invalid() {
        let mut order = BrokerOrder::limit("EUR_USD", OrderSide::Buy, dec!(1000), dec!(1.1));
        order.price = None;
        let errors = validate_order_against(&descriptor(), &order);
        assert_eq!(errors, vec![OrderValidationError::MissingPrice(OrderType::Limit)]);
        assert_eq!(errors[0].to_string(), "Price is required for LIMIT orders");
    }

    #[test]
    fn unsupported_instrument_and_type() {
        let order = BrokerOrder::new("USD_JPY", OrderSide::Sell, OrderType::Stop, dec!(10))
            .with_price(dec!(150));
        let errors = validate_order_against(&descriptor(), &order);
        assert!(errors.iter().any(|e| matches!(
            e,
            OrderValidationError::UnsupportedInstrument { instrument, .. } if instrument == "USD_JPY"
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            OrderValidationError::UnsupportedOrderType { order_type: OrderType::Stop, .. }
        )));
        assert!(describe_problems(&errors).contains("Order type STOP is not supported by Test Broker"));
    }

    #[test]
    fn non_positive_and_fractional_units() {
        let order = BrokerOrder::market("EUR_USD", OrderSide::Buy, dec!(0));
        let errors = validate_order_against(&descriptor(), &order);
        assert_eq!(errors, vec![OrderValidationError::NonPositiveUnits]);

        let order = BrokerOrder::market("EUR_USD", OrderSide::Buy, dec!(10.5));
        let errors = validate_order_against(&descriptor(), &order);
        assert_eq!(
            errors,
            vec![OrderValidationError::FractionalUnits {
                broker: "Test Broker".to_string()
            }]
        );
    }

    #[test]
    fn trailing_stop_and_gtd_requirements() {
        let order = BrokerOrder::new("EUR_USD", OrderSide::Buy, OrderType::TrailingStop, dec!(10))
            .with_time_in_force(TimeInForce::Gtd);
        let errors = validate_order_against(&descriptor(), &order);
        assert!(errors.contains(&OrderValidationError::MissingTrailingDistance));
        assert!(errors.contains(&OrderValidationError::MissingExpiry));
    }

    #[test]
    fn instrument_guards() {
        assert!(require_instrument("EUR_USD").is_ok());
        let err = require_instrument("  ").unwrap_err();
        assert_eq!(err.error_code(), StandardErrorCode::MissingRequiredField);
        assert!(require_instruments(&[]).is_err());
        assert!(require_instruments(&["EUR_USD".to_string(), String::new()]).is_err());
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let credentials = Credentials {
            api_key: Some("super-secret".to_string()),
            api_secret: Some("also-secret".to_string()),
            account_id: Some("acc-1".to_string()),
            ..Credentials::default()
        };
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("also-secret"));
        assert!(debug.contains("acc-1"));
    }
}
