//! Broker-neutral order request.
//!
//! A [`BrokerOrder`] is what the platform hands to an adapter's
//! `place_order`. It is deliberately a plain value: adapters translate it
//! into their native wire shape, the router reads its routing key and the
//! A/B filters read instrument, type, units and creation time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::{OrderSide, OrderStatus, OrderType, TimeInForce};
use crate::domain::shared::{AccountId, OrderId};

/// Order request submitted to a broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerOrder {
    /// Platform-assigned order identifier.
    pub order_id: OrderId,
    /// Client order identifier, when the caller supplies one.
    pub client_order_id: Option<String>,
    /// Instrument symbol, e.g. `EUR_USD` or `AAPL`.
    pub instrument: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Execution behavior.
    pub order_type: OrderType,
    /// Order size in instrument units. Always expressed as a positive amount.
    pub units: Decimal,
    /// Limit/stop/trigger price.
    pub price: Option<Decimal>,
    /// Stop-loss price attached to the fill.
    pub stop_loss: Option<Decimal>,
    /// Take-profit price attached to the fill.
    pub take_profit: Option<Decimal>,
    /// Trailing distance for trailing-stop orders.
    pub trailing_distance: Option<Decimal>,
    /// Validity of the order.
    pub time_in_force: TimeInForce,
    /// Expiry for GTD orders.
    pub expiry: Option<DateTime<Utc>>,
    /// Target account. `None` means the adapter's default account.
    pub account_id: Option<AccountId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Free-form tags propagated to transaction records.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl BrokerOrder {
    /// Create an order of the given type with a fresh order ID.
    #[must_use]
    pub fn new(
        instrument: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        units: Decimal,
    ) -> Self {
        Self {
            order_id: OrderId::generate(),
            client_order_id: None,
            instrument: instrument.into(),
            side,
            order_type,
            units,
            price: None,
            stop_loss: None,
            take_profit: None,
            trailing_distance: None,
            time_in_force: TimeInForce::default(),
            expiry: None,
            account_id: None,
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create a market order.
    #[must_use]
    pub fn market(instrument: impl Into<String>, side: OrderSide, units: Decimal) -> Self {
        let mut order = Self::new(instrument, side, OrderType::Market, units);
        order.time_in_force = TimeInForce::Fok;
        order
    }

    /// Create a limit order.
    #[must_use]
    pub fn limit(
        instrument: impl Into<String>,
        side: OrderSide,
        units: Decimal,
        price: Decimal,
    ) -> Self {
        let mut order = Self::new(instrument, side, OrderType::Limit, units);
        order.price = Some(price);
        order
    }

    /// Set the client order ID.
    #[must_use]
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// Set the price.
    #[must_use]
    pub const fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the trailing distance.
    #[must_use]
    pub const fn with_trailing_distance(mut self, distance: Decimal) -> Self {
        self.trailing_distance = Some(distance);
        self
    }

    /// Set the time in force.
    #[must_use]
    pub const fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Set the target account.
    #[must_use]
    pub fn with_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Override the creation time.
    #[must_use]
    pub const fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Key used for deterministic routing: the client order ID when present,
    /// otherwise the platform order ID.
    #[must_use]
    pub fn routing_key(&self) -> &str {
        self.client_order_id
            .as_deref()
            .unwrap_or_else(|| self.order_id.as_str())
    }

    /// Signed units (+ for buys, - for sells).
    #[must_use]
    pub fn signed_units(&self) -> Decimal {
        match self.side {
            OrderSide::Buy => self.units,
            OrderSide::Sell => -self.units,
        }
    }
}

/// Changes requested for an open order. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderModification {
    /// New size.
    pub units: Option<Decimal>,
    /// New limit/stop price.
    pub price: Option<Decimal>,
    /// New stop-loss price.
    pub stop_loss: Option<Decimal>,
    /// New take-profit price.
    pub take_profit: Option<Decimal>,
    /// New trailing distance.
    pub trailing_distance: Option<Decimal>,
}

impl OrderModification {
    /// Returns true if nothing would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.units.is_none()
            && self.price.is_none()
            && self.stop_loss.is_none()
            && self.take_profit.is_none()
            && self.trailing_distance.is_none()
    }
}

/// Filter for order queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    /// Restrict to an account.
    pub account_id: Option<AccountId>,
    /// Restrict to an instrument.
    pub instrument: Option<String>,
    /// Restrict to a state.
    pub status: Option<OrderStatus>,
    /// Maximum number of orders returned (most recent first).
    pub count: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn routing_key_prefers_client_order_id() {
        let order = BrokerOrder::market("EUR_USD", OrderSide::Buy, dec!(1000));
        assert_eq!(order.routing_key(), order.order_id.as_str());

        let order = order.with_client_order_id("client-42");
        assert_eq!(order.routing_key(), "client-42");
    }

    #[test]
    fn limit_constructor_sets_price() {
        let order = BrokerOrder::limit("EUR_USD", OrderSide::Sell, dec!(500), dec!(1.1050));
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.price, Some(dec!(1.1050)));
        assert_eq!(order.signed_units(), dec!(-500));
    }

    #[test]
    fn empty_modification() {
        assert!(OrderModification::default().is_empty());
        let modification = OrderModification {
            price: Some(dec!(1.2)),
            ..OrderModification::default()
        };
        assert!(!modification.is_empty());
    }
}
