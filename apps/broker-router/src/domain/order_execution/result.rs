//! Results returned by broker order operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::{OrderSide, OrderStatus, OrderType, TimeInForce};
use crate::domain::shared::{AccountId, BrokerOrderId, TransactionId};

/// Outcome of a place/modify/cancel/close call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    /// Whether the broker accepted the request.
    pub success: bool,
    /// Broker-assigned order ID.
    pub order_id: Option<BrokerOrderId>,
    /// Echo of the client order ID.
    pub client_order_id: Option<String>,
    /// Order state after the call.
    pub status: OrderStatus,
    /// Average fill price, if any units filled.
    pub fill_price: Option<Decimal>,
    /// Units filled so far.
    pub filled_units: Decimal,
    /// Commission charged, in account currency.
    pub commission: Option<Decimal>,
    /// Financing charged, in account currency.
    pub financing: Option<Decimal>,
    /// Broker transaction ID for the operation.
    pub transaction_id: Option<TransactionId>,
    /// Free-form broker message.
    pub message: Option<String>,
    /// Time the broker reported the result.
    pub timestamp: DateTime<Utc>,
}

impl OrderResult {
    /// A successful result for the given order and state.
    #[must_use]
    pub fn accepted(order_id: BrokerOrderId, status: OrderStatus) -> Self {
        Self {
            success: true,
            order_id: Some(order_id),
            client_order_id: None,
            status,
            fill_price: None,
            filled_units: Decimal::ZERO,
            commission: None,
            financing: None,
            transaction_id: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Mark as filled.
    #[must_use]
    pub const fn with_fill(mut self, units: Decimal, price: Decimal) -> Self {
        self.filled_units = units;
        self.fill_price = Some(price);
        self
    }

    /// Set the commission.
    #[must_use]
    pub const fn with_commission(mut self, commission: Decimal) -> Self {
        self.commission = Some(commission);
        self
    }

    /// Set the transaction ID.
    #[must_use]
    pub fn with_transaction_id(mut self, id: TransactionId) -> Self {
        self.transaction_id = Some(id);
        self
    }

    /// Set the client order ID echo.
    #[must_use]
    pub fn with_client_order_id(mut self, id: Option<String>) -> Self {
        self.client_order_id = id;
        self
    }
}

/// Snapshot of an order as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInfo {
    /// Broker-assigned order ID.
    pub order_id: BrokerOrderId,
    /// Client order ID.
    pub client_order_id: Option<String>,
    /// Account the order belongs to.
    pub account_id: AccountId,
    /// Instrument symbol.
    pub instrument: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Requested units.
    pub units: Decimal,
    /// Filled units.
    pub filled_units: Decimal,
    /// Limit/stop price.
    pub price: Option<Decimal>,
    /// Average fill price.
    pub fill_price: Option<Decimal>,
    /// Current state.
    pub status: OrderStatus,
    /// Validity.
    pub time_in_force: TimeInForce,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}
