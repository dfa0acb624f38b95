//! Normalized transaction records handed to transaction recorders.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::OrderSide;
use crate::domain::shared::{AccountId, BrokerOrderId, TransactionId};

/// Kind of account-changing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Order accepted by the broker.
    OrderPlaced,
    /// Open order modified.
    OrderModified,
    /// Open order canceled.
    OrderCancelled,
    /// Position closed fully or partially.
    PositionClosed,
}

/// One broker transaction in a broker-neutral shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Broker transaction ID (generated when the broker returns none).
    pub transaction_id: TransactionId,
    /// Broker that executed the transaction.
    pub broker: String,
    /// What happened.
    pub kind: TransactionKind,
    /// Account affected.
    pub account_id: Option<AccountId>,
    /// Order affected.
    pub order_id: Option<BrokerOrderId>,
    /// Instrument.
    pub instrument: Option<String>,
    /// Side of the order, when relevant.
    pub side: Option<OrderSide>,
    /// Units involved.
    pub units: Option<Decimal>,
    /// Execution or requested price.
    pub price: Option<Decimal>,
    /// When the transaction happened.
    pub timestamp: DateTime<Utc>,
    /// Broker-specific extras.
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl TransactionRecord {
    /// Create a record with only the mandatory fields populated.
    #[must_use]
    pub fn new(broker: impl Into<String>, kind: TransactionKind) -> Self {
        Self {
            transaction_id: TransactionId::generate(),
            broker: broker.into(),
            kind,
            account_id: None,
            order_id: None,
            instrument: None,
            side: None,
            units: None,
            price: None,
            timestamp: Utc::now(),
            details: BTreeMap::new(),
        }
    }
}
