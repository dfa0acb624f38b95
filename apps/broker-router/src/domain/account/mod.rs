//! Account Context
//!
//! Account balances and open positions as reported by a broker.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::AccountId;

/// Balance and margin summary for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    /// Account identifier.
    pub account_id: AccountId,
    /// Account currency (ISO code).
    pub currency: String,
    /// Cash balance.
    pub balance: Decimal,
    /// Unrealized profit/loss of open positions.
    pub unrealized_pl: Decimal,
    /// Balance plus unrealized P&L.
    pub nav: Decimal,
    /// Margin in use.
    pub margin_used: Decimal,
    /// Margin still available.
    pub margin_available: Decimal,
    /// Number of instruments with an open position.
    pub open_position_count: u32,
    /// Number of pending orders.
    pub pending_order_count: u32,
    /// Time of the snapshot.
    pub updated_at: DateTime<Utc>,
}

/// Net position in one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Account holding the position.
    pub account_id: AccountId,
    /// Instrument symbol.
    pub instrument: String,
    /// Long units held.
    pub long_units: Decimal,
    /// Short units held (positive number).
    pub short_units: Decimal,
    /// Average entry price of the net position.
    pub average_price: Option<Decimal>,
    /// Unrealized profit/loss.
    pub unrealized_pl: Decimal,
    /// Realized profit/loss.
    pub realized_pl: Decimal,
}

impl Position {
    /// Long minus short units.
    #[must_use]
    pub fn net_units(&self) -> Decimal {
        self.long_units - self.short_units
    }

    /// Returns true if nothing is held.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.long_units.is_zero() && self.short_units.is_zero()
    }
}
