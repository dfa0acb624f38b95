//! Order type (market, limit, etc.).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order type specifying execution behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Market order - execute at best available price.
    Market,
    /// Limit order - execute at specified price or better.
    Limit,
    /// Stop order - becomes market order when stop price is reached.
    Stop,
    /// Stop-limit order - becomes limit order when stop price is reached.
    StopLimit,
    /// Trailing stop - stop price follows the market by a distance.
    TrailingStop,
    /// Market-if-touched - becomes market order when price is touched.
    MarketIfTouched,
}

impl OrderType {
    /// All order types, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Market,
        Self::Limit,
        Self::Stop,
        Self::StopLimit,
        Self::TrailingStop,
        Self::MarketIfTouched,
    ];

    /// Returns true if this order type requires a price.
    #[must_use]
    pub const fn requires_price(&self) -> bool {
        matches!(
            self,
            Self::Limit | Self::Stop | Self::StopLimit | Self::MarketIfTouched
        )
    }

    /// Returns true if this order type requires a trailing distance.
    #[must_use]
    pub const fn requires_trailing_distance(&self) -> bool {
        matches!(self, Self::TrailingStop)
    }

    /// Returns true if this is a market order (immediate execution).
    #[must_use]
    pub const fn is_market(&self) -> bool {
        matches!(self, Self::Market)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
            Self::Stop => "stop",
            Self::StopLimit => "stop_limit",
            Self::TrailingStop => "trailing_stop",
            Self::MarketIfTouched => "market_if_touched",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
            Self::Stop => write!(f, "STOP"),
            Self::StopLimit => write!(f, "STOP_LIMIT"),
            Self::TrailingStop => write!(f, "TRAILING_STOP"),
            Self::MarketIfTouched => write!(f, "MARKET_IF_TOUCHED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_type_requires_price() {
        assert!(!OrderType::Market.requires_price());
        assert!(OrderType::Limit.requires_price());
        assert!(OrderType::Stop.requires_price());
        assert!(OrderType::StopLimit.requires_price());
        assert!(!OrderType::TrailingStop.requires_price());
        assert!(OrderType::MarketIfTouched.requires_price());
    }

    #[test]
    fn trailing_stop_requires_distance() {
        assert!(OrderType::TrailingStop.requires_trailing_distance());
        assert!(!OrderType::Limit.requires_trailing_distance());
    }

    #[test]
    fn order_type_display() {
        assert_eq!(format!("{}", OrderType::Market), "MARKET");
        assert_eq!(format!("{}", OrderType::StopLimit), "STOP_LIMIT");
        assert_eq!(OrderType::TrailingStop.as_str(), "trailing_stop");
    }

    #[test]
    fn order_type_serde() {
        let json = serde_json::to_string(&OrderType::TrailingStop).unwrap();
        assert_eq!(json, "\"TRAILING_STOP\"");
    }
}
