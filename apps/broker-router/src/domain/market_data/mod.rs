//! Market Data Context
//!
//! Quotes, candles and instrument classification.

mod instrument;

pub use instrument::InstrumentClass;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// A single bid/ask quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Instrument symbol.
    pub instrument: String,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Quote time.
    pub timestamp: DateTime<Utc>,
    /// Whether the instrument can currently be traded.
    pub tradeable: bool,
}

impl PriceTick {
    /// Midpoint of bid and ask.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Ask minus bid.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Spread relative to the midpoint, in basis points.
    ///
    /// Returns `None` for a non-positive midpoint.
    #[must_use]
    pub fn spread_bps(&self) -> Option<f64> {
        let mid = self.mid();
        if mid <= Decimal::ZERO {
            return None;
        }
        (self.spread() / mid * Decimal::from(10_000)).to_f64()
    }
}

/// Candle granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Granularity {
    /// 5 seconds.
    S5,
    /// 1 minute.
    #[default]
    M1,
    /// 5 minutes.
    M5,
    /// 15 minutes.
    M15,
    /// 1 hour.
    H1,
    /// 4 hours.
    H4,
    /// 1 day.
    D,
}

impl Granularity {
    /// Candle length in seconds.
    #[must_use]
    pub const fn seconds(&self) -> i64 {
        match self {
            Self::S5 => 5,
            Self::M1 => 60,
            Self::M5 => 300,
            Self::M15 => 900,
            Self::H1 => 3_600,
            Self::H4 => 14_400,
            Self::D => 86_400,
        }
    }
}

/// OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Candle open time.
    pub timestamp: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume (tick volume for OTC markets).
    pub volume: u64,
    /// False for the still-forming last candle.
    pub complete: bool,
}

/// Request for historical candles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalDataRequest {
    /// Instrument symbol.
    pub instrument: String,
    /// Candle size.
    pub granularity: Granularity,
    /// Start time (inclusive).
    pub from: Option<DateTime<Utc>>,
    /// End time (exclusive).
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of candles.
    pub count: Option<usize>,
}

impl HistoricalDataRequest {
    /// The most recent `count` candles of the given size.
    #[must_use]
    pub fn latest(instrument: impl Into<String>, granularity: Granularity, count: usize) -> Self {
        Self {
            instrument: instrument.into(),
            granularity,
            from: None,
            to: None,
            count: Some(count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(bid: Decimal, ask: Decimal) -> PriceTick {
        PriceTick {
            instrument: "EUR_USD".to_string(),
            bid,
            ask,
            timestamp: Utc::now(),
            tradeable: true,
        }
    }

    #[test]
    fn mid_and_spread() {
        let t = tick(dec!(1.1000), dec!(1.1002));
        assert_eq!(t.mid(), dec!(1.1001));
        assert_eq!(t.spread(), dec!(0.0002));
    }

    #[test]
    fn spread_in_basis_points() {
        let t = tick(dec!(99.95), dec!(100.05));
        let bps = t.spread_bps().unwrap();
        assert!((bps - 10.0).abs() < 1e-9);
    }

    #[test]
    fn spread_bps_requires_positive_mid() {
        assert!(tick(Decimal::ZERO, Decimal::ZERO).spread_bps().is_none());
    }
}
