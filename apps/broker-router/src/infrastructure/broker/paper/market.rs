//! Simulated quotes: a seeded random walk of mid prices.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use md5::{Digest, Md5};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::config::pip_size;
use crate::domain::market_data::{Candle, HistoricalDataRequest, PriceTick};

/// Largest single move of the walk, in pips.
const MAX_STEP_PIPS: i64 = 3;

/// Candles returned when a request gives no count.
const DEFAULT_CANDLE_COUNT: usize = 100;

/// Upper bound on candles per request.
const MAX_CANDLE_COUNT: usize = 5_000;

/// Quote book for one paper broker.
#[derive(Debug)]
pub struct Market {
    mids: BTreeMap<String, Decimal>,
    spread_pips: Decimal,
    rng: StdRng,
}

impl Market {
    /// Create a market from starting mid prices.
    pub fn new(prices: Vec<(String, Decimal)>, spread_pips: Decimal, seed: u64) -> Self {
        Self {
            mids: prices.into_iter().collect(),
            spread_pips,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Quoted instruments in symbol order.
    pub fn instruments(&self) -> Vec<String> {
        self.mids.keys().cloned().collect()
    }

    /// True if the instrument is quoted.
    pub fn quotes(&self, instrument: &str) -> bool {
        self.mids.contains_key(instrument)
    }

    /// Current mid without moving the walk.
    pub fn mid(&self, instrument: &str) -> Option<Decimal> {
        self.mids.get(instrument).copied()
    }

    /// Advance the walk one step and quote the instrument.
    pub fn tick(&mut self, instrument: &str) -> Option<PriceTick> {
        let pip = pip_size(instrument);
        let step = Decimal::from(self.rng.random_range(-MAX_STEP_PIPS..=MAX_STEP_PIPS)) * pip;

        let mid = self.mids.get_mut(instrument)?;
        // Never walk to or below one pip.
        *mid = (*mid + step).max(pip);
        Some(quote(instrument, *mid, self.spread_pips))
    }

    /// Historical candles ending at the current mid.
    ///
    /// The series for a given instrument, granularity and end time is
    /// deterministic.
    pub fn candles(&self, request: &HistoricalDataRequest, now: DateTime<Utc>) -> Vec<Candle> {
        let Some(last_mid) = self.mid(&request.instrument) else {
            return Vec::new();
        };

        let step = TimeDelta::seconds(request.granularity.seconds());
        let end = request.to.unwrap_or(now).min(now);
        let count = match (request.count, request.from) {
            (Some(count), _) => count,
            (None, Some(from)) if from < end => {
                usize::try_from((end - from).num_seconds() / step.num_seconds().max(1))
                    .unwrap_or(DEFAULT_CANDLE_COUNT)
            }
            _ => DEFAULT_CANDLE_COUNT,
        }
        .min(MAX_CANDLE_COUNT);

        let pip = pip_size(&request.instrument);
        let mut rng = StdRng::seed_from_u64(series_seed(request, end));
        let mut candles = Vec::with_capacity(count);
        let mut close = last_mid;

        // Walk backwards from the latest close so the series ends at the live mid.
        for i in 0..count {
            let open = (close
                + Decimal::from(rng.random_range(-MAX_STEP_PIPS * 2..=MAX_STEP_PIPS * 2)) * pip)
                .max(pip);
            let wick_up = Decimal::from(rng.random_range(0..=MAX_STEP_PIPS)) * pip;
            let wick_down = Decimal::from(rng.random_range(0..=MAX_STEP_PIPS)) * pip;

            let offset = i32::try_from(i).unwrap_or(i32::MAX);
            candles.push(Candle {
                timestamp: end - step * (offset + 1),
                open,
                high: open.max(close) + wick_up,
                low: (open.min(close) - wick_down).max(pip),
                close,
                volume: rng.random_range(10..=5_000),
                complete: true,
            });
            close = open;
        }

        candles.reverse();
        if let Some(from) = request.from {
            candles.retain(|c| c.timestamp >= from);
        }
        candles
    }
}

/// Build a quote around `mid`.
fn quote(instrument: &str, mid: Decimal, spread_pips: Decimal) -> PriceTick {
    let half_spread = spread_pips * pip_size(instrument) / dec!(2);
    PriceTick {
        instrument: instrument.to_string(),
        bid: mid - half_spread,
        ask: mid + half_spread,
        timestamp: Utc::now(),
        tradeable: true,
    }
}

fn series_seed(request: &HistoricalDataRequest, end: DateTime<Utc>) -> u64 {
    let mut hasher = Md5::new();
    hasher.update(request.instrument.as_bytes());
    hasher.update(request.granularity.seconds().to_be_bytes());
    hasher.update(end.timestamp().to_be_bytes());
    let digest = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market_data::Granularity;

    fn market() -> Market {
        Market::new(
            vec![
                ("EUR_USD".to_string(), dec!(1.0850)),
                ("USD_JPY".to_string(), dec!(149.50)),
            ],
            dec!(2),
            7,
        )
    }

    #[test]
    fn tick_moves_within_step_and_keeps_spread() {
        let mut market = market();
        let tick = market.tick("EUR_USD").unwrap();

        assert!((tick.mid() - dec!(1.0850)).abs() <= dec!(0.0003));
        assert_eq!(tick.spread(), dec!(0.0002));
        assert!(tick.bid < tick.ask);
    }

    #[test]
    fn unknown_instrument_has_no_quote() {
        let mut market = market();
        assert!(market.tick("XAU_USD").is_none());
        assert!(!market.quotes("XAU_USD"));
    }

    #[test]
    fn same_seed_same_walk() {
        let mut a = market();
        let mut b = market();
        for _ in 0..20 {
            assert_eq!(a.tick("USD_JPY").unwrap().bid, b.tick("USD_JPY").unwrap().bid);
        }
    }

    #[test]
    fn candles_end_at_live_mid_and_are_ordered() {
        let market = market();
        let now = Utc::now();
        let request = HistoricalDataRequest::latest("EUR_USD", Granularity::M5, 50);

        let candles = market.candles(&request, now);
        assert_eq!(candles.len(), 50);
        assert_eq!(candles.last().unwrap().close, dec!(1.0850));
        assert!(candles.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(candles.iter().all(|c| c.low <= c.open && c.open <= c.high));
        assert!(candles.iter().all(|c| c.low <= c.close && c.close <= c.high));

        assert_eq!(market.candles(&request, now), candles);
    }

    #[test]
    fn candles_from_range() {
        let market = market();
        let now = Utc::now();
        let request = HistoricalDataRequest {
            instrument: "EUR_USD".to_string(),
            granularity: Granularity::H1,
            from: Some(now - TimeDelta::hours(10)),
            to: None,
            count: None,
        };
        assert_eq!(market.candles(&request, now).len(), 10);
    }
}
