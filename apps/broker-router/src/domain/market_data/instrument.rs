//! Instrument classification from symbol shape.

use serde::{Deserialize, Serialize};
use std::fmt;

const CRYPTO_CODES: &[&str] = &[
    "BTC", "ETH", "LTC", "XRP", "BCH", "SOL", "ADA", "DOGE", "DOT", "USDT", "USDC",
];

const COMMODITY_CODES: &[&str] = &[
    "XAU", "XAG", "XPT", "XPD", "WTICO", "BCO", "NATGAS", "CORN", "WHEAT", "SOYBN", "SUGAR",
    "XCU", "OIL",
];

const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "AUD", "NZD", "CAD", "SEK", "NOK", "DKK", "SGD", "HKD",
    "MXN", "ZAR", "TRY", "PLN", "CZK", "HUF", "CNH",
];

/// Broad asset class of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    /// Currency pair.
    Forex,
    /// Cryptocurrency.
    Crypto,
    /// Metal, energy or agricultural product.
    Commodity,
    /// Equity or anything not matched above.
    Stock,
}

impl InstrumentClass {
    /// Infer the class from a symbol such as `EUR_USD`, `BTC/USD`, `XAU_USD`
    /// or `AAPL`.
    #[must_use]
    pub fn infer(symbol: &str) -> Self {
        let upper = symbol.trim().to_ascii_uppercase();
        let parts: Vec<&str> = upper
            .split(['_', '/', '-', '.'])
            .filter(|p| !p.is_empty())
            .collect();

        if parts.iter().any(|p| CRYPTO_CODES.contains(p)) {
            return Self::Crypto;
        }
        if parts.iter().any(|p| COMMODITY_CODES.contains(p)) {
            return Self::Commodity;
        }
        if parts.len() == 2 && parts.iter().all(|p| CURRENCY_CODES.contains(p)) {
            return Self::Forex;
        }
        // Unseparated six-letter pairs such as EURUSD.
        if parts.len() == 1
            && upper.len() == 6
            && upper.is_ascii()
            && CURRENCY_CODES.contains(&&upper[..3])
            && CURRENCY_CODES.contains(&&upper[3..])
        {
            return Self::Forex;
        }
        Self::Stock
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Forex => "forex",
            Self::Crypto => "crypto",
            Self::Commodity => "commodity",
            Self::Stock => "stock",
        }
    }
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
