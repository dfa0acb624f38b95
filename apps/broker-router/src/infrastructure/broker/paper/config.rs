//! Paper broker instance configuration.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::errors::{StandardBrokerError, StandardErrorCode};

/// Instruments quoted when the configuration names none.
pub const DEFAULT_INSTRUMENTS: [(&str, Decimal); 6] = [
    ("EUR_USD", dec!(1.0850)),
    ("GBP_USD", dec!(1.2650)),
    ("USD_JPY", dec!(149.50)),
    ("AUD_USD", dec!(0.6550)),
    ("USD_CHF", dec!(0.8800)),
    ("USD_CAD", dec!(1.3600)),
];

/// Mid price for instruments with no configured or default price.
const FALLBACK_PRICE: Decimal = dec!(100);

/// Paper broker behaviour, read from the instance configuration.
///
/// Unknown keys are ignored, so the same document can carry the typed
/// broker settings the config loader adds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Instruments quoted; empty means [`DEFAULT_INSTRUMENTS`].
    pub instruments: Vec<String>,
    /// Starting mid prices by instrument.
    pub prices: BTreeMap<String, Decimal>,
    /// Number of simulated accounts.
    pub accounts: u32,
    /// Starting balance of every account.
    pub starting_balance: Decimal,
    /// Account currency.
    pub currency: String,
    /// Spread in pips.
    pub spread_pips: Decimal,
    /// Commission in basis points of notional; zero means spread-only.
    pub commission_bps: Decimal,
    /// Fraction of notional held as margin.
    pub margin_rate: Decimal,
    /// Delay added to every remote call, in milliseconds.
    pub latency_ms: u64,
    /// Interval between streamed ticks, in milliseconds.
    pub stream_interval_ms: u64,
    /// Only this API key is accepted, when set.
    pub expected_api_key: Option<String>,
    /// Reject every login.
    pub reject_credentials: bool,
    /// Fail every health check.
    pub fail_health_checks: bool,
    /// Fail every order placement with this native code.
    pub fail_orders: Option<String>,
    /// Price walk seed; random when absent.
    pub seed: Option<u64>,
    /// Connection toggles shared with real brokers.
    pub settings: PaperConnectionSettings,
}

/// Subset of the connection settings the paper broker honours.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PaperConnectionSettings {
    /// Allow price streaming.
    pub streaming_enabled: bool,
    /// Allow historical data requests.
    pub historical_data_enabled: bool,
}

impl Default for PaperConnectionSettings {
    fn default() -> Self {
        Self {
            streaming_enabled: true,
            historical_data_enabled: true,
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            instruments: Vec::new(),
            prices: BTreeMap::new(),
            accounts: 1,
            starting_balance: dec!(100000),
            currency: "USD".to_string(),
            spread_pips: dec!(1.5),
            commission_bps: Decimal::ZERO,
            margin_rate: dec!(0.02),
            latency_ms: 0,
            stream_interval_ms: 250,
            expected_api_key: None,
            reject_credentials: false,
            fail_health_checks: false,
            fail_orders: None,
            seed: None,
            settings: PaperConnectionSettings::default(),
        }
    }
}

impl PaperConfig {
    /// Parse an instance configuration.
    ///
    /// # Errors
    ///
    /// Returns `MissingRequiredField` when the document does not fit.
    pub fn from_value(config: &Value) -> Result<Self, StandardBrokerError> {
        let parsed: Self = match config {
            Value::Null => Self::default(),
            other => serde_json::from_value(other.clone()).map_err(|e| {
                StandardBrokerError::validation(
                    StandardErrorCode::MissingRequiredField,
                    format!("invalid paper broker configuration: {e}"),
                )
            })?,
        };
        if parsed.accounts == 0 {
            return Err(StandardBrokerError::validation(
                StandardErrorCode::MissingRequiredField,
                "paper broker needs at least one account",
            ));
        }
        Ok(parsed)
    }

    /// Quoted instruments with their starting mid prices.
    #[must_use]
    pub fn starting_prices(&self) -> Vec<(String, Decimal)> {
        if self.instruments.is_empty() {
            return DEFAULT_INSTRUMENTS
                .iter()
                .map(|(symbol, price)| {
                    let price = self.prices.get(*symbol).copied().unwrap_or(*price);
                    ((*symbol).to_string(), price)
                })
                .collect();
        }

        self.instruments
            .iter()
            .map(|symbol| {
                let price = self.prices.get(symbol).copied().unwrap_or_else(|| {
                    DEFAULT_INSTRUMENTS
                        .iter()
                        .find(|(known, _)| known == symbol)
                        .map_or(FALLBACK_PRICE, |(_, price)| *price)
                });
                (symbol.clone(), price)
            })
            .collect()
    }
}

/// Pip size: 0.01 for yen crosses, 0.0001 otherwise.
#[must_use]
pub fn pip_size(instrument: &str) -> Decimal {
    if instrument.contains("JPY") {
        dec!(0.01)
    } else {
        dec!(0.0001)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_config_uses_defaults() {
        let config = PaperConfig::from_value(&Value::Null).unwrap();
        assert_eq!(config, PaperConfig::default());
        assert_eq!(config.starting_prices().len(), DEFAULT_INSTRUMENTS.len());
    }

    #[test]
    fn configured_instruments_and_prices() {
        let config = PaperConfig::from_value(&json!({
            "instruments": ["EUR_USD", "XAU_USD"],
            "prices": {"XAU_USD": "2350.5"},
            "settings": {"timeout_secs": 30, "streaming_enabled": false},
            "credentials": {"api_key": "ignored"}
        }))
        .unwrap();

        assert_eq!(
            config.starting_prices(),
            vec![
                ("EUR_USD".to_string(), dec!(1.0850)),
                ("XAU_USD".to_string(), dec!(2350.5)),
            ]
        );
        assert!(!config.settings.streaming_enabled);
    }

    #[test]
    fn zero_accounts_rejected() {
        let err = PaperConfig::from_value(&json!({"accounts": 0})).unwrap_err();
        assert_eq!(err.error_code(), StandardErrorCode::MissingRequiredField);
    }

    #[test]
    fn wrong_types_rejected() {
        assert!(PaperConfig::from_value(&json!({"latency_ms": "slow"})).is_err());
    }

    #[test]
    fn pip_sizes() {
        assert_eq!(pip_size("USD_JPY"), dec!(0.01));
        assert_eq!(pip_size("EUR_USD"), dec!(0.0001));
    }
}
