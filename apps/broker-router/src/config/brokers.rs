//! Per-broker settings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::application::ports::Credentials;

/// Which client builds the broker's adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerKind {
    /// In-process simulated broker.
    #[default]
    Paper,
    /// OANDA v20 REST.
    Oanda,
    /// Interactive Brokers gateway.
    InteractiveBrokers,
    /// Alpaca trading API.
    Alpaca,
}

impl BrokerKind {
    /// Stable name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Oanda => "oanda",
            Self::InteractiveBrokers => "interactive_brokers",
            Self::Alpaca => "alpaca",
        }
    }
}

/// REST and streaming endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// REST base URL.
    #[serde(default)]
    pub rest_url: Option<String>,
    /// Streaming URL.
    #[serde(default)]
    pub stream_url: Option<String>,
}

/// Client-side rate limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Requests per second.
    #[serde(default)]
    pub requests_per_second: Option<u32>,
    /// Orders per second.
    #[serde(default)]
    pub orders_per_second: Option<u32>,
}

/// Connection behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries per request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between retries.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    /// Allow price streaming.
    #[serde(default = "default_true")]
    pub streaming_enabled: bool,
    /// Allow historical data requests.
    #[serde(default = "default_true")]
    pub historical_data_enabled: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            streaming_enabled: true,
            historical_data_enabled: true,
        }
    }
}

/// One configured broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Client kind.
    #[serde(default)]
    pub kind: BrokerKind,
    /// Disabled brokers are registered but get no instance.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Login credentials; omitted means no authentication.
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Endpoints.
    #[serde(default)]
    pub endpoints: Endpoints,
    /// Rate limits.
    #[serde(default)]
    pub rate_limits: RateLimitSettings,
    /// Connection behaviour.
    #[serde(default)]
    pub settings: ConnectionSettings,
    /// Instruments to trade; empty means the client's default list.
    #[serde(default)]
    pub instruments: Vec<String>,
    /// Client-specific options passed through untouched.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            kind: BrokerKind::default(),
            enabled: true,
            display_name: None,
            credentials: None,
            endpoints: Endpoints::default(),
            rate_limits: RateLimitSettings::default(),
            settings: ConnectionSettings::default(),
            instruments: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl BrokerSettings {
    /// Instance configuration handed to the registry: `extra` at the top
    /// level, overlaid with the typed fields.
    #[must_use]
    pub fn instance_config(&self) -> Value {
        let mut config = self.extra.clone();
        config.insert("settings".to_string(), json!(self.settings));
        config.insert("endpoints".to_string(), json!(self.endpoints));
        config.insert("rate_limits".to_string(), json!(self.rate_limits));
        if !self.instruments.is_empty() {
            config.insert("instruments".to_string(), json!(self.instruments));
        }
        if let Some(name) = &self.display_name {
            config.insert("display_name".to_string(), json!(name));
        }
        if let Some(credentials) = &self.credentials {
            config.insert("credentials".to_string(), json!(credentials));
        }
        Value::Object(config)
    }
}

const fn default_true() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_backoff_secs() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_config_carries_credentials_and_extras() {
        let mut settings = BrokerSettings {
            credentials: Some(Credentials::with_api_key("k")),
            instruments: vec!["EUR_USD".to_string()],
            ..BrokerSettings::default()
        };
        settings.extra.insert("latency_ms".to_string(), json!(5));

        let config = settings.instance_config();
        assert_eq!(config["credentials"]["api_key"], "k");
        assert_eq!(config["instruments"][0], "EUR_USD");
        assert_eq!(config["latency_ms"], 5);
        assert_eq!(config["settings"]["timeout_secs"], 30);
    }

    #[test]
    fn debug_redacts_secrets() {
        let settings = BrokerSettings {
            credentials: Some(Credentials::with_api_key("super-secret")),
            ..BrokerSettings::default()
        };
        assert!(!format!("{settings:?}").contains("super-secret"));
    }
}
