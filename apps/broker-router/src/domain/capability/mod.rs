//! Capability Context
//!
//! What a broker declares it can do: feature flags, supported instruments,
//! order types and time-in-force values, plus trading limits, commission,
//! margin and rate-limit structures. Adapters expose a [`BrokerDescriptor`];
//! the discovery engine turns it (and live probes) into a capability profile.

mod profile;

pub use profile::{
    BrokerCapabilityProfile, CapabilityComparison, CapabilityTestResult, InstrumentProfile,
    TestingStrategy,
};

use std::collections::BTreeSet;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::{OrderType, TimeInForce};

/// A named broker feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerCapability {
    /// Market orders.
    MarketOrders,
    /// Limit orders.
    LimitOrders,
    /// Stop orders.
    StopOrders,
    /// Stop-limit orders.
    StopLimitOrders,
    /// Trailing stops.
    TrailingStops,
    /// Guaranteed stop-loss orders.
    GuaranteedStops,
    /// Non-integer unit sizes.
    FractionalUnits,
    /// Simultaneous long and short positions in one instrument.
    Hedging,
    /// Streaming quotes.
    RealTimeStreaming,
    /// Historical candles.
    HistoricalData,
    /// More than one account per login.
    MultipleAccounts,
    /// Modifying open orders.
    OrderModification,
    /// Closing part of a position.
    PartialClose,
    /// Leveraged trading.
    MarginTrading,
}

impl BrokerCapability {
    /// Every capability, in declaration order.
    pub const ALL: [Self; 14] = [
        Self::MarketOrders,
        Self::LimitOrders,
        Self::StopOrders,
        Self::StopLimitOrders,
        Self::TrailingStops,
        Self::GuaranteedStops,
        Self::FractionalUnits,
        Self::Hedging,
        Self::RealTimeStreaming,
        Self::HistoricalData,
        Self::MultipleAccounts,
        Self::OrderModification,
        Self::PartialClose,
        Self::MarginTrading,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MarketOrders => "market_orders",
            Self::LimitOrders => "limit_orders",
            Self::StopOrders => "stop_orders",
            Self::StopLimitOrders => "stop_limit_orders",
            Self::TrailingStops => "trailing_stops",
            Self::GuaranteedStops => "guaranteed_stops",
            Self::FractionalUnits => "fractional_units",
            Self::Hedging => "hedging",
            Self::RealTimeStreaming => "real_time_streaming",
            Self::HistoricalData => "historical_data",
            Self::MultipleAccounts => "multiple_accounts",
            Self::OrderModification => "order_modification",
            Self::PartialClose => "partial_close",
            Self::MarginTrading => "margin_trading",
        }
    }

    /// The capability that corresponds to an order type, if any.
    #[must_use]
    pub const fn for_order_type(order_type: OrderType) -> Option<Self> {
        match order_type {
            OrderType::Market => Some(Self::MarketOrders),
            OrderType::Limit => Some(Self::LimitOrders),
            OrderType::Stop => Some(Self::StopOrders),
            OrderType::StopLimit => Some(Self::StopLimitOrders),
            OrderType::TrailingStop => Some(Self::TrailingStops),
            OrderType::MarketIfTouched => None,
        }
    }
}

impl fmt::Display for BrokerCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade size bounds, in units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingLimits {
    /// Smallest accepted order size.
    pub min_units: Decimal,
    /// Largest accepted order size.
    pub max_units: Option<Decimal>,
    /// Maximum number of open positions.
    pub max_open_positions: Option<u32>,
}

impl Default for TradingLimits {
    fn default() -> Self {
        Self {
            min_units: Decimal::ONE,
            max_units: None,
            max_open_positions: None,
        }
    }
}

/// How the broker charges for trades.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommissionStructure {
    /// Cost is embedded in the spread.
    #[default]
    SpreadOnly,
    /// Fixed amount per unit traded.
    PerUnit {
        /// Commission per unit.
        rate: Decimal,
        /// Minimum commission per order.
        minimum: Decimal,
    },
    /// Fraction of notional, in basis points.
    Percentage {
        /// Commission in basis points of notional.
        bps: Decimal,
    },
}

impl CommissionStructure {
    /// Approximate commission for a fill.
    #[must_use]
    pub fn estimate(&self, units: Decimal, price: Decimal) -> Decimal {
        match self {
            Self::SpreadOnly => Decimal::ZERO,
            Self::PerUnit { rate, minimum } => (units.abs() * rate).max(*minimum),
            Self::Percentage { bps } => units.abs() * price * bps / Decimal::from(10_000),
        }
    }
}

/// Margin requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginStructure {
    /// Default margin rate (e.g. 0.02 for 50:1 leverage).
    pub margin_rate: Decimal,
    /// Margin closeout level as a fraction of NAV.
    pub margin_closeout_percent: Decimal,
}

impl Default for MarginStructure {
    fn default() -> Self {
        Self {
            margin_rate: Decimal::ONE,
            margin_closeout_percent: Decimal::new(5, 1),
        }
    }
}

/// Declared API rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RateLimits {
    /// REST requests per second.
    pub requests_per_second: Option<u32>,
    /// Order submissions per second.
    pub orders_per_second: Option<u32>,
    /// Concurrent streaming connections.
    pub max_streams: Option<u32>,
}

/// Static identity and declared capabilities of a broker adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerDescriptor {
    /// Registry key, e.g. `oanda`.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Broker API version the adapter speaks.
    pub api_version: String,
    /// Declared features.
    pub capabilities: BTreeSet<BrokerCapability>,
    /// Tradeable instruments.
    pub supported_instruments: Vec<String>,
    /// Accepted order types.
    pub supported_order_types: BTreeSet<OrderType>,
    /// Accepted time-in-force values.
    pub supported_time_in_force: BTreeSet<TimeInForce>,
    /// Size bounds.
    #[serde(default)]
    pub trading_limits: TradingLimits,
    /// Commission model.
    #[serde(default)]
    pub commission: CommissionStructure,
    /// Margin model.
    #[serde(default)]
    pub margin: MarginStructure,
    /// Rate limits.
    #[serde(default)]
    pub rate_limits: RateLimits,
}

impl BrokerDescriptor {
    /// Create a descriptor with no declared features.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            api_version: api_version.into(),
            capabilities: BTreeSet::new(),
            supported_instruments: Vec::new(),
            supported_order_types: BTreeSet::new(),
            supported_time_in_force: BTreeSet::new(),
            trading_limits: TradingLimits::default(),
            commission: CommissionStructure::default(),
            margin: MarginStructure::default(),
            rate_limits: RateLimits::default(),
        }
    }

    /// Add declared capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = BrokerCapability>) -> Self {
        self.capabilities.extend(caps);
        self
    }

    /// Add supported instruments.
    #[must_use]
    pub fn with_instruments<S: Into<String>>(
        mut self,
        instruments: impl IntoIterator<Item = S>,
    ) -> Self {
        self.supported_instruments
            .extend(instruments.into_iter().map(Into::into));
        self
    }

    /// Add supported order types.
    #[must_use]
    pub fn with_order_types(mut self, types: impl IntoIterator<Item = OrderType>) -> Self {
        self.supported_order_types.extend(types);
        self
    }

    /// Add supported time-in-force values.
    #[must_use]
    pub fn with_time_in_force(mut self, tifs: impl IntoIterator<Item = TimeInForce>) -> Self {
        self.supported_time_in_force.extend(tifs);
        self
    }

    /// Returns true if the capability is declared.
    #[must_use]
    pub fn supports(&self, capability: BrokerCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Returns true if the instrument is listed. An empty list means the
    /// adapter does not restrict instruments.
    #[must_use]
    pub fn supports_instrument(&self, instrument: &str) -> bool {
        self.supported_instruments.is_empty()
            || self.supported_instruments.iter().any(|i| i == instrument)
    }
}
