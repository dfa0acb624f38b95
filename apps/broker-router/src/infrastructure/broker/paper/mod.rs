//! Paper Broker
//!
//! An in-process simulated broker that honours the whole adapter contract:
//! - Accounts with balance, margin and netted positions
//! - Market and marketable limit orders fill immediately; others rest
//! - A seeded random-walk quote feed, lazily streamed
//! - Deterministic historical candles
//! - Failure injection through [`PaperControls`]

mod adapter;
mod book;
mod config;
mod market;

use std::sync::Arc;

use serde_json::Value;

use crate::application::ports::{BrokerAdapter, TransactionRecorders};
use crate::application::services::ErrorMapper;
use crate::application::services::registry::{BrokerRegistration, ConfigSchema, FieldType};
use crate::domain::capability::BrokerCapability;
use crate::domain::errors::StandardBrokerError;

pub use adapter::{PaperBroker, PaperControls};
pub use config::{DEFAULT_INSTRUMENTS, PaperConfig};

/// Error mapping table used by every paper broker, whatever its registry name.
pub const PAPER_ERROR_TABLE: &str = "paper";

/// Registration that builds a paper broker per instance. Failure flags come
/// from each instance's configuration.
#[must_use]
pub fn registration(
    name: &str,
    mapper: Arc<ErrorMapper>,
    recorders: TransactionRecorders,
) -> BrokerRegistration {
    build_registration(name, mapper, recorders, None)
}

/// Registration whose instances all share `controls`, so failures can be
/// injected after the registry built them.
#[must_use]
pub fn registration_with_controls(
    name: &str,
    mapper: Arc<ErrorMapper>,
    recorders: TransactionRecorders,
    controls: Arc<PaperControls>,
) -> BrokerRegistration {
    build_registration(name, mapper, recorders, Some(controls))
}

fn build_registration(
    name: &str,
    mapper: Arc<ErrorMapper>,
    recorders: TransactionRecorders,
    shared: Option<Arc<PaperControls>>,
) -> BrokerRegistration {
    let broker = name.to_string();
    let constructor = move |config: &Value| -> Result<Arc<dyn BrokerAdapter>, StandardBrokerError> {
        let config = PaperConfig::from_value(config)?;
        let controls = shared
            .clone()
            .unwrap_or_else(|| Arc::new(PaperControls::from_config(&config)));
        let adapter = PaperBroker::new(broker.clone(), config, controls, Arc::clone(&mapper))
            .with_recorders(recorders.clone());
        Ok(Arc::new(adapter))
    };

    BrokerRegistration::new(name, "paper-1", constructor)
        .with_display_name(format!("Paper ({name})"))
        .with_capabilities([
            BrokerCapability::MarketOrders,
            BrokerCapability::LimitOrders,
            BrokerCapability::StopOrders,
            BrokerCapability::StopLimitOrders,
            BrokerCapability::TrailingStops,
            BrokerCapability::OrderModification,
            BrokerCapability::PartialClose,
            BrokerCapability::MarginTrading,
            BrokerCapability::RealTimeStreaming,
            BrokerCapability::HistoricalData,
        ])
        .with_schema(schema())
}

fn schema() -> ConfigSchema {
    ConfigSchema::new()
        .optional("credentials", FieldType::Object)
        .optional("instruments", FieldType::Array)
        .optional("prices", FieldType::Object)
        .optional("accounts", FieldType::Integer)
        .optional("currency", FieldType::String)
        .optional("latency_ms", FieldType::Integer)
        .optional("stream_interval_ms", FieldType::Integer)
        .optional("expected_api_key", FieldType::String)
        .optional("reject_credentials", FieldType::Boolean)
        .optional("fail_health_checks", FieldType::Boolean)
        .optional("fail_orders", FieldType::String)
        .optional("seed", FieldType::Integer)
        .optional("settings", FieldType::Object)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::application::ports::{Credentials, InMemoryTransactionRecorder};
    use crate::domain::errors::StandardErrorCode;
    use crate::domain::market_data::{Granularity, HistoricalDataRequest};
    use crate::domain::order_execution::{
        BrokerOrder, OrderFilter, OrderSide, OrderStatus, TransactionKind,
    };

    fn broker(config: serde_json::Value) -> PaperBroker {
        let config = PaperConfig::from_value(&config).unwrap();
        let controls = Arc::new(PaperControls::from_config(&config));
        PaperBroker::new(
            "paper",
            config,
            controls,
            Arc::new(ErrorMapper::with_default_mappings()),
        )
    }

    #[tokio::test]
    async fn market_order_fills_and_is_recorded() {
        let recorders = TransactionRecorders::new();
        let memory = Arc::new(InMemoryTransactionRecorder::new());
        recorders.add(memory.clone());
        let paper = broker(json!({"seed": 1})).with_recorders(recorders);

        let order = BrokerOrder::market("EUR_USD", OrderSide::Buy, dec!(1000))
            .with_client_order_id("c-1");
        let result = paper.place_order(&order).await.unwrap();

        assert!(result.success);
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.filled_units, dec!(1000));
        assert_eq!(result.client_order_id.as_deref(), Some("c-1"));

        let records = memory.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, TransactionKind::OrderPlaced);
        assert_eq!(records[0].broker, "paper");
        assert_eq!(Some(&records[0].transaction_id), result.transaction_id.as_ref());

        let position = paper.get_position("EUR_USD", None).await.unwrap().unwrap();
        assert_eq!(position.long_units, dec!(1000));
    }

    #[tokio::test]
    async fn invalid_order_maps_to_standard_error() {
        let paper = broker(json!({}));
        let mut order = BrokerOrder::limit("EUR_USD", OrderSide::Buy, dec!(10), dec!(1.1));
        order.price = None;

        let err = paper.place_order(&order).await.unwrap_err();
        assert_eq!(err.error_code(), StandardErrorCode::InvalidOrderType);
        assert!(err.message().contains("Price is required"));
        assert_eq!(err.broker_name(), Some("paper"));
    }

    #[tokio::test]
    async fn unknown_instrument() {
        let paper = broker(json!({}));
        let err = paper.get_current_price("XAU_USD").await.unwrap_err();
        assert_eq!(err.error_code(), StandardErrorCode::InvalidInstrument);

        let err = paper.get_current_price("").await.unwrap_err();
        assert_eq!(err.error_code(), StandardErrorCode::MissingRequiredField);
    }

    #[tokio::test]
    async fn injected_order_failure_uses_native_code() {
        let paper = broker(json!({"fail_orders": "INSUFFICIENT_MARGIN"}));
        let order = BrokerOrder::market("EUR_USD", OrderSide::Buy, dec!(1));

        let err = paper.place_order(&order).await.unwrap_err();
        assert_eq!(err.error_code(), StandardErrorCode::InsufficientMargin);
        assert!(!err.is_retryable());

        paper.controls().set_fail_orders(None);
        assert!(paper.place_order(&order).await.is_ok());
    }

    #[tokio::test]
    async fn credentials_and_health() {
        let paper = broker(json!({"expected_api_key": "good"}));

        assert!(!paper.authenticate(&Credentials::with_api_key("bad")).await.unwrap());
        assert!(paper.authenticate(&Credentials::with_api_key("good")).await.unwrap());

        let report = paper.health_check().await.unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.details["authenticated"], "true");

        paper.controls().set_fail_health_checks(true);
        let err = paper.health_check().await.unwrap_err();
        assert_eq!(err.error_code(), StandardErrorCode::ServiceUnavailable);

        paper.disconnect().await.unwrap();
        assert_eq!(paper.controls().disconnect_count(), 1);
    }

    #[tokio::test]
    async fn cancel_resting_order_and_list() {
        let paper = broker(json!({}));
        let order = BrokerOrder::limit("EUR_USD", OrderSide::Buy, dec!(10), dec!(0.5));
        let placed = paper.place_order(&order).await.unwrap();
        assert_eq!(placed.status, OrderStatus::Pending);

        let id = placed.order_id.unwrap();
        let cancelled = paper.cancel_order(&id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let err = paper.cancel_order(&id).await.unwrap_err();
        assert_eq!(err.error_code(), StandardErrorCode::OrderAlreadyCancelled);

        let orders = paper
            .get_orders(&OrderFilter {
                status: Some(OrderStatus::Cancelled),
                ..OrderFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(orders.len(), 1);
    }

    #[tokio::test]
    async fn close_position_records_transaction() {
        let recorders = TransactionRecorders::new();
        let memory = Arc::new(InMemoryTransactionRecorder::new());
        recorders.add(memory.clone());
        let paper = broker(json!({})).with_recorders(recorders);

        paper
            .place_order(&BrokerOrder::market("GBP_USD", OrderSide::Sell, dec!(100)))
            .await
            .unwrap();
        let closed = paper.close_position("GBP_USD", None, None).await.unwrap();
        assert_eq!(closed.filled_units, dec!(100));
        assert!(paper.get_positions(None).await.unwrap().is_empty());

        let kinds: Vec<_> = memory.records().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![TransactionKind::OrderPlaced, TransactionKind::PositionClosed]);

        let err = paper.close_position("GBP_USD", None, None).await.unwrap_err();
        assert_eq!(err.error_code(), StandardErrorCode::PositionNotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_is_lazy_and_round_robin() {
        let paper = broker(json!({"stream_interval_ms": 100}));
        let instruments = vec!["EUR_USD".to_string(), "USD_JPY".to_string()];

        let ticks: Vec<_> = paper
            .stream_prices(&instruments)
            .await
            .unwrap()
            .take(4)
            .collect()
            .await;

        let symbols: Vec<_> = ticks
            .into_iter()
            .map(|t| t.unwrap().instrument)
            .collect();
        assert_eq!(symbols, vec!["EUR_USD", "USD_JPY", "EUR_USD", "USD_JPY"]);
    }

    #[tokio::test]
    async fn disabled_features_fail() {
        let paper = broker(json!({
            "settings": {"streaming_enabled": false, "historical_data_enabled": false}
        }));
        assert!(!paper.descriptor().supports(BrokerCapability::RealTimeStreaming));

        let Err(err) = paper.stream_prices(&["EUR_USD".to_string()]).await else {
            panic!("streaming should be disabled");
        };
        assert_eq!(err.error_code(), StandardErrorCode::MarketDataSubscriptionRequired);

        let request = HistoricalDataRequest::latest("EUR_USD", Granularity::M1, 5);
        let err = paper.get_historical_data(&request).await.unwrap_err();
        assert_eq!(err.error_code(), StandardErrorCode::HistoricalDataUnavailable);
    }

    #[tokio::test]
    async fn multiple_accounts() {
        let paper = broker(json!({"accounts": 3, "starting_balance": 5000}));
        assert!(paper.descriptor().supports(BrokerCapability::MultipleAccounts));

        let accounts = paper.get_accounts().await.unwrap();
        assert_eq!(accounts.len(), 3);
        assert!(accounts.iter().all(|a| a.balance == dec!(5000)));
    }

    #[tokio::test(start_paused = true)]
    async fn injected_latency_delays_calls() {
        let paper = broker(json!({}));
        paper.controls().set_latency(Duration::from_millis(250));

        let started = tokio::time::Instant::now();
        paper.get_current_price("EUR_USD").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn registration_schema_rejects_wrong_types() {
        let registration = registration(
            "paper",
            Arc::new(ErrorMapper::with_default_mappings()),
            TransactionRecorders::new(),
        );
        assert!(registration.schema.validate(&json!({"latency_ms": 5})).is_empty());
        assert!(!registration.schema.validate(&json!({"latency_ms": "slow"})).is_empty());
    }
}
