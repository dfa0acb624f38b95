//! Paper broker implementing [`BrokerAdapter`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;

use super::PAPER_ERROR_TABLE;
use super::book::{Book, Fill};
use super::config::PaperConfig;
use super::market::Market;
use crate::application::ports::{
    BrokerAdapter, BrokerResult, Credentials, HealthReport, HealthStatus, PriceStream,
    TransactionRecorders, describe_problems, require_instrument, require_instruments,
};
use crate::application::services::ErrorMapper;
use crate::domain::account::{AccountSummary, Position};
use crate::domain::capability::{
    BrokerCapability, BrokerDescriptor, CommissionStructure, MarginStructure,
};
use crate::domain::errors::{ErrorContext, NativeBrokerError, StandardBrokerError, StandardErrorCode};
use crate::domain::market_data::{Candle, HistoricalDataRequest, PriceTick};
use crate::domain::order_execution::{
    BrokerOrder, OrderFilter, OrderInfo, OrderModification, OrderResult, OrderType, TimeInForce,
    TransactionKind, TransactionRecord,
};
use crate::domain::shared::{AccountId, BrokerOrderId, TransactionId};

/// Runtime failure injection, shared by every instance built from one
/// registration.
#[derive(Debug, Default)]
pub struct PaperControls {
    reject_credentials: AtomicBool,
    fail_health_checks: AtomicBool,
    fail_orders: RwLock<Option<String>>,
    latency_ms: AtomicU64,
    disconnects: AtomicU64,
}

impl PaperControls {
    /// Controls seeded from an instance configuration.
    #[must_use]
    pub fn from_config(config: &PaperConfig) -> Self {
        Self {
            reject_credentials: AtomicBool::new(config.reject_credentials),
            fail_health_checks: AtomicBool::new(config.fail_health_checks),
            fail_orders: RwLock::new(config.fail_orders.clone()),
            latency_ms: AtomicU64::new(config.latency_ms),
            disconnects: AtomicU64::new(0),
        }
    }

    /// Reject every login.
    pub fn set_reject_credentials(&self, reject: bool) {
        self.reject_credentials.store(reject, Ordering::Relaxed);
    }

    /// Fail every health check.
    pub fn set_fail_health_checks(&self, fail: bool) {
        self.fail_health_checks.store(fail, Ordering::Relaxed);
    }

    /// Fail every order placement with `code`, or stop failing with `None`.
    pub fn set_fail_orders(&self, code: Option<&str>) {
        *self.fail_orders.write() = code.map(str::to_string);
    }

    /// Delay every remote call.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::Relaxed);
    }

    /// Number of `disconnect` calls received.
    #[must_use]
    pub fn disconnect_count(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms.load(Ordering::Relaxed))
    }
}

struct PaperState {
    market: Market,
    book: Book,
    authenticated: bool,
}

/// In-memory simulated broker.
///
/// Orders fill against a random-walk quote; limit orders fill when
/// marketable and rest otherwise. Nothing leaves the process.
pub struct PaperBroker {
    descriptor: BrokerDescriptor,
    config: PaperConfig,
    controls: Arc<PaperControls>,
    state: Arc<Mutex<PaperState>>,
    mapper: Arc<ErrorMapper>,
    recorders: TransactionRecorders,
}

impl std::fmt::Debug for PaperBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperBroker")
            .field("name", &self.descriptor.name)
            .field("instruments", &self.descriptor.supported_instruments.len())
            .field("recorders", &self.recorders)
            .finish_non_exhaustive()
    }
}

impl PaperBroker {
    /// Build a paper broker called `name`.
    pub fn new(
        name: impl Into<String>,
        config: PaperConfig,
        controls: Arc<PaperControls>,
        mapper: Arc<ErrorMapper>,
    ) -> Self {
        let name = name.into();
        let prices = config.starting_prices();
        let instruments: Vec<String> = prices.iter().map(|(symbol, _)| symbol.clone()).collect();
        let seed = config.seed.unwrap_or_else(rand::random);

        let mut capabilities = vec![
            BrokerCapability::MarketOrders,
            BrokerCapability::LimitOrders,
            BrokerCapability::StopOrders,
            BrokerCapability::StopLimitOrders,
            BrokerCapability::TrailingStops,
            BrokerCapability::OrderModification,
            BrokerCapability::PartialClose,
            BrokerCapability::MarginTrading,
        ];
        if config.settings.streaming_enabled {
            capabilities.push(BrokerCapability::RealTimeStreaming);
        }
        if config.settings.historical_data_enabled {
            capabilities.push(BrokerCapability::HistoricalData);
        }
        if config.accounts > 1 {
            capabilities.push(BrokerCapability::MultipleAccounts);
        }

        let mut descriptor = BrokerDescriptor::new(name.clone(), format!("Paper ({name})"), "paper-1")
            .with_capabilities(capabilities)
            .with_instruments(instruments)
            .with_order_types([
                OrderType::Market,
                OrderType::Limit,
                OrderType::Stop,
                OrderType::StopLimit,
                OrderType::TrailingStop,
                OrderType::MarketIfTouched,
            ])
            .with_time_in_force(TimeInForce::ALL);
        descriptor.commission = if config.commission_bps.is_zero() {
            CommissionStructure::SpreadOnly
        } else {
            CommissionStructure::Percentage {
                bps: config.commission_bps,
            }
        };
        descriptor.margin = MarginStructure {
            margin_rate: config.margin_rate,
            ..MarginStructure::default()
        };

        let state = PaperState {
            market: Market::new(prices, config.spread_pips, seed),
            book: Book::new(
                config.accounts,
                config.starting_balance,
                &config.currency,
                config.margin_rate,
                config.commission_bps,
            ),
            authenticated: false,
        };

        Self {
            descriptor,
            config,
            controls,
            state: Arc::new(Mutex::new(state)),
            mapper,
            recorders: TransactionRecorders::new(),
        }
    }

    /// Report transactions to `recorders`.
    #[must_use]
    pub fn with_recorders(mut self, recorders: TransactionRecorders) -> Self {
        self.recorders = recorders;
        self
    }

    /// Failure injection handle.
    #[must_use]
    pub fn controls(&self) -> Arc<PaperControls> {
        Arc::clone(&self.controls)
    }

    async fn simulate_latency(&self) {
        let latency = self.controls.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn native(&self, code: &str, message: impl Into<String>) -> StandardBrokerError {
        self.map_error(&NativeBrokerError::new(code, message))
    }

    fn quote(&self, instrument: &str) -> BrokerResult<PriceTick> {
        self.state
            .lock()
            .market
            .tick(instrument)
            .ok_or_else(|| self.native("UNKNOWN_INSTRUMENT", format!("{instrument} is not quoted")))
    }

    async fn record(&self, kind: TransactionKind, info: &OrderInfo, fill: Option<&Fill>) -> TransactionId {
        let mut record = TransactionRecord::new(&self.descriptor.name, kind);
        record.account_id = Some(info.account_id.clone());
        record.order_id = Some(info.order_id.clone());
        record.instrument = Some(info.instrument.clone());
        record.side = Some(info.side);
        record.units = Some(fill.map_or(info.units, |f| f.units));
        record.price = fill.map(|f| f.price).or(info.price);
        record.details.insert("status".to_string(), format!("{:?}", info.status));
        if let Some(fill) = fill {
            record.details.insert("commission".to_string(), fill.commission.to_string());
            record.details.insert("realized_pl".to_string(), fill.realized_pl.to_string());
        }

        let id = record.transaction_id.clone();
        self.recorders.notify(&record).await;
        id
    }

    fn result(info: &OrderInfo, fill: Option<&Fill>, transaction_id: TransactionId) -> OrderResult {
        let mut result = OrderResult::accepted(info.order_id.clone(), info.status)
            .with_client_order_id(info.client_order_id.clone())
            .with_transaction_id(transaction_id);
        if let Some(fill) = fill {
            result = result
                .with_fill(fill.units, fill.price)
                .with_commission(fill.commission);
        }
        result
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    fn descriptor(&self) -> &BrokerDescriptor {
        &self.descriptor
    }

    async fn authenticate(&self, credentials: &Credentials) -> BrokerResult<bool> {
        self.simulate_latency().await;

        let accepted = !self.controls.reject_credentials.load(Ordering::Relaxed)
            && match &self.config.expected_api_key {
                Some(expected) => credentials.api_key.as_ref() == Some(expected),
                None => true,
            };
        self.state.lock().authenticated = accepted;

        tracing::debug!(broker = %self.descriptor.name, accepted, "Paper login");
        Ok(accepted)
    }

    async fn disconnect(&self) -> BrokerResult<bool> {
        self.controls.disconnects.fetch_add(1, Ordering::Relaxed);
        self.state.lock().authenticated = false;
        Ok(true)
    }

    async fn health_check(&self) -> BrokerResult<HealthReport> {
        let started = tokio::time::Instant::now();
        self.simulate_latency().await;

        if self.controls.fail_health_checks.load(Ordering::Relaxed) {
            return Err(self.native("SIMULATED_OUTAGE", "Paper broker is simulating an outage"));
        }

        let authenticated = self.state.lock().authenticated;
        let mut details = BTreeMap::new();
        details.insert("authenticated".to_string(), authenticated.to_string());
        details.insert(
            "instruments".to_string(),
            self.descriptor.supported_instruments.len().to_string(),
        );

        Ok(HealthReport {
            status: HealthStatus::Healthy,
            latency_ms: Some(started.elapsed().as_secs_f64() * 1000.0),
            details,
        })
    }

    async fn get_account_summary(&self, account_id: Option<AccountId>) -> BrokerResult<AccountSummary> {
        self.simulate_latency().await;
        let state = self.state.lock();
        let account = state
            .book
            .resolve_account(account_id.as_ref())
            .map_err(|e| self.map_error(&e))?;
        state
            .book
            .summary(&account, &state.market)
            .map_err(|e| self.map_error(&e))
    }

    async fn get_accounts(&self) -> BrokerResult<Vec<AccountSummary>> {
        self.simulate_latency().await;
        let state = self.state.lock();
        state
            .book
            .account_ids()
            .iter()
            .map(|id| state.book.summary(id, &state.market).map_err(|e| self.map_error(&e)))
            .collect()
    }

    async fn place_order(&self, order: &BrokerOrder) -> BrokerResult<OrderResult> {
        self.simulate_latency().await;

        let failing = self.controls.fail_orders.read().clone();
        if let Some(code) = failing {
            return Err(self
                .native(&code, "Paper broker is simulating an order failure")
                .with_instrument(&order.instrument));
        }

        let tick = self.quote(&order.instrument)?;
        let problems = self.validate_order(order);
        if !problems.is_empty() {
            return Err(self
                .native("ORDER_INVALID", describe_problems(&problems))
                .with_instrument(&order.instrument));
        }

        let placed = {
            let mut guard = self.state.lock();
            let PaperState { market, book, .. } = &mut *guard;
            book.resolve_account(order.account_id.as_ref())
                .and_then(|account| book.place(order, account, &tick, market))
        };
        let (info, fill) = placed.map_err(|e| self.map_error(&e).with_instrument(&order.instrument))?;

        tracing::debug!(
            broker = %self.descriptor.name,
            order_id = %info.order_id,
            instrument = %info.instrument,
            status = ?info.status,
            "Paper order placed"
        );

        let transaction_id = self.record(TransactionKind::OrderPlaced, &info, fill.as_ref()).await;
        Ok(Self::result(&info, fill.as_ref(), transaction_id))
    }

    async fn modify_order(
        &self,
        order_id: &BrokerOrderId,
        modification: &OrderModification,
    ) -> BrokerResult<OrderResult> {
        self.simulate_latency().await;
        let modified = self.state.lock().book.modify(order_id, modification);
        let info = modified.map_err(|e| self.map_error(&e).with_order_id(order_id.as_str()))?;

        let transaction_id = self.record(TransactionKind::OrderModified, &info, None).await;
        Ok(Self::result(&info, None, transaction_id))
    }

    async fn cancel_order(&self, order_id: &BrokerOrderId) -> BrokerResult<OrderResult> {
        self.simulate_latency().await;
        let cancelled = self.state.lock().book.cancel(order_id);
        let info = cancelled.map_err(|e| self.map_error(&e).with_order_id(order_id.as_str()))?;

        let transaction_id = self.record(TransactionKind::OrderCancelled, &info, None).await;
        Ok(Self::result(&info, None, transaction_id))
    }

    async fn get_order(&self, order_id: &BrokerOrderId) -> BrokerResult<OrderInfo> {
        self.simulate_latency().await;
        let found = self.state.lock().book.order(order_id);
        found.map_err(|e| self.map_error(&e).with_order_id(order_id.as_str()))
    }

    async fn get_orders(&self, filter: &OrderFilter) -> BrokerResult<Vec<OrderInfo>> {
        self.simulate_latency().await;
        Ok(self.state.lock().book.orders(filter))
    }

    async fn get_position(
        &self,
        instrument: &str,
        account_id: Option<AccountId>,
    ) -> BrokerResult<Option<Position>> {
        require_instrument(instrument)?;
        self.simulate_latency().await;
        let state = self.state.lock();
        let account = state
            .book
            .resolve_account(account_id.as_ref())
            .map_err(|e| self.map_error(&e))?;
        Ok(state.book.position(&account, instrument, &state.market))
    }

    async fn get_positions(&self, account_id: Option<AccountId>) -> BrokerResult<Vec<Position>> {
        self.simulate_latency().await;
        let state = self.state.lock();
        let account = state
            .book
            .resolve_account(account_id.as_ref())
            .map_err(|e| self.map_error(&e))?;
        Ok(state.book.positions(&account, &state.market))
    }

    async fn close_position(
        &self,
        instrument: &str,
        units: Option<Decimal>,
        account_id: Option<AccountId>,
    ) -> BrokerResult<OrderResult> {
        require_instrument(instrument)?;
        self.simulate_latency().await;

        let tick = self.quote(instrument)?;
        let closed = {
            let mut guard = self.state.lock();
            let book = &mut guard.book;
            book.resolve_account(account_id.as_ref())
                .and_then(|account| book.close(&account, instrument, units, &tick))
        };
        let (info, fill) = closed.map_err(|e| self.map_error(&e).with_instrument(instrument))?;

        let transaction_id = self.record(TransactionKind::PositionClosed, &info, Some(&fill)).await;
        Ok(Self::result(&info, Some(&fill), transaction_id))
    }

    async fn get_current_price(&self, instrument: &str) -> BrokerResult<PriceTick> {
        require_instrument(instrument)?;
        self.simulate_latency().await;
        self.quote(instrument)
    }

    async fn get_current_prices(&self, instruments: &[String]) -> BrokerResult<Vec<PriceTick>> {
        require_instruments(instruments)?;
        self.simulate_latency().await;
        instruments.iter().map(|i| self.quote(i)).collect()
    }

    async fn stream_prices(&self, instruments: &[String]) -> BrokerResult<PriceStream> {
        require_instruments(instruments)?;
        if !self.config.settings.streaming_enabled {
            return Err(StandardBrokerError::new(
                StandardErrorCode::MarketDataSubscriptionRequired,
                "Streaming is disabled for this paper broker",
            )
            .with_retry(false, None)
            .with_broker(&self.descriptor.name));
        }
        {
            let state = self.state.lock();
            if let Some(unknown) = instruments.iter().find(|i| !state.market.quotes(i)) {
                return Err(self.native("UNKNOWN_INSTRUMENT", format!("{unknown} is not quoted")));
            }
        }

        let interval = Duration::from_millis(self.config.stream_interval_ms.max(1));
        let state = Arc::clone(&self.state);
        let instruments = instruments.to_vec();

        // Round-robin over the instruments; the first tick is immediate.
        let stream = futures::stream::unfold(0usize, move |n| {
            let state = Arc::clone(&state);
            let instrument = instruments[n % instruments.len()].clone();
            async move {
                if n > 0 {
                    tokio::time::sleep(interval).await;
                }
                let tick = state.lock().market.tick(&instrument)?;
                Some((Ok(tick), n + 1))
            }
        });
        Ok(stream.boxed())
    }

    async fn get_historical_data(&self, request: &HistoricalDataRequest) -> BrokerResult<Vec<Candle>> {
        require_instrument(&request.instrument)?;
        if !self.config.settings.historical_data_enabled {
            return Err(StandardBrokerError::new(
                StandardErrorCode::HistoricalDataUnavailable,
                "Historical data is disabled for this paper broker",
            )
            .with_retry(false, None)
            .with_broker(&self.descriptor.name));
        }
        self.simulate_latency().await;

        let state = self.state.lock();
        if !state.market.quotes(&request.instrument) {
            return Err(self.native(
                "UNKNOWN_INSTRUMENT",
                format!("{} is not quoted", request.instrument),
            ));
        }
        Ok(state.market.candles(request, Utc::now()))
    }

    fn map_error(&self, native: &NativeBrokerError) -> StandardBrokerError {
        self.mapper.map_native(
            PAPER_ERROR_TABLE,
            native,
            Some(ErrorContext::for_broker(&self.descriptor.name)),
        )
    }
}
