//! Live, side-effect-free capability probes.
//!
//! Every probe is bounded by its own timeout. A failed or timed-out probe
//! yields `supported = false` with the error recorded; nothing propagates.

use std::future::Future;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use futures::StreamExt;
use rust_decimal::Decimal;
use tokio::time::{Instant, timeout};

use crate::application::ports::{BrokerAdapter, OrderValidationError, describe_problems};
use crate::domain::capability::{
    BrokerCapability, BrokerDescriptor, CapabilityTestResult, InstrumentProfile,
};
use crate::domain::errors::StandardBrokerError;
use crate::domain::market_data::{Granularity, HistoricalDataRequest};
use crate::domain::order_execution::{BrokerOrder, OrderSide, OrderType, TimeInForce};

/// Instrument used when the broker declares none.
const FALLBACK_INSTRUMENT: &str = "EUR_USD";

pub(super) fn probe_instrument(descriptor: &BrokerDescriptor) -> String {
    descriptor
        .supported_instruments
        .first()
        .cloned()
        .unwrap_or_else(|| FALLBACK_INSTRUMENT.to_string())
}

/// Run a future under a budget, returning its outcome and elapsed ms.
async fn timed<T, F>(budget: Duration, fut: F) -> (Result<T, String>, f64)
where
    F: Future<Output = Result<T, StandardBrokerError>>,
{
    let started = Instant::now();
    let outcome = match timeout(budget, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}s", budget.as_secs())),
    };
    (outcome, started.elapsed().as_secs_f64() * 1_000.0)
}

/// Pull up to `ticks` streamed prices within the budget.
pub(super) async fn probe_streaming(
    adapter: &dyn BrokerAdapter,
    instrument: &str,
    ticks: usize,
    budget: Duration,
) -> CapabilityTestResult {
    let instruments = [instrument.to_string()];
    let started = Instant::now();
    let mut received = 0usize;
    let outcome = timeout(budget, async {
        let mut stream = adapter.stream_prices(&instruments).await?;
        while received < ticks {
            match stream.next().await {
                Some(Ok(_)) => received += 1,
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        Ok::<(), StandardBrokerError>(())
    })
    .await;
    let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;

    match outcome {
        _ if received > 0 => {
            CapabilityTestResult::probed(BrokerCapability::RealTimeStreaming, true, latency_ms)
                .with_detail("ticks_received", received.to_string())
        }
        Ok(Ok(())) => {
            CapabilityTestResult::probed(BrokerCapability::RealTimeStreaming, false, latency_ms)
                .with_detail("ticks_received", "0")
        }
        Ok(Err(e)) => CapabilityTestResult::probe_failed(
            BrokerCapability::RealTimeStreaming,
            e.to_string(),
            latency_ms,
        ),
        Err(_) => CapabilityTestResult::probe_failed(
            BrokerCapability::RealTimeStreaming,
            format!("no ticks within {}s", budget.as_secs()),
            latency_ms,
        ),
    }
}

/// Well-formed synthetic order of a type, used only for local validation.
fn synthetic_order(descriptor: &BrokerDescriptor, instrument: &str, order_type: OrderType) -> BrokerOrder {
    let units = descriptor.trading_limits.min_units.max(Decimal::ONE);
    let mut order = BrokerOrder::new(instrument, OrderSide::Buy, order_type, units);
    if order_type.requires_price() {
        order.price = Some(Decimal::ONE);
    }
    if order_type.requires_trailing_distance() {
        order.trailing_distance = Some(Decimal::new(1, 2));
    }
    // Pick a time-in-force the broker accepts, preferring the default.
    let tifs = &descriptor.supported_time_in_force;
    if !tifs.is_empty()
        && !tifs.contains(&order.time_in_force)
        && let Some(tif) = tifs
            .iter()
            .find(|t| **t != TimeInForce::Gtd)
            .or_else(|| tifs.first())
    {
        order.time_in_force = *tif;
    }
    if order.time_in_force == TimeInForce::Gtd {
        order.expiry = Some(Utc::now() + TimeDelta::hours(1));
    }
    order
}

/// Validate a synthetic order per order type; no I/O.
pub(super) fn probe_order_types(
    adapter: &dyn BrokerAdapter,
    instrument: &str,
) -> Vec<CapabilityTestResult> {
    let descriptor = adapter.descriptor();
    OrderType::ALL
        .iter()
        .filter_map(|order_type| {
            let capability = BrokerCapability::for_order_type(*order_type)?;
            let order = synthetic_order(descriptor, instrument, *order_type);
            let started = Instant::now();
            let problems = adapter.validate_order(&order);
            let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
            let mut result =
                CapabilityTestResult::probed(capability, problems.is_empty(), latency_ms);
            if !problems.is_empty() {
                result = result.with_detail("validation", describe_problems(&problems));
            }
            Some(result)
        })
        .collect()
}

/// Validate a half-unit order to test fractional sizing.
pub(super) fn probe_fractional_units(
    adapter: &dyn BrokerAdapter,
    instrument: &str,
) -> CapabilityTestResult {
    let mut order = BrokerOrder::market(instrument, OrderSide::Buy, Decimal::new(5, 1));
    let tifs = &adapter.descriptor().supported_time_in_force;
    if !tifs.is_empty()
        && !tifs.contains(&order.time_in_force)
        && let Some(tif) = tifs.iter().find(|t| **t != TimeInForce::Gtd)
    {
        order.time_in_force = *tif;
    }
    let started = Instant::now();
    let problems = adapter.validate_order(&order);
    let fractional_rejected = problems
        .iter()
        .any(|p| matches!(p, OrderValidationError::FractionalUnits { .. }));
    CapabilityTestResult::probed(
        BrokerCapability::FractionalUnits,
        !fractional_rejected,
        started.elapsed().as_secs_f64() * 1_000.0,
    )
}

/// Count accounts to test multi-account support.
pub(super) async fn probe_accounts(adapter: &dyn BrokerAdapter, budget: Duration) -> CapabilityTestResult {
    let (outcome, latency_ms) = timed(budget, adapter.get_accounts()).await;
    match outcome {
        Ok(accounts) => CapabilityTestResult::probed(
            BrokerCapability::MultipleAccounts,
            accounts.len() > 1,
            latency_ms,
        )
        .with_detail("accounts", accounts.len().to_string()),
        Err(e) => CapabilityTestResult::probe_failed(BrokerCapability::MultipleAccounts, e, latency_ms),
    }
}

/// Read the account summary to test margin trading.
pub(super) async fn probe_margin(
    adapter: &dyn BrokerAdapter,
    declared: bool,
    budget: Duration,
) -> CapabilityTestResult {
    let (outcome, latency_ms) = timed(budget, adapter.get_account_summary(None)).await;
    match outcome {
        Ok(summary) => {
            let observed = !summary.margin_used.is_zero();
            CapabilityTestResult::probed(
                BrokerCapability::MarginTrading,
                declared || observed,
                latency_ms,
            )
            .with_detail("margin_available", summary.margin_available.to_string())
        }
        Err(e) => CapabilityTestResult::probe_failed(BrokerCapability::MarginTrading, e, latency_ms),
    }
}

/// List positions to test hedging.
pub(super) async fn probe_positions(
    adapter: &dyn BrokerAdapter,
    declared: bool,
    budget: Duration,
) -> CapabilityTestResult {
    let (outcome, latency_ms) = timed(budget, adapter.get_positions(None)).await;
    match outcome {
        Ok(positions) => {
            let hedged = positions
                .iter()
                .any(|p| !p.long_units.is_zero() && !p.short_units.is_zero());
            CapabilityTestResult::probed(BrokerCapability::Hedging, declared || hedged, latency_ms)
                .with_confidence(if hedged { 0.95 } else { 0.7 })
                .with_detail("positions", positions.len().to_string())
        }
        Err(e) => CapabilityTestResult::probe_failed(BrokerCapability::Hedging, e, latency_ms),
    }
}

/// Fetch a few candles to test historical data.
pub(super) async fn probe_historical(
    adapter: &dyn BrokerAdapter,
    instrument: &str,
    budget: Duration,
) -> CapabilityTestResult {
    let request = HistoricalDataRequest::latest(instrument, Granularity::M1, 5);
    let (outcome, latency_ms) = timed(budget, adapter.get_historical_data(&request)).await;
    match outcome {
        Ok(candles) => CapabilityTestResult::probed(
            BrokerCapability::HistoricalData,
            !candles.is_empty(),
            latency_ms,
        )
        .with_detail("candles", candles.len().to_string()),
        Err(e) => CapabilityTestResult::probe_failed(BrokerCapability::HistoricalData, e, latency_ms),
    }
}

/// Price one instrument to learn its trading status and spread.
pub(super) async fn probe_instrument_price(
    adapter: &dyn BrokerAdapter,
    symbol: &str,
    budget: Duration,
) -> InstrumentProfile {
    let mut profile = InstrumentProfile::unprobed(symbol);
    let (outcome, _) = timed(budget, adapter.get_current_price(symbol)).await;
    match outcome {
        Ok(tick) => {
            profile.tradeable = Some(tick.tradeable);
            profile.spread_bps = tick.spread_bps();
            profile.bid = Some(tick.bid);
            profile.ask = Some(tick.ask);
        }
        Err(e) => {
            profile.tradeable = Some(false);
            profile.error = Some(e);
        }
    }
    profile
}
