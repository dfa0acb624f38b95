//! Recorded outcome of routing and placing one order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::order::BrokerOrder;
use super::result::OrderResult;
use crate::domain::errors::{StandardBrokerError, StandardErrorCode};
use crate::domain::shared::{ExecutionId, TestId};

/// One routed order. Append-only; the unit of truth for test analysis and
/// broker performance metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderExecution {
    /// Execution ID.
    pub execution_id: ExecutionId,
    /// Test that routed the order, if any.
    pub test_id: Option<TestId>,
    /// Broker the order was sent to.
    pub broker: String,
    /// The order as submitted.
    pub order: BrokerOrder,
    /// Broker result, absent when placement failed.
    pub result: Option<OrderResult>,
    /// Wall-clock placement latency in milliseconds.
    pub latency_ms: f64,
    /// Whether placement succeeded.
    pub success: bool,
    /// Standard code of the failure.
    pub error_code: Option<StandardErrorCode>,
    /// Failure message.
    pub error_message: Option<String>,
    /// Time the execution was recorded.
    pub executed_at: DateTime<Utc>,
}

impl OrderExecution {
    /// Record a successful placement.
    #[must_use]
    pub fn succeeded(
        test_id: Option<TestId>,
        broker: impl Into<String>,
        order: BrokerOrder,
        result: OrderResult,
        latency_ms: f64,
    ) -> Self {
        Self {
            execution_id: ExecutionId::generate(),
            test_id,
            broker: broker.into(),
            order,
            success: result.success,
            result: Some(result),
            latency_ms,
            error_code: None,
            error_message: None,
            executed_at: Utc::now(),
        }
    }

    /// Record a failed placement.
    #[must_use]
    pub fn failed(
        test_id: Option<TestId>,
        broker: impl Into<String>,
        order: BrokerOrder,
        error: &StandardBrokerError,
        latency_ms: f64,
    ) -> Self {
        Self {
            execution_id: ExecutionId::generate(),
            test_id,
            broker: broker.into(),
            order,
            result: None,
            latency_ms,
            success: false,
            error_code: Some(error.error_code()),
            error_message: Some(error.message().to_string()),
            executed_at: Utc::now(),
        }
    }

    /// Override the record time.
    #[must_use]
    pub const fn at(mut self, executed_at: DateTime<Utc>) -> Self {
        self.executed_at = executed_at;
        self
    }

    /// Filled fraction of the requested units, in `[0, 1]`.
    #[must_use]
    pub fn fill_ratio(&self) -> Option<f64> {
        let result = self.result.as_ref()?;
        if self.order.units.is_zero() {
            return None;
        }
        (result.filled_units.abs() / self.order.units.abs()).to_f64()
    }

    /// Commission as basis points of filled notional.
    #[must_use]
    pub fn commission_bps(&self) -> Option<f64> {
        let result = self.result.as_ref()?;
        let commission = result.commission?;
        let notional = result.filled_units.abs() * result.fill_price?;
        if notional.is_zero() {
            return None;
        }
        (commission.abs() / notional * Decimal::from(10_000)).to_f64()
    }

    /// Adverse distance between the requested and filled price, in basis
    /// points. Requires a requested price; negative means price improvement.
    #[must_use]
    pub fn slippage_bps(&self) -> Option<f64> {
        let requested = self.order.price.filter(|p| !p.is_zero())?;
        let filled = self.result.as_ref()?.fill_price?;
        let adverse = (filled - requested) * Decimal::from(self.order.side.sign());
        (adverse / requested * Decimal::from(10_000)).to_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::{OrderSide, OrderStatus};
    use crate::domain::shared::BrokerOrderId;
    use rust_decimal_macros::dec;

    fn filled(side: OrderSide) -> OrderExecution {
        let order = BrokerOrder::limit("EUR_USD", side, dec!(1000), dec!(1.1000));
        let result = OrderResult::accepted(BrokerOrderId::new("1"), OrderStatus::Filled)
            .with_fill(dec!(500), dec!(1.1011))
            .with_commission(dec!(0.55055));
        OrderExecution::succeeded(None, "paper", order, result, 12.0)
    }

    #[test]
    fn derived_ratios() {
        let exec = filled(OrderSide::Buy);
        assert!((exec.fill_ratio().unwrap() - 0.5).abs() < 1e-12);
        assert!((exec.commission_bps().unwrap() - 10.0).abs() < 1e-9);
        assert!((exec.slippage_bps().unwrap() - 10.0).abs() < 1e-9);
        assert!((filled(OrderSide::Sell).slippage_bps().unwrap() + 10.0).abs() < 1e-9);
    }

    #[test]
    fn failed_execution_carries_code() {
        let order = BrokerOrder::market("EUR_USD", OrderSide::Buy, dec!(1));
        let err = StandardBrokerError::new(StandardErrorCode::InsufficientMargin, "no margin");
        let exec = OrderExecution::failed(None, "oanda", order, &err, 3.0);
        assert!(!exec.success);
        assert_eq!(exec.error_code, Some(StandardErrorCode::InsufficientMargin));
        assert_eq!(exec.fill_ratio(), None);
    }
}
