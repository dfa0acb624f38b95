//! Accounts, orders and netted positions of the paper broker.
//!
//! Pure bookkeeping: no I/O, no clock reads beyond stamping records.
//! Failures come back as paper-native errors for the adapter to map.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::market::Market;
use crate::domain::account::{AccountSummary, Position};
use crate::domain::errors::NativeBrokerError;
use crate::domain::market_data::PriceTick;
use crate::domain::order_execution::{
    BrokerOrder, OrderFilter, OrderInfo, OrderModification, OrderSide, OrderStatus, OrderType,
    TimeInForce,
};
use crate::domain::shared::{AccountId, BrokerOrderId};

type BookResult<T> = Result<T, NativeBrokerError>;

/// A fill produced by the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    /// Units filled.
    pub units: Decimal,
    /// Execution price.
    pub price: Decimal,
    /// Commission charged.
    pub commission: Decimal,
    /// Profit or loss realized by the fill.
    pub realized_pl: Decimal,
}

#[derive(Debug, Clone)]
struct Account {
    currency: String,
    balance: Decimal,
}

#[derive(Debug, Clone, Copy, Default)]
struct Holding {
    net: Decimal,
    average_price: Decimal,
    realized_pl: Decimal,
}

impl Holding {
    /// Apply a signed fill and return the realized profit or loss.
    fn apply(&mut self, signed_units: Decimal, price: Decimal) -> Decimal {
        if self.net.is_zero() || self.net.is_sign_positive() == signed_units.is_sign_positive() {
            let total = self.net.abs() + signed_units.abs();
            self.average_price =
                (self.average_price * self.net.abs() + price * signed_units.abs()) / total;
            self.net += signed_units;
            return Decimal::ZERO;
        }

        let closing = signed_units.abs().min(self.net.abs());
        let realized = if self.net.is_sign_positive() {
            closing * (price - self.average_price)
        } else {
            closing * (self.average_price - price)
        };
        self.realized_pl += realized;

        let remaining = self.net + signed_units;
        if remaining.is_zero() {
            self.average_price = Decimal::ZERO;
        } else if remaining.is_sign_positive() != self.net.is_sign_positive() {
            // Flipped through flat: the remainder opened at this price.
            self.average_price = price;
        }
        self.net = remaining;
        realized
    }

    fn unrealized(&self, mid: Decimal) -> Decimal {
        self.net * (mid - self.average_price)
    }
}

/// Paper broker ledger.
#[derive(Debug)]
pub struct Book {
    accounts: BTreeMap<AccountId, Account>,
    orders: BTreeMap<BrokerOrderId, OrderInfo>,
    holdings: BTreeMap<(AccountId, String), Holding>,
    next_order: u64,
    margin_rate: Decimal,
    commission_bps: Decimal,
}

impl Book {
    /// Open `accounts` accounts, each funded with `balance`.
    pub fn new(
        accounts: u32,
        balance: Decimal,
        currency: &str,
        margin_rate: Decimal,
        commission_bps: Decimal,
    ) -> Self {
        let accounts = (1..=accounts)
            .map(|n| {
                (
                    AccountId::new(format!("paper-{n:03}")),
                    Account {
                        currency: currency.to_string(),
                        balance,
                    },
                )
            })
            .collect();

        Self {
            accounts,
            orders: BTreeMap::new(),
            holdings: BTreeMap::new(),
            next_order: 1,
            margin_rate,
            commission_bps,
        }
    }

    /// Resolve an optional account to a known one; `None` means the first.
    pub fn resolve_account(&self, account_id: Option<&AccountId>) -> BookResult<AccountId> {
        match account_id {
            Some(id) if self.accounts.contains_key(id) => Ok(id.clone()),
            Some(id) => Err(NativeBrokerError::new(
                "UNKNOWN_ACCOUNT",
                format!("Account {id} does not exist"),
            )),
            None => self.accounts.keys().next().cloned().ok_or_else(|| {
                NativeBrokerError::new("UNKNOWN_ACCOUNT", "No accounts are open")
            }),
        }
    }

    /// Every account ID.
    pub fn account_ids(&self) -> Vec<AccountId> {
        self.accounts.keys().cloned().collect()
    }

    /// Balance and margin summary of one account.
    pub fn summary(&self, account_id: &AccountId, market: &Market) -> BookResult<AccountSummary> {
        let account = self.accounts.get(account_id).ok_or_else(|| {
            NativeBrokerError::new("UNKNOWN_ACCOUNT", format!("Account {account_id} does not exist"))
        })?;

        let mut unrealized_pl = Decimal::ZERO;
        let mut margin_used = Decimal::ZERO;
        let mut open_positions = 0u32;
        for ((_, instrument), holding) in self.holdings_of(account_id) {
            if holding.net.is_zero() {
                continue;
            }
            let mid = market.mid(instrument).unwrap_or(holding.average_price);
            unrealized_pl += holding.unrealized(mid);
            margin_used += holding.net.abs() * mid * self.margin_rate;
            open_positions += 1;
        }

        let pending = self
            .orders
            .values()
            .filter(|o| &o.account_id == account_id && o.status.is_open())
            .count();

        let nav = account.balance + unrealized_pl;
        Ok(AccountSummary {
            account_id: account_id.clone(),
            currency: account.currency.clone(),
            balance: account.balance,
            unrealized_pl,
            nav,
            margin_used,
            margin_available: (nav - margin_used).max(Decimal::ZERO),
            open_position_count: open_positions,
            pending_order_count: u32::try_from(pending).unwrap_or(u32::MAX),
            updated_at: Utc::now(),
        })
    }

    /// Accept an order, filling it against `tick` when it is marketable.
    pub fn place(
        &mut self,
        order: &BrokerOrder,
        account_id: AccountId,
        tick: &PriceTick,
        market: &Market,
    ) -> BookResult<(OrderInfo, Option<Fill>)> {
        let marketable_price = match (order.order_type, order.side) {
            (OrderType::Market, OrderSide::Buy) => Some(tick.ask),
            (OrderType::Market, OrderSide::Sell) => Some(tick.bid),
            (OrderType::Limit, OrderSide::Buy) => order.price.filter(|p| *p >= tick.ask).map(|_| tick.ask),
            (OrderType::Limit, OrderSide::Sell) => order.price.filter(|p| *p <= tick.bid).map(|_| tick.bid),
            _ => None,
        };

        let now = Utc::now();
        let mut info = OrderInfo {
            order_id: self.next_order_id(),
            client_order_id: order.client_order_id.clone(),
            account_id,
            instrument: order.instrument.clone(),
            side: order.side,
            order_type: order.order_type,
            units: order.units,
            filled_units: Decimal::ZERO,
            price: order.price,
            fill_price: None,
            status: OrderStatus::Pending,
            time_in_force: order.time_in_force,
            created_at: now,
            updated_at: now,
        };

        let fill = match marketable_price {
            Some(price) => {
                self.check_margin(&info.account_id, &order.instrument, order.signed_units(), price, market)?;
                let fill = self.fill(&info.account_id, &order.instrument, order.signed_units(), price);
                info.status = OrderStatus::Filled;
                info.filled_units = fill.units;
                info.fill_price = Some(fill.price);
                Some(fill)
            }
            None if matches!(order.time_in_force, TimeInForce::Ioc | TimeInForce::Fok) => {
                info.status = OrderStatus::Cancelled;
                None
            }
            None => None,
        };

        self.orders.insert(info.order_id.clone(), info.clone());
        Ok((info, fill))
    }

    /// Change an open order.
    pub fn modify(
        &mut self,
        order_id: &BrokerOrderId,
        modification: &OrderModification,
    ) -> BookResult<OrderInfo> {
        if modification.is_empty() {
            return Err(NativeBrokerError::new("ORDER_INVALID", "Nothing to modify"));
        }
        let info = self.open_order_mut(order_id)?;
        if let Some(units) = modification.units {
            if units <= Decimal::ZERO {
                return Err(NativeBrokerError::new("ORDER_INVALID", "Units must be positive"));
            }
            info.units = units;
        }
        if let Some(price) = modification.price {
            info.price = Some(price);
        }
        info.updated_at = Utc::now();
        Ok(info.clone())
    }

    /// Cancel an open order.
    pub fn cancel(&mut self, order_id: &BrokerOrderId) -> BookResult<OrderInfo> {
        let info = self.open_order_mut(order_id)?;
        info.status = OrderStatus::Cancelled;
        info.updated_at = Utc::now();
        Ok(info.clone())
    }

    /// One order.
    pub fn order(&self, order_id: &BrokerOrderId) -> BookResult<OrderInfo> {
        self.orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| unknown_order(order_id))
    }

    /// Orders matching `filter`, newest first.
    pub fn orders(&self, filter: &OrderFilter) -> Vec<OrderInfo> {
        let matching = self.orders.values().rev().filter(|o| {
            filter.account_id.as_ref().is_none_or(|a| &o.account_id == a)
                && filter.instrument.as_ref().is_none_or(|i| &o.instrument == i)
                && filter.status.is_none_or(|s| o.status == s)
        });
        match filter.count {
            Some(count) => matching.take(count).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }

    /// Position in one instrument, `None` when flat.
    pub fn position(&self, account_id: &AccountId, instrument: &str, market: &Market) -> Option<Position> {
        self.holdings
            .get(&(account_id.clone(), instrument.to_string()))
            .filter(|h| !h.net.is_zero())
            .map(|h| to_position(account_id, instrument, h, market))
    }

    /// Every open position of one account.
    pub fn positions(&self, account_id: &AccountId, market: &Market) -> Vec<Position> {
        self.holdings_of(account_id)
            .filter(|(_, h)| !h.net.is_zero())
            .map(|((_, instrument), h)| to_position(account_id, instrument, h, market))
            .collect()
    }

    /// Close all (`units == None`) or part of a position at `tick`.
    pub fn close(
        &mut self,
        account_id: &AccountId,
        instrument: &str,
        units: Option<Decimal>,
        tick: &PriceTick,
    ) -> BookResult<(OrderInfo, Fill)> {
        let net = self
            .holdings
            .get(&(account_id.clone(), instrument.to_string()))
            .map_or(Decimal::ZERO, |h| h.net);
        if net.is_zero() {
            return Err(NativeBrokerError::new(
                "NO_POSITION",
                format!("No open position in {instrument}"),
            ));
        }

        let units = units.unwrap_or_else(|| net.abs());
        if units <= Decimal::ZERO || units > net.abs() {
            return Err(NativeBrokerError::new(
                "ORDER_INVALID",
                format!("Cannot close {units} units of a {} unit position", net.abs()),
            ));
        }

        let (side, price, signed) = if net.is_sign_positive() {
            (OrderSide::Sell, tick.bid, -units)
        } else {
            (OrderSide::Buy, tick.ask, units)
        };
        let fill = self.fill(account_id, instrument, signed, price);

        let now = Utc::now();
        let info = OrderInfo {
            order_id: self.next_order_id(),
            client_order_id: None,
            account_id: account_id.clone(),
            instrument: instrument.to_string(),
            side,
            order_type: OrderType::Market,
            units,
            filled_units: units,
            price: None,
            fill_price: Some(price),
            status: OrderStatus::Filled,
            time_in_force: TimeInForce::Fok,
            created_at: now,
            updated_at: now,
        };
        self.orders.insert(info.order_id.clone(), info.clone());
        Ok((info, fill))
    }

    fn next_order_id(&mut self) -> BrokerOrderId {
        let id = BrokerOrderId::new(format!("P{:08}", self.next_order));
        self.next_order += 1;
        id
    }

    fn open_order_mut(&mut self, order_id: &BrokerOrderId) -> BookResult<&mut OrderInfo> {
        let info = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| unknown_order(order_id))?;
        match info.status {
            OrderStatus::Pending | OrderStatus::PartiallyFilled => Ok(info),
            OrderStatus::Filled => Err(NativeBrokerError::new(
                "ORDER_ALREADY_FILLED",
                format!("Order {order_id} is already filled"),
            )),
            OrderStatus::Cancelled => Err(NativeBrokerError::new(
                "ORDER_ALREADY_CANCELLED",
                format!("Order {order_id} is already cancelled"),
            )),
            status => Err(NativeBrokerError::new(
                "ORDER_INVALID",
                format!("Order {order_id} is {status:?}"),
            )),
        }
    }

    /// Reject fills that add exposure beyond the free margin.
    fn check_margin(
        &self,
        account_id: &AccountId,
        instrument: &str,
        signed_units: Decimal,
        price: Decimal,
        market: &Market,
    ) -> BookResult<()> {
        let net = self
            .holdings
            .get(&(account_id.clone(), instrument.to_string()))
            .map_or(Decimal::ZERO, |h| h.net);
        let added = (net + signed_units).abs() - net.abs();
        if added <= Decimal::ZERO {
            return Ok(());
        }

        let required = added * price * self.margin_rate;
        let available = self.summary(account_id, market)?.margin_available;
        if required > available {
            return Err(NativeBrokerError::new(
                "INSUFFICIENT_MARGIN",
                format!("Margin required {required} exceeds available {available}"),
            ));
        }
        Ok(())
    }

    fn fill(&mut self, account_id: &AccountId, instrument: &str, signed_units: Decimal, price: Decimal) -> Fill {
        let commission = (signed_units.abs() * price * self.commission_bps / dec!(10000)).round_dp(6);
        let realized_pl = self
            .holdings
            .entry((account_id.clone(), instrument.to_string()))
            .or_default()
            .apply(signed_units, price);

        if let Some(account) = self.accounts.get_mut(account_id) {
            account.balance += realized_pl - commission;
        }

        Fill {
            units: signed_units.abs(),
            price,
            commission,
            realized_pl,
        }
    }

    fn holdings_of<'a>(
        &'a self,
        account_id: &'a AccountId,
    ) -> impl Iterator<Item = (&'a (AccountId, String), &'a Holding)> + 'a {
        self.holdings.iter().filter(move |((a, _), _)| a == account_id)
    }
}

fn to_position(account_id: &AccountId, instrument: &str, holding: &Holding, market: &Market) -> Position {
    let mid = market.mid(instrument).unwrap_or(holding.average_price);
    Position {
        account_id: account_id.clone(),
        instrument: instrument.to_string(),
        long_units: holding.net.max(Decimal::ZERO),
        short_units: (-holding.net).max(Decimal::ZERO),
        average_price: Some(holding.average_price),
        unrealized_pl: holding.unrealized(mid),
        realized_pl: holding.realized_pl,
    }
}

fn unknown_order(order_id: &BrokerOrderId) -> NativeBrokerError {
    NativeBrokerError::new("UNKNOWN_ORDER", format!("Order {order_id} does not exist"))
}
