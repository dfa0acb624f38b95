//! Built-in native error tables.

use crate::domain::errors::{ErrorMapping, ErrorSeverity, StandardErrorCode as Code};

type Table = Vec<(&'static str, ErrorMapping)>;

pub(super) fn default_tables() -> Vec<(&'static str, Table)> {
    vec![
        ("oanda", oanda()),
        ("ib", interactive_brokers()),
        ("alpaca", alpaca()),
        ("paper", paper()),
    ]
}

fn oanda() -> Table {
    vec![
        (
            "INSUFFICIENT_MARGIN",
            ErrorMapping::new(Code::InsufficientMargin)
                .no_retry()
                .action("Reduce position size or add funds"),
        ),
        (
            "INSUFFICIENT_LIQUIDITY",
            ErrorMapping::new(Code::PriceUnavailable).retry_after(5),
        ),
        (
            "MARKET_HALTED",
            ErrorMapping::new(Code::MarketClosed)
                .retry_after(60)
                .action("Wait for the market to reopen"),
        ),
        (
            "INSTRUMENT_NOT_TRADEABLE",
            ErrorMapping::new(Code::InstrumentNotTradeable).no_retry(),
        ),
        ("INVALID_INSTRUMENT", ErrorMapping::new(Code::InvalidInstrument)),
        ("UNITS_INVALID", ErrorMapping::new(Code::InvalidUnits)),
        (
            "UNITS_MINIMUM_NOT_MET",
            ErrorMapping::new(Code::InvalidUnits).action("Increase order size"),
        ),
        ("PRICE_INVALID", ErrorMapping::new(Code::InvalidPrice)),
        (
            "STOP_LOSS_ON_FILL_PRICE_INVALID",
            ErrorMapping::new(Code::InvalidStopLoss),
        ),
        (
            "TAKE_PROFIT_ON_FILL_PRICE_INVALID",
            ErrorMapping::new(Code::InvalidTakeProfit),
        ),
        ("ORDER_DOESNT_EXIST", ErrorMapping::new(Code::OrderNotFound)),
        (
            "CLIENT_ORDER_ID_ALREADY_EXISTS",
            ErrorMapping::new(Code::DuplicateOrder),
        ),
        (
            "ACCOUNT_LOCKED",
            ErrorMapping::new(Code::AccountRestricted).action("Contact OANDA support"),
        ),
        (
            "ACCOUNT_NOT_ACTIVE",
            ErrorMapping::new(Code::AccountSuspended).severity(ErrorSeverity::Critical),
        ),
        (
            "FIFO_VIOLATION_SAFEGUARD_VIOLATION",
            ErrorMapping::new(Code::FifoViolation)
                .action("Close the oldest trade first"),
        ),
        (
            "ACCOUNT_POSITION_VALUE_LIMIT_EXCEEDED",
            ErrorMapping::new(Code::PositionLimitExceeded),
        ),
        (
            "INSUFFICIENT_AUTHORIZATION",
            ErrorMapping::new(Code::AuthenticationFailed)
                .no_retry()
                .action("Check the API token"),
        ),
        (
            "RATE_LIMIT_EXCEEDED",
            ErrorMapping::new(Code::RateLimitExceeded).retry_after(1),
        ),
        ("TIMEOUT", ErrorMapping::new(Code::RequestTimeout).retry_after(5)),
        (
            "SERVICE_UNAVAILABLE",
            ErrorMapping::new(Code::ServiceUnavailable).retry_after(30),
        ),
    ]
}

fn interactive_brokers() -> Table {
    vec![
        (
            "100",
            ErrorMapping::new(Code::RateLimitExceeded).retry_after(1),
        ),
        ("103", ErrorMapping::new(Code::DuplicateOrder)),
        ("104", ErrorMapping::new(Code::OrderAlreadyFilled)),
        ("110", ErrorMapping::new(Code::InvalidPrice).action("Round price to the minimum tick")),
        ("135", ErrorMapping::new(Code::OrderNotFound)),
        ("161", ErrorMapping::new(Code::OrderAlreadyFilled)),
        ("162", ErrorMapping::new(Code::HistoricalDataUnavailable)),
        ("200", ErrorMapping::new(Code::InvalidInstrument)),
        (
            "201",
            ErrorMapping::new(Code::InsufficientMargin)
                .no_retry()
                .action("Check margin and order parameters"),
        ),
        ("202", ErrorMapping::new(Code::OrderAlreadyCancelled)),
        ("203", ErrorMapping::new(Code::InsufficientPermissions)),
        (
            "354",
            ErrorMapping::new(Code::MarketDataSubscriptionRequired)
                .action("Subscribe to market data for the instrument"),
        ),
        (
            "502",
            ErrorMapping::new(Code::ConnectionError)
                .retry_after(5)
                .action("Check that TWS or the gateway is running"),
        ),
        ("504", ErrorMapping::new(Code::ConnectionError).retry_after(5)),
        (
            "1100",
            ErrorMapping::new(Code::ConnectionError)
                .severity(ErrorSeverity::High)
                .retry_after(10),
        ),
        (
            "2110",
            ErrorMapping::new(Code::ServiceUnavailable).retry_after(30),
        ),
    ]
}

fn alpaca() -> Table {
    vec![
        ("40010001", ErrorMapping::new(Code::MissingRequiredField)),
        (
            "40110000",
            ErrorMapping::new(Code::InvalidCredentials)
                .no_retry()
                .action("Check API key and secret"),
        ),
        (
            "40310000",
            ErrorMapping::new(Code::InsufficientFunds).action("Reduce order size"),
        ),
        (
            "40310100",
            ErrorMapping::new(Code::PatternDayTrader)
                .action("Account equity must exceed 25,000 USD to day trade"),
        ),
        ("40410000", ErrorMapping::new(Code::OrderNotFound)),
        ("42210000", ErrorMapping::new(Code::InvalidPrice)),
        (
            "42910000",
            ErrorMapping::new(Code::RateLimitExceeded).retry_after(1),
        ),
        ("50010000", ErrorMapping::new(Code::InternalError).retry_after(5)),
    ]
}

fn paper() -> Table {
    vec![
        (
            "REJECTED_CREDENTIALS",
            ErrorMapping::new(Code::InvalidCredentials).no_retry(),
        ),
        (
            "INSUFFICIENT_MARGIN",
            ErrorMapping::new(Code::InsufficientMargin).no_retry(),
        ),
        ("UNKNOWN_ORDER", ErrorMapping::new(Code::OrderNotFound)),
        ("UNKNOWN_INSTRUMENT", ErrorMapping::new(Code::InvalidInstrument)),
        ("NO_POSITION", ErrorMapping::new(Code::PositionNotFound)),
        ("ORDER_ALREADY_FILLED", ErrorMapping::new(Code::OrderAlreadyFilled)),
        (
            "ORDER_ALREADY_CANCELLED",
            ErrorMapping::new(Code::OrderAlreadyCancelled),
        ),
        ("ORDER_INVALID", ErrorMapping::new(Code::InvalidOrderType)),
        (
            "SIMULATED_OUTAGE",
            ErrorMapping::new(Code::ServiceUnavailable).retry_after(5),
        ),
        (
            "SIMULATED_TIMEOUT",
            ErrorMapping::new(Code::RequestTimeout).retry_after(2),
        ),
        ("NOT_AUTHENTICATED", ErrorMapping::new(Code::SessionExpired)),
        (
            "UNKNOWN_ACCOUNT",
            ErrorMapping::new(Code::InsufficientPermissions).no_retry(),
        ),
    ]
}

/// Fallback for native errors that only carry an HTTP status.
pub(super) fn http_status_mapping(status: u16) -> Option<ErrorMapping> {
    let mapping = match status {
        400 => ErrorMapping::new(Code::MissingRequiredField),
        401 => ErrorMapping::new(Code::AuthenticationFailed).no_retry(),
        403 => ErrorMapping::new(Code::InsufficientPermissions),
        404 => ErrorMapping::new(Code::OrderNotFound),
        408 | 504 => ErrorMapping::new(Code::RequestTimeout).retry_after(5),
        429 => ErrorMapping::new(Code::RateLimitExceeded).retry_after(1),
        503 => ErrorMapping::new(Code::ServiceUnavailable).retry_after(30),
        500..=599 => ErrorMapping::new(Code::InternalError).retry_after(5),
        _ => return None,
    };
    Some(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn native_codes_are_unique_per_broker() {
        for (broker, table) in default_tables() {
            let codes: HashSet<&str> = table.iter().map(|(code, _)| *code).collect();
            assert_eq!(codes.len(), table.len(), "duplicate code in {broker} table");
        }
    }

    #[test]
    fn retryable_rows_are_consistent() {
        for (_, table) in default_tables() {
            for (_, mapping) in table {
                if mapping.retry_after_secs.is_some() {
                    assert!(mapping.retryable);
                }
            }
        }
    }
}
