//! Order Execution Context
//!
//! Broker-neutral order requests, order snapshots, results and the
//! transaction records adapters emit after every account-changing call.

mod execution;
mod order;
mod result;
mod transaction;
pub mod value_objects;

pub use execution::OrderExecution;
pub use order::{BrokerOrder, OrderFilter, OrderModification};
pub use result::{OrderInfo, OrderResult};
pub use transaction::{TransactionKind, TransactionRecord};
pub use value_objects::{OrderSide, OrderStatus, OrderType, TimeInForce};
