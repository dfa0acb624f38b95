//! Shared Value Objects
//!
//! Immutable domain types used across bounded contexts.
//! Value objects are compared by value, not identity.

mod identifiers;

pub use identifiers::{
    AccountId, BrokerOrderId, CorrelationId, ExecutionId, InstanceId, OrderId, TestId,
    TransactionId,
};
