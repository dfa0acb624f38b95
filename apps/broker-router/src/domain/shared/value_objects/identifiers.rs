//! Identifier newtypes.
//!
//! Broker-assigned ids wrap whatever string the broker returned; ids this
//! crate mints are UUID v4 strings.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing id.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Mint a fresh UUID v4 id.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Borrow the id.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Client-side order id, minted when a [`BrokerOrder`](crate::domain::order_execution::BrokerOrder) is built.
    OrderId
);
string_id!(
    /// Id the broker assigned to an accepted order.
    BrokerOrderId
);
string_id!(
    /// Broker account.
    AccountId
);
string_id!(
    /// Transaction reported to recorders.
    TransactionId
);
string_id!(
    /// A/B routing test.
    TestId
);
string_id!(
    /// Live adapter instance held by the registry.
    InstanceId
);
string_id!(
    /// One recorded order execution.
    ExecutionId
);
string_id!(
    /// Correlates an error with the request that caused it.
    CorrelationId
);
