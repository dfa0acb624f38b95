//! Time in force for orders.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Time in force specifying order validity duration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Good-til-canceled.
    #[default]
    Gtc,
    /// Good-til-date.
    Gtd,
    /// Valid for current trading day only.
    Day,
    /// Immediate-or-cancel (fill immediately, cancel remainder).
    Ioc,
    /// Fill-or-kill (all or nothing, immediate execution required).
    Fok,
}

impl TimeInForce {
    /// All time-in-force values.
    pub const ALL: [Self; 5] = [Self::Gtc, Self::Gtd, Self::Day, Self::Ioc, Self::Fok];

    /// Returns true if the order can persist across trading sessions.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        matches!(self, Self::Gtc | Self::Gtd)
    }

    /// Returns true if the order requires immediate execution.
    #[must_use]
    pub const fn is_immediate(&self) -> bool {
        matches!(self, Self::Ioc | Self::Fok)
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gtc => write!(f, "GTC"),
            Self::Gtd => write!(f, "GTD"),
            Self::Day => write!(f, "DAY"),
            Self::Ioc => write!(f, "IOC"),
            Self::Fok => write!(f, "FOK"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_gtc() {
        assert_eq!(TimeInForce::default(), TimeInForce::Gtc);
    }

    #[test]
    fn immediate_and_persistent() {
        assert!(TimeInForce::Ioc.is_immediate());
        assert!(TimeInForce::Fok.is_immediate());
        assert!(!TimeInForce::Day.is_immediate());
        assert!(TimeInForce::Gtd.is_persistent());
        assert!(!TimeInForce::Fok.is_persistent());
    }
}
