//! Live adapter instances owned by the registry.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::ports::{BrokerAdapter, HealthReport};
use crate::domain::shared::InstanceId;

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Being constructed.
    Initializing,
    /// Authenticated and usable.
    Connected,
    /// Usable but not authenticated.
    Disconnected,
    /// Failing health checks.
    Error,
    /// Administratively paused; skipped by health checks and routing.
    Maintenance,
}

impl InstanceStatus {
    /// Routing preference; lower is better, `None` is not routable.
    #[must_use]
    pub const fn routing_rank(&self) -> Option<u8> {
        match self {
            Self::Connected => Some(0),
            Self::Disconnected => Some(1),
            Self::Error => Some(2),
            Self::Initializing | Self::Maintenance => None,
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Maintenance => "maintenance",
        };
        f.write_str(s)
    }
}

/// Instance state. Mutated only while holding the registry's instance lock.
pub(super) struct BrokerInstance {
    pub(super) id: InstanceId,
    pub(super) broker: String,
    pub(super) adapter: Arc<dyn BrokerAdapter>,
    pub(super) status: InstanceStatus,
    /// Status to return to when a failing instance recovers or leaves maintenance.
    pub(super) resting_status: InstanceStatus,
    pub(super) error_count: u32,
    pub(super) last_health: Option<HealthReport>,
    pub(super) last_health_at: Option<DateTime<Utc>>,
    pub(super) created_at: DateTime<Utc>,
}

impl BrokerInstance {
    pub(super) fn info(&self) -> InstanceInfo {
        InstanceInfo {
            id: self.id.clone(),
            broker: self.broker.clone(),
            status: self.status,
            error_count: self.error_count,
            last_health: self.last_health.clone(),
            last_health_at: self.last_health_at,
            created_at: self.created_at,
        }
    }
}

/// Read-only snapshot of an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Instance ID.
    pub id: InstanceId,
    /// Registration name.
    pub broker: String,
    /// Current state.
    pub status: InstanceStatus,
    /// Consecutive-failure counter.
    pub error_count: u32,
    /// Last health report.
    pub last_health: Option<HealthReport>,
    /// Time of the last health check.
    pub last_health_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
