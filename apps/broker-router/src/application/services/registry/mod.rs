//! Broker Registry / Factory
//!
//! Owns broker registrations and the live adapter instances built from them.
//! A background loop health-checks every instance on a fixed interval;
//! instances that fail `max_consecutive_failures` checks in a row are
//! disconnected and removed. Status and error counters are only mutated
//! while holding the instance lock, and the lock is never held across an
//! adapter call.

mod error;
mod instance;
mod registration;
mod schema;

pub use error::RegistryError;
pub use instance::{InstanceInfo, InstanceStatus};
pub use registration::{AdapterConstructor, BrokerRegistration};
pub use schema::{ConfigSchema, FieldSpec, FieldType};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BrokerAdapter, Credentials, HealthReport};
use crate::domain::capability::BrokerCapability;
use crate::domain::errors::StandardBrokerError;
use crate::domain::shared::InstanceId;
use crate::observability;
use instance::BrokerInstance;

/// Registry tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Interval between health-check rounds.
    pub health_check_interval: Duration,
    /// Budget for one adapter health check.
    pub health_check_timeout: Duration,
    /// Budget for authentication during instance creation.
    pub auth_timeout: Duration,
    /// Budget for disconnecting an adapter.
    pub disconnect_timeout: Duration,
    /// Consecutive failures that trigger eviction.
    pub max_consecutive_failures: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(60),
            health_check_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(30),
            disconnect_timeout: Duration::from_secs(10),
            max_consecutive_failures: 3,
        }
    }
}

/// Outcome of one health-check round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckRound {
    /// Instances checked.
    pub checked: usize,
    /// Instances that reported healthy.
    pub healthy: usize,
    /// Instances that failed, timed out or reported unhealthy.
    pub failed: usize,
    /// Instances removed in this round.
    pub evicted: Vec<InstanceId>,
}

/// Registry-wide summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatus {
    /// Registered brokers in registration order.
    pub registered_brokers: Vec<String>,
    /// Registered brokers that accept new instances.
    pub enabled_brokers: Vec<String>,
    /// Live instances.
    pub total_instances: usize,
    /// Live instances per status.
    pub instances_by_status: BTreeMap<InstanceStatus, usize>,
    /// Live instances per broker.
    pub instances_by_broker: BTreeMap<String, usize>,
}

#[derive(Default)]
struct Registrations {
    by_name: HashMap<String, BrokerRegistration>,
    order: Vec<String>,
}

enum HealthOutcome {
    Report(HealthReport),
    Failed(String),
    TimedOut,
}

/// Registry of broker adapters and their live instances.
pub struct BrokerRegistry {
    config: RegistryConfig,
    registrations: RwLock<Registrations>,
    instances: RwLock<HashMap<InstanceId, BrokerInstance>>,
    shutdown: CancellationToken,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for BrokerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerRegistry")
            .field("config", &self.config)
            .field("registrations", &self.registrations.read().order)
            .field("instances", &self.instances.read().len())
            .finish_non_exhaustive()
    }
}

impl BrokerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            registrations: RwLock::new(Registrations::default()),
            instances: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            health_task: Mutex::new(None),
        }
    }

    /// Registry tuning.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Registrations
    // ------------------------------------------------------------------

    /// Register a broker. A duplicate name replaces the previous
    /// registration (with a warning) and keeps its position.
    pub fn register_adapter(&self, registration: BrokerRegistration) {
        let name = registration.name.clone();
        let mut registrations = self.registrations.write();
        if registrations.by_name.contains_key(&name) {
            tracing::warn!(broker = %name, "Broker already registered, replacing registration");
        } else {
            registrations.order.push(name.clone());
        }
        tracing::info!(
            broker = %name,
            version = %registration.version,
            capabilities = registration.capabilities.len(),
            "Broker registered"
        );
        registrations.by_name.insert(name, registration);
    }

    /// Remove a registration. Live instances are left running.
    pub fn unregister_adapter(&self, name: &str) -> bool {
        let mut registrations = self.registrations.write();
        let removed = registrations.by_name.remove(name).is_some();
        if removed {
            registrations.order.retain(|n| n != name);
            tracing::info!(broker = name, "Broker unregistered");
        }
        removed
    }

    /// Enable or disable a registration.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedBroker` if the name is not registered.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let mut registrations = self.registrations.write();
        let registration = registrations
            .by_name
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnsupportedBroker(name.to_string()))?;
        registration.enabled = enabled;
        tracing::info!(broker = name, enabled, "Broker registration toggled");
        Ok(())
    }

    /// Registered broker names in registration order.
    #[must_use]
    pub fn registered_brokers(&self) -> Vec<String> {
        self.registrations.read().order.clone()
    }

    /// Returns true if the name is registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.registrations.read().by_name.contains_key(name)
    }

    /// First enabled registration, used as the routing fallback.
    #[must_use]
    pub fn first_registered(&self) -> Option<String> {
        let registrations = self.registrations.read();
        registrations
            .order
            .iter()
            .find(|name| registrations.by_name.get(*name).is_some_and(|r| r.enabled))
            .cloned()
    }

    /// Brokers declaring a capability, in registration order.
    #[must_use]
    pub fn brokers_with_capability(&self, capability: BrokerCapability) -> Vec<String> {
        let registrations = self.registrations.read();
        registrations
            .order
            .iter()
            .filter(|name| {
                registrations
                    .by_name
                    .get(*name)
                    .is_some_and(|r| r.capabilities.contains(&capability))
            })
            .cloned()
            .collect()
    }

    /// Declared capabilities of a broker.
    #[must_use]
    pub fn broker_capabilities(&self, name: &str) -> Option<BTreeSet<BrokerCapability>> {
        self.registrations
            .read()
            .by_name
            .get(name)
            .map(|r| r.capabilities.clone())
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// Build, authenticate and store a new adapter instance.
    ///
    /// Without `credentials` in `config` the instance starts `Disconnected`.
    ///
    /// # Errors
    ///
    /// - `UnsupportedBroker` if the name is unknown
    /// - `BrokerDisabled` if the registration is disabled
    /// - `BrokerConfiguration` if `config` violates the schema or the
    ///   constructor fails
    /// - `BrokerAuthentication` if the credentials are rejected, or
    ///   authentication errors or times out; no instance is retained
    pub async fn create_adapter(
        &self,
        name: &str,
        config: Value,
    ) -> Result<InstanceInfo, RegistryError> {
        let registration = self
            .registrations
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnsupportedBroker(name.to_string()))?;

        if !registration.enabled {
            return Err(RegistryError::BrokerDisabled(name.to_string()));
        }

        let violations = registration.schema.validate(&config);
        if !violations.is_empty() {
            tracing::warn!(broker = name, errors = ?violations, "Broker configuration rejected");
            return Err(RegistryError::BrokerConfiguration {
                broker: name.to_string(),
                errors: violations,
            });
        }

        let credentials = match config.get("credentials") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(
                serde_json::from_value::<Credentials>(raw.clone()).map_err(|e| {
                    RegistryError::BrokerConfiguration {
                        broker: name.to_string(),
                        errors: vec![format!("invalid credentials: {e}")],
                    }
                })?,
            ),
        };

        let adapter = (registration.constructor)(&config).map_err(|e| {
            RegistryError::BrokerConfiguration {
                broker: name.to_string(),
                errors: vec![e.to_string()],
            }
        })?;

        let id = InstanceId::generate();
        tracing::debug!(broker = name, instance_id = %id, "Adapter constructed");

        let status = match credentials {
            None => InstanceStatus::Disconnected,
            Some(credentials) => self.authenticate(name, &id, &adapter, &credentials).await?,
        };

        let instance = BrokerInstance {
            id: id.clone(),
            broker: name.to_string(),
            adapter,
            status,
            resting_status: status,
            error_count: 0,
            last_health: None,
            last_health_at: None,
            created_at: Utc::now(),
        };
        let info = instance.info();
        self.instances.write().insert(id.clone(), instance);

        tracing::info!(broker = name, instance_id = %id, status = %status, "Broker instance created");
        Ok(info)
    }

    async fn authenticate(
        &self,
        broker: &str,
        id: &InstanceId,
        adapter: &Arc<dyn BrokerAdapter>,
        credentials: &Credentials,
    ) -> Result<InstanceStatus, RegistryError> {
        let budget = self.config.auth_timeout;
        let (reason, source) = match timeout(budget, adapter.authenticate(credentials)).await {
            Ok(Ok(true)) => {
                tracing::info!(broker, instance_id = %id, "Broker authenticated");
                return Ok(InstanceStatus::Connected);
            }
            Ok(Ok(false)) => ("credentials rejected".to_string(), None),
            Ok(Err(e)) => (e.to_string(), Some(e)),
            Err(_) => (
                "authentication timed out".to_string(),
                Some(StandardBrokerError::timeout("authenticate", budget.as_secs()).with_broker(broker)),
            ),
        };

        tracing::warn!(
            broker,
            instance_id = %id,
            status = %InstanceStatus::Error,
            reason = %reason,
            "Broker authentication failed, instance discarded"
        );
        Err(RegistryError::BrokerAuthentication {
            broker: broker.to_string(),
            reason,
            source,
        })
    }

    /// Disconnect and remove an instance. Returns false if the ID is unknown.
    pub async fn destroy_adapter(&self, id: &InstanceId) -> bool {
        let removed = self.instances.write().remove(id);
        match removed {
            Some(instance) => {
                self.disconnect(&instance).await;
                tracing::info!(broker = %instance.broker, instance_id = %id, "Broker instance destroyed");
                true
            }
            None => false,
        }
    }

    /// Put an instance into or out of maintenance.
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound` if the ID is unknown.
    pub fn set_maintenance(&self, id: &InstanceId, maintenance: bool) -> Result<InstanceInfo, RegistryError> {
        let mut instances = self.instances.write();
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| RegistryError::InstanceNotFound(id.clone()))?;

        let in_maintenance = instance.status == InstanceStatus::Maintenance;
        if maintenance && !in_maintenance {
            instance.status = InstanceStatus::Maintenance;
            tracing::info!(broker = %instance.broker, instance_id = %id, "Instance entered maintenance");
        } else if !maintenance && in_maintenance {
            instance.status = instance.resting_status;
            instance.error_count = 0;
            tracing::info!(
                broker = %instance.broker,
                instance_id = %id,
                status = %instance.status,
                "Instance left maintenance"
            );
        }
        Ok(instance.info())
    }

    /// Snapshot of one instance.
    #[must_use]
    pub fn get_instance(&self, id: &InstanceId) -> Option<InstanceInfo> {
        self.instances.read().get(id).map(BrokerInstance::info)
    }

    /// Snapshots of every instance, oldest first.
    #[must_use]
    pub fn list_instances(&self) -> Vec<InstanceInfo> {
        let mut infos: Vec<InstanceInfo> =
            self.instances.read().values().map(BrokerInstance::info).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        infos
    }

    /// Adapter of one instance.
    #[must_use]
    pub fn adapter(&self, id: &InstanceId) -> Option<Arc<dyn BrokerAdapter>> {
        self.instances.read().get(id).map(|i| Arc::clone(&i.adapter))
    }

    /// Best routable adapter for a broker: connected before disconnected
    /// before failing, oldest first. Instances in maintenance are skipped.
    #[must_use]
    pub fn adapter_for(&self, broker: &str) -> Option<Arc<dyn BrokerAdapter>> {
        self.instances
            .read()
            .values()
            .filter(|i| i.broker == broker)
            .filter_map(|i| i.status.routing_rank().map(|rank| (rank, i)))
            .min_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.created_at.cmp(&b.created_at)))
            .map(|(_, i)| Arc::clone(&i.adapter))
    }

    /// Every routable `(broker, adapter)` pair, one per broker.
    #[must_use]
    pub fn routable_adapters(&self) -> Vec<(String, Arc<dyn BrokerAdapter>)> {
        self.registered_brokers()
            .into_iter()
            .filter_map(|name| self.adapter_for(&name).map(|adapter| (name, adapter)))
            .collect()
    }

    /// Registry-wide summary.
    #[must_use]
    pub fn registry_status(&self) -> RegistryStatus {
        let (registered_brokers, enabled_brokers) = {
            let registrations = self.registrations.read();
            let enabled = registrations
                .order
                .iter()
                .filter(|n| registrations.by_name.get(*n).is_some_and(|r| r.enabled))
                .cloned()
                .collect();
            (registrations.order.clone(), enabled)
        };

        let instances = self.instances.read();
        let mut instances_by_status = BTreeMap::new();
        let mut instances_by_broker = BTreeMap::new();
        for instance in instances.values() {
            *instances_by_status.entry(instance.status).or_insert(0) += 1;
            *instances_by_broker.entry(instance.broker.clone()).or_insert(0) += 1;
        }

        RegistryStatus {
            registered_brokers,
            enabled_brokers,
            total_instances: instances.len(),
            instances_by_status,
            instances_by_broker,
        }
    }

    // ------------------------------------------------------------------
    // Health checks
    // ------------------------------------------------------------------

    /// Run one health-check round over every instance not in maintenance.
    ///
    /// Adapters are called concurrently and without the lock held; counters
    /// are updated afterwards under the lock. Evicted adapters are
    /// disconnected once, after removal.
    pub async fn run_health_checks(&self) -> HealthCheckRound {
        let targets: Vec<(InstanceId, String, Arc<dyn BrokerAdapter>)> = self
            .instances
            .read()
            .values()
            .filter(|i| !matches!(i.status, InstanceStatus::Maintenance | InstanceStatus::Initializing))
            .map(|i| (i.id.clone(), i.broker.clone(), Arc::clone(&i.adapter)))
            .collect();

        let budget = self.config.health_check_timeout;
        let results = join_all(targets.into_iter().map(|(id, broker, adapter)| async move {
            let outcome = match timeout(budget, adapter.health_check()).await {
                Ok(Ok(report)) => HealthOutcome::Report(report),
                Ok(Err(e)) => HealthOutcome::Failed(e.to_string()),
                Err(_) => HealthOutcome::TimedOut,
            };
            (id, broker, outcome)
        }))
        .await;

        let mut round = HealthCheckRound::default();
        let evicted: Vec<BrokerInstance> = {
            let mut instances = self.instances.write();
            let now = Utc::now();
            let mut to_evict = Vec::new();

            for (id, broker, outcome) in results {
                let Some(instance) = instances.get_mut(&id) else {
                    continue;
                };
                if instance.status == InstanceStatus::Maintenance {
                    continue;
                }
                round.checked += 1;
                instance.last_health_at = Some(now);

                let (report, label) = match outcome {
                    HealthOutcome::Report(report) if report.is_healthy() => (report, "healthy"),
                    HealthOutcome::Report(report) => (report, "unhealthy"),
                    HealthOutcome::Failed(reason) => (HealthReport::unhealthy(reason), "error"),
                    HealthOutcome::TimedOut => {
                        (HealthReport::unhealthy("health check timed out"), "timeout")
                    }
                };
                observability::record_health_check(&broker, label);

                if report.is_healthy() {
                    round.healthy += 1;
                    instance.error_count = instance.error_count.saturating_sub(1);
                    if instance.status == InstanceStatus::Error && instance.error_count == 0 {
                        instance.status = instance.resting_status;
                        tracing::info!(broker = %broker, instance_id = %id, "Broker instance recovered");
                    }
                } else {
                    round.failed += 1;
                    instance.error_count += 1;
                    instance.status = InstanceStatus::Error;
                    tracing::warn!(
                        broker = %broker,
                        instance_id = %id,
                        outcome = label,
                        error_count = instance.error_count,
                        max = self.config.max_consecutive_failures,
                        "Broker health check failed"
                    );
                    if instance.error_count >= self.config.max_consecutive_failures {
                        to_evict.push(id.clone());
                    }
                }
                instance.last_health = Some(report);
            }

            to_evict
                .iter()
                .filter_map(|id| instances.remove(id))
                .collect()
        };

        for instance in evicted {
            tracing::error!(
                broker = %instance.broker,
                instance_id = %instance.id,
                error_count = instance.error_count,
                "Evicting broker instance after repeated health failures"
            );
            observability::record_instance_evicted(&instance.broker);
            self.disconnect(&instance).await;
            round.evicted.push(instance.id);
        }

        round
    }

    /// Start the background health-check loop. Calling it again while the
    /// loop runs has no effect.
    pub fn start_health_checks(self: &Arc<Self>) {
        let mut task = self.health_task.lock();
        if task.is_some() {
            return;
        }

        let registry = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let period = self.config.health_check_interval;

        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(registry) = registry.upgrade() else {
                            break;
                        };
                        let round = registry.run_health_checks().await;
                        tracing::debug!(
                            checked = round.checked,
                            healthy = round.healthy,
                            failed = round.failed,
                            evicted = round.evicted.len(),
                            "Health-check round complete"
                        );
                    }
                    () = shutdown.cancelled() => {
                        tracing::info!("Registry health-check loop shutting down");
                        break;
                    }
                }
            }
        }));

        tracing::info!(interval_secs = period.as_secs(), "Registry health-check loop started");
    }

    /// Stop the health-check loop and disconnect every instance.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.health_task.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Health-check task ended abnormally");
        }

        let drained: Vec<BrokerInstance> =
            self.instances.write().drain().map(|(_, instance)| instance).collect();
        for instance in &drained {
            self.disconnect(instance).await;
        }
        tracing::info!(instances = drained.len(), "Broker registry shut down");
    }

    async fn disconnect(&self, instance: &BrokerInstance) {
        match timeout(self.config.disconnect_timeout, instance.adapter.disconnect()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(
                broker = %instance.broker,
                instance_id = %instance.id,
                error = %e,
                "Adapter disconnect failed"
            ),
            Err(_) => tracing::warn!(
                broker = %instance.broker,
                instance_id = %instance.id,
                "Adapter disconnect timed out"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{HealthStatus, MockBrokerAdapter};
    use crate::domain::errors::StandardErrorCode;
    use serde_json::json;

    fn config() -> RegistryConfig {
        RegistryConfig {
            health_check_interval: Duration::from_secs(10),
            max_consecutive_failures: 3,
            ..RegistryConfig::default()
        }
    }

    fn registration_for(name: &str, mock: MockBrokerAdapter) -> BrokerRegistration {
        let adapter: Arc<dyn BrokerAdapter> = Arc::new(mock);
        BrokerRegistration::new(name, "1.0", move |_| Ok(Arc::clone(&adapter)))
            .with_capabilities([BrokerCapability::MarketOrders])
    }

    fn authenticating_mock(accept: bool) -> MockBrokerAdapter {
        let mut mock = MockBrokerAdapter::new();
        mock.expect_authenticate().returning(move |_| Ok(accept));
        mock
    }

    #[tokio::test]
    async fn valid_credentials_yield_connected_instance() {
        let registry = BrokerRegistry::new(config());
        registry.register_adapter(registration_for("oanda", authenticating_mock(true)));

        let info = registry
            .create_adapter("oanda", json!({"credentials": {"api_key": "good"}}))
            .await
            .unwrap();
        assert_eq!(info.status, InstanceStatus::Connected);
        assert_eq!(registry.list_instances().len(), 1);
        assert!(registry.adapter_for("oanda").is_some());
    }

    #[tokio::test]
    async fn rejected_credentials_retain_no_instance() {
        let registry = BrokerRegistry::new(config());
        registry.register_adapter(registration_for("oanda", authenticating_mock(false)));

        let err = registry
            .create_adapter("oanda", json!({"credentials": {"api_key": "bad"}}))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::BrokerAuthentication { .. }));
        assert!(registry.list_instances().is_empty());
    }

    #[tokio::test]
    async fn authentication_error_is_wrapped() {
        let mut mock = MockBrokerAdapter::new();
        mock.expect_authenticate().returning(|_| {
            Err(StandardBrokerError::new(StandardErrorCode::ConnectionError, "down"))
        });
        let registry = BrokerRegistry::new(config());
        registry.register_adapter(registration_for("ib", mock));

        let err = registry
            .create_adapter("ib", json!({"credentials": {"api_key": "k"}}))
            .await
            .unwrap_err();
        match err {
            RegistryError::BrokerAuthentication { source, .. } => {
                assert_eq!(source.unwrap().error_code(), StandardErrorCode::ConnectionError);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_credentials_yields_disconnected() {
        let registry = BrokerRegistry::new(config());
        registry.register_adapter(registration_for("paper", MockBrokerAdapter::new()));
        let info = registry.create_adapter("paper", json!({})).await.unwrap();
        assert_eq!(info.status, InstanceStatus::Disconnected);
    }

    #[tokio::test]
    async fn creation_errors() {
        let registry = BrokerRegistry::new(config());
        let err = registry.create_adapter("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedBroker(_)));

        registry.register_adapter(registration_for("off", MockBrokerAdapter::new()).enabled(false));
        let err = registry.create_adapter("off", json!({})).await.unwrap_err();
        assert!(matches!(err, RegistryError::BrokerDisabled(_)));

        registry.register_adapter(
            registration_for("strict", MockBrokerAdapter::new())
                .with_schema(ConfigSchema::new().required("environment", FieldType::String)),
        );
        let err = registry.create_adapter("strict", json!({"environment": 5})).await.unwrap_err();
        assert!(matches!(err, RegistryError::BrokerConfiguration { .. }));

        let err = registry
            .create_adapter("strict", json!({"environment": "x", "credentials": "not-an-object"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::BrokerConfiguration { .. }));
    }

    #[tokio::test]
    async fn eviction_disconnects_exactly_once() {
        let mut mock = authenticating_mock(true);
        mock.expect_health_check().returning(|| {
            Err(StandardBrokerError::new(StandardErrorCode::ConnectionError, "unreachable"))
        });
        mock.expect_disconnect().times(1).returning(|| Ok(true));

        let registry = BrokerRegistry::new(config());
        registry.register_adapter(registration_for("oanda", mock));
        let info = registry
            .create_adapter("oanda", json!({"credentials": {"api_key": "k"}}))
            .await
            .unwrap();

        let first = registry.run_health_checks().await;
        assert_eq!(first.failed, 1);
        assert_eq!(registry.get_instance(&info.id).unwrap().status, InstanceStatus::Error);
        registry.run_health_checks().await;
        let third = registry.run_health_checks().await;
        assert_eq!(third.evicted, vec![info.id.clone()]);
        assert!(registry.get_instance(&info.id).is_none());

        // Nothing left to check or disconnect.
        let fourth = registry.run_health_checks().await;
        assert_eq!(fourth.checked, 0);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn healthy_checks_decay_error_counter_and_recover() {
        let mut mock = authenticating_mock(true);
        let mut calls = 0;
        mock.expect_health_check().returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(HealthReport {
                    status: HealthStatus::Degraded,
                    latency_ms: None,
                    details: std::collections::BTreeMap::new(),
                })
            } else {
                Ok(HealthReport::healthy())
            }
        });

        let registry = BrokerRegistry::new(config());
        registry.register_adapter(registration_for("oanda", mock));
        let info = registry
            .create_adapter("oanda", json!({"credentials": {"api_key": "k"}}))
            .await
            .unwrap();

        registry.run_health_checks().await;
        let after_failure = registry.get_instance(&info.id).unwrap();
        assert_eq!(after_failure.error_count, 1);
        assert_eq!(after_failure.status, InstanceStatus::Error);

        registry.run_health_checks().await;
        let recovered = registry.get_instance(&info.id).unwrap();
        assert_eq!(recovered.error_count, 0);
        assert_eq!(recovered.status, InstanceStatus::Connected);

        registry.run_health_checks().await;
        assert_eq!(registry.get_instance(&info.id).unwrap().error_count, 0);
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let mut mock = MockBrokerAdapter::new();
        mock.expect_disconnect().times(1).returning(|| Ok(true));
        let registry = BrokerRegistry::new(config());
        registry.register_adapter(registration_for("paper", mock));
        let info = registry.create_adapter("paper", json!({})).await.unwrap();

        assert!(registry.destroy_adapter(&info.id).await);
        assert!(!registry.destroy_adapter(&info.id).await);
    }

    #[tokio::test]
    async fn maintenance_is_skipped_by_health_checks_and_routing() {
        let mut mock = MockBrokerAdapter::new();
        mock.expect_health_check().never();
        let registry = BrokerRegistry::new(config());
        registry.register_adapter(registration_for("paper", mock));
        let info = registry.create_adapter("paper", json!({})).await.unwrap();

        registry.set_maintenance(&info.id, true).unwrap();
        assert!(registry.adapter_for("paper").is_none());
        assert_eq!(registry.run_health_checks().await.checked, 0);

        let info = registry.set_maintenance(&info.id, false).unwrap();
        assert_eq!(info.status, InstanceStatus::Disconnected);
        assert!(registry.adapter_for("paper").is_some());

        let missing = InstanceId::new("missing");
        assert!(matches!(
            registry.set_maintenance(&missing, true),
            Err(RegistryError::InstanceNotFound(_))
        ));
    }

    #[test]
    fn duplicate_registration_replaces_and_keeps_order() {
        let registry = BrokerRegistry::new(config());
        registry.register_adapter(registration_for("a", MockBrokerAdapter::new()));
        registry.register_adapter(registration_for("b", MockBrokerAdapter::new()));
        registry.register_adapter(
            BrokerRegistration::new("a", "2.0", |_| {
                Err(StandardBrokerError::new(StandardErrorCode::InternalError, "unused"))
            })
            .with_capabilities([BrokerCapability::Hedging]),
        );

        assert_eq!(registry.registered_brokers(), vec!["a", "b"]);
        assert_eq!(registry.brokers_with_capability(BrokerCapability::Hedging), vec!["a"]);
        assert_eq!(registry.brokers_with_capability(BrokerCapability::MarketOrders), vec!["b"]);
        assert!(registry
            .broker_capabilities("a")
            .unwrap()
            .contains(&BrokerCapability::Hedging));
        assert_eq!(registry.first_registered().as_deref(), Some("a"));

        registry.set_enabled("a", false).unwrap();
        assert_eq!(registry.first_registered().as_deref(), Some("b"));
        assert!(registry.unregister_adapter("b"));
        assert!(!registry.unregister_adapter("b"));
        assert_eq!(registry.registry_status().enabled_brokers, Vec::<String>::new());
    }

    #[tokio::test(start_paused = true)]
    async fn background_loop_evicts_failing_instance() {
        let mut mock = MockBrokerAdapter::new();
        mock.expect_health_check().returning(|| Ok(HealthReport::unhealthy("down")));
        mock.expect_disconnect().times(1).returning(|| Ok(true));

        let registry = Arc::new(BrokerRegistry::new(config()));
        registry.register_adapter(registration_for("paper", mock));
        let info = registry.create_adapter("paper", json!({})).await.unwrap();

        registry.start_health_checks();
        tokio::time::sleep(Duration::from_secs(35)).await;

        assert!(registry.get_instance(&info.id).is_none());
        registry.shutdown().await;
    }
}
