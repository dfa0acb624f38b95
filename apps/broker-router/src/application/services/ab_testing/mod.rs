//! Traffic Router and A/B Testing Framework
//!
//! Routes orders between brokers under experiments, places them through the
//! registry's adapters and records every outcome, then analyzes the
//! recorded executions for a statistically significant winner.
//!
//! # Locking
//!
//! All tests and their execution histories live behind one `RwLock`.
//! Round-robin selection reads a test's recorded count under that lock and
//! appends take the write side of the same lock, so a routing decision never
//! observes a half-written history. No lock is held across an adapter call.

mod analysis;
mod error;
mod routing;

pub use error::RouterError;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::{Instant, timeout};

use crate::application::services::error_mapping::ErrorAggregator;
use crate::application::services::performance::PerformanceMetricsCollector;
use crate::application::services::registry::BrokerRegistry;
use crate::domain::ab_testing::{
    ABTestConfig, ABTestResults, RoutingStrategy, TestConfigError, TestStatus,
};
use crate::domain::errors::{StandardBrokerError, StandardErrorCode};
use crate::domain::order_execution::{BrokerOrder, OrderExecution, OrderResult};
use crate::domain::performance::HealthThresholds;
use crate::domain::shared::TestId;
use crate::observability;

/// Router tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    /// Budget for one `place_order` call.
    pub order_timeout: Duration,
    /// Executions retained per test.
    pub execution_history_capacity: usize,
    /// Execution samples scored by performance-based routing.
    pub performance_window: usize,
    /// Thresholds for analysis warnings.
    pub thresholds: HealthThresholds,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            order_timeout: Duration::from_secs(30),
            execution_history_capacity: 10_000,
            performance_window: 10,
            thresholds: HealthThresholds::default(),
        }
    }
}

/// Where an order goes and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Selected broker.
    pub broker: String,
    /// Test that made the choice; `None` for the fallback broker.
    pub test_id: Option<TestId>,
    /// Strategy used, if a test routed the order.
    pub strategy: Option<RoutingStrategy>,
}

impl RoutingDecision {
    fn fallback(broker: String) -> Self {
        Self {
            broker,
            test_id: None,
            strategy: None,
        }
    }

    fn strategy_label(&self) -> String {
        self.strategy
            .map_or_else(|| "fallback".to_string(), |s| s.to_string())
    }
}

struct TestEntry {
    config: ABTestConfig,
    executions: VecDeque<OrderExecution>,
    /// Every execution ever recorded, including evicted ones.
    total_recorded: u64,
}

#[derive(Default)]
struct Tests {
    by_id: HashMap<TestId, TestEntry>,
    /// Creation order; the first matching active test wins.
    order: Vec<TestId>,
}

/// Routes orders and manages A/B tests.
pub struct TrafficRouter {
    config: RouterConfig,
    registry: Arc<BrokerRegistry>,
    collector: Arc<PerformanceMetricsCollector>,
    /// Receives errors the router raises itself (timeouts, no instance).
    errors: Option<Arc<ErrorAggregator>>,
    tests: RwLock<Tests>,
}

impl std::fmt::Debug for TrafficRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficRouter")
            .field("config", &self.config)
            .field("tests", &self.tests.read().order.len())
            .finish_non_exhaustive()
    }
}

impl TrafficRouter {
    /// Create a router over a registry, feeding executions to `collector`.
    #[must_use]
    pub fn new(
        config: RouterConfig,
        registry: Arc<BrokerRegistry>,
        collector: Arc<PerformanceMetricsCollector>,
    ) -> Self {
        Self {
            config,
            registry,
            collector,
            errors: None,
            tests: RwLock::new(Tests::default()),
        }
    }

    /// Record router-raised errors into `aggregator`. Adapter errors reach
    /// it through the [`ErrorMapper`](super::ErrorMapper) that mapped them.
    #[must_use]
    pub fn with_error_aggregator(mut self, aggregator: Arc<ErrorAggregator>) -> Self {
        self.errors = Some(aggregator);
        self
    }

    /// Router configuration.
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    // ========================================================================
    // Test lifecycle
    // ========================================================================

    /// Register a draft test.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTest` if the configuration is invalid or not a draft,
    /// and `UnregisteredBroker` if a split names an unknown broker.
    pub fn create_test(&self, config: ABTestConfig) -> Result<TestId, RouterError> {
        config.validate()?;
        if config.status() != TestStatus::Draft {
            return Err(RouterError::InvalidTest(TestConfigError::InvalidTransition {
                from: config.status(),
                to: TestStatus::Draft,
            }));
        }
        if let Some(unknown) = config.brokers().find(|b| !self.registry.is_registered(b)) {
            return Err(RouterError::UnregisteredBroker(unknown.to_string()));
        }

        let test_id = config.test_id.clone();
        tracing::info!(
            test_id = %test_id,
            name = %config.name,
            strategy = %config.strategy,
            brokers = ?config.brokers().collect::<Vec<_>>(),
            "A/B test created"
        );
        let mut tests = self.tests.write();
        tests.order.push(test_id.clone());
        tests.by_id.insert(
            test_id.clone(),
            TestEntry {
                config,
                executions: VecDeque::new(),
                total_recorded: 0,
            },
        );
        Ok(test_id)
    }

    fn transition(&self, test_id: &TestId, to: TestStatus) -> Result<ABTestConfig, RouterError> {
        let (config, active) = {
            let mut tests = self.tests.write();
            let entry = tests
                .by_id
                .get_mut(test_id)
                .ok_or_else(|| RouterError::TestNotFound(test_id.clone()))?;
            let from = entry.config.status();
            entry.config.transition(to)?;
            tracing::info!(test_id = %test_id, from = %from, to = %to, "A/B test status changed");
            let config = entry.config.clone();
            (config, count_active(&tests))
        };
        observability::update_active_tests(active);
        Ok(config)
    }

    /// Start a draft test or resume a paused one.
    ///
    /// # Errors
    ///
    /// Returns `TestNotFound` or `InvalidTest` for an illegal transition.
    pub fn start_test(&self, test_id: &TestId) -> Result<ABTestConfig, RouterError> {
        self.transition(test_id, TestStatus::Active)
    }

    /// Pause an active test.
    ///
    /// # Errors
    ///
    /// Returns `TestNotFound` or `InvalidTest` for an illegal transition.
    pub fn pause_test(&self, test_id: &TestId) -> Result<ABTestConfig, RouterError> {
        self.transition(test_id, TestStatus::Paused)
    }

    /// Complete a test.
    ///
    /// # Errors
    ///
    /// Returns `TestNotFound` or `InvalidTest` for an illegal transition.
    pub fn stop_test(&self, test_id: &TestId) -> Result<ABTestConfig, RouterError> {
        self.transition(test_id, TestStatus::Completed)
    }

    /// Abandon a test.
    ///
    /// # Errors
    ///
    /// Returns `TestNotFound` or `InvalidTest` for an illegal transition.
    pub fn cancel_test(&self, test_id: &TestId) -> Result<ABTestConfig, RouterError> {
        self.transition(test_id, TestStatus::Cancelled)
    }

    /// A test's configuration.
    #[must_use]
    pub fn get_test(&self, test_id: &TestId) -> Option<ABTestConfig> {
        self.tests.read().by_id.get(test_id).map(|e| e.config.clone())
    }

    /// All tests in creation order.
    #[must_use]
    pub fn list_tests(&self) -> Vec<ABTestConfig> {
        let tests = self.tests.read();
        tests
            .order
            .iter()
            .filter_map(|id| tests.by_id.get(id))
            .map(|e| e.config.clone())
            .collect()
    }

    /// Number of active tests.
    #[must_use]
    pub fn active_test_count(&self) -> usize {
        count_active(&self.tests.read())
    }

    /// Retained executions of a test, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `TestNotFound` for an unknown test.
    pub fn get_test_executions(&self, test_id: &TestId) -> Result<Vec<OrderExecution>, RouterError> {
        self.tests
            .read()
            .by_id
            .get(test_id)
            .map(|e| e.executions.iter().cloned().collect())
            .ok_or_else(|| RouterError::TestNotFound(test_id.clone()))
    }

    /// Executions ever recorded for a test, including evicted ones.
    ///
    /// # Errors
    ///
    /// Returns `TestNotFound` for an unknown test.
    pub fn total_recorded(&self, test_id: &TestId) -> Result<u64, RouterError> {
        self.tests
            .read()
            .by_id
            .get(test_id)
            .map(|e| e.total_recorded)
            .ok_or_else(|| RouterError::TestNotFound(test_id.clone()))
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Choose a broker for an order.
    ///
    /// With a `test_id` only that test is considered; otherwise the first
    /// active test whose window and filters match. Expired tests are
    /// completed on the spot. Without a matching test the first enabled
    /// registered broker is used.
    ///
    /// # Errors
    ///
    /// Returns `TestNotFound` for an unknown `test_id` and
    /// `NoBrokersAvailable` when nothing is registered.
    pub fn route_order(
        &self,
        order: &BrokerOrder,
        test_id: Option<&TestId>,
    ) -> Result<RoutingDecision, RouterError> {
        self.route_at(order, test_id, Utc::now())
    }

    fn route_at(
        &self,
        order: &BrokerOrder,
        test_id: Option<&TestId>,
        now: DateTime<Utc>,
    ) -> Result<RoutingDecision, RouterError> {
        if let Some(id) = test_id
            && !self.tests.read().by_id.contains_key(id)
        {
            return Err(RouterError::TestNotFound(id.clone()));
        }

        self.expire_tests(now);

        let decision = {
            let tests = self.tests.read();
            let candidates: Vec<&TestId> = match test_id {
                Some(id) => vec![id],
                None => tests.order.iter().collect(),
            };
            candidates
                .into_iter()
                .filter_map(|id| tests.by_id.get(id))
                .find(|e| e.config.is_within_window(now) && e.config.applies_to(order, now))
                .and_then(|entry| {
                    self.select(entry, order).map(|broker| RoutingDecision {
                        broker: broker.to_string(),
                        test_id: Some(entry.config.test_id.clone()),
                        strategy: Some(entry.config.strategy),
                    })
                })
        };

        match decision {
            Some(decision) => Ok(decision),
            None => self
                .registry
                .first_registered()
                .map(RoutingDecision::fallback)
                .ok_or(RouterError::NoBrokersAvailable),
        }
    }

    /// Complete every active or paused test whose window has ended.
    fn expire_tests(&self, now: DateTime<Utc>) {
        let active = {
            let mut tests = self.tests.write();
            let mut expired = false;
            for entry in tests.by_id.values_mut() {
                let status = entry.config.status();
                if matches!(status, TestStatus::Active | TestStatus::Paused)
                    && entry.config.is_expired(now)
                    && entry.config.transition(TestStatus::Completed).is_ok()
                {
                    expired = true;
                    tracing::info!(
                        test_id = %entry.config.test_id,
                        name = %entry.config.name,
                        "A/B test window ended, test completed"
                    );
                }
            }
            expired.then(|| count_active(&tests))
        };
        if let Some(active) = active {
            observability::update_active_tests(active);
        }
    }

    fn select<'a>(&self, entry: &'a TestEntry, order: &BrokerOrder) -> Option<&'a str> {
        let splits = entry.config.splits();
        match entry.config.strategy {
            RoutingStrategy::Random => routing::route_random(splits, &mut rand::rng()),
            RoutingStrategy::HashBased => routing::route_hash_based(splits, order),
            RoutingStrategy::WeightedRandom => routing::route_weighted(splits, &mut rand::rng()),
            RoutingStrategy::RoundRobin => routing::route_round_robin(splits, entry.total_recorded),
            RoutingStrategy::PerformanceBased => {
                routing::route_performance_based(splits, |broker| {
                    self.collector
                        .recent_executions(broker, self.config.performance_window)
                })
                .or_else(|| routing::route_random(splits, &mut rand::rng()))
            }
        }
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Route an order, place it and record the outcome.
    ///
    /// The execution is recorded into the test and the metrics collector
    /// before any error is returned.
    ///
    /// # Errors
    ///
    /// Returns routing errors, `AdapterUnavailable` when the broker has no
    /// live instance, and `Broker` for placement failures and timeouts.
    pub async fn execute_order_with_test(
        &self,
        order: BrokerOrder,
        test_id: Option<&TestId>,
    ) -> Result<OrderResult, RouterError> {
        let decision = self.route_order(&order, test_id)?;
        let broker = decision.broker.clone();

        let Some(adapter) = self.registry.adapter_for(&broker) else {
            let error = StandardBrokerError::new(
                StandardErrorCode::ServiceUnavailable,
                format!("No available instance of broker {broker}"),
            )
            .with_broker(broker.as_str());
            self.aggregate(&error);
            let execution =
                OrderExecution::failed(decision.test_id.clone(), broker.as_str(), order, &error, 0.0);
            self.record(&decision, execution);
            return Err(RouterError::AdapterUnavailable(broker));
        };

        let started = Instant::now();
        let outcome = match timeout(self.config.order_timeout, adapter.place_order(&order)).await {
            Ok(result) => result,
            Err(_) => {
                let error = StandardBrokerError::timeout(
                    "place_order",
                    self.config.order_timeout.as_secs(),
                )
                .with_broker(broker.as_str());
                self.aggregate(&error);
                Err(error)
            }
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;

        match outcome {
            Ok(result) => {
                let execution = OrderExecution::succeeded(
                    decision.test_id.clone(),
                    broker.as_str(),
                    order,
                    result.clone(),
                    latency_ms,
                );
                self.record(&decision, execution);
                Ok(result)
            }
            Err(error) => {
                tracing::warn!(
                    broker = %broker,
                    test_id = ?decision.test_id,
                    code = %error.error_code(),
                    error = %error,
                    "Order placement failed"
                );
                let execution =
                    OrderExecution::failed(decision.test_id.clone(), broker.as_str(), order, &error, latency_ms);
                self.record(&decision, execution);
                Err(RouterError::Broker(error))
            }
        }
    }

    fn aggregate(&self, error: &StandardBrokerError) {
        if let Some(errors) = &self.errors {
            errors.record(error.clone());
        }
    }

    /// Append to the test history and feed the metrics collector.
    fn record(&self, decision: &RoutingDecision, execution: OrderExecution) {
        observability::record_order_routed(
            &execution.broker,
            &decision.strategy_label(),
            execution.success,
            execution.latency_ms / 1_000.0,
        );
        self.collector.record_execution(&execution);

        let Some(test_id) = &decision.test_id else {
            return;
        };
        let mut tests = self.tests.write();
        if let Some(entry) = tests.by_id.get_mut(test_id) {
            if entry.executions.len() >= self.config.execution_history_capacity {
                entry.executions.pop_front();
            }
            entry.executions.push_back(execution);
            entry.total_recorded += 1;
        }
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    /// Analyze a test's retained executions.
    ///
    /// # Errors
    ///
    /// Returns `TestNotFound` for an unknown test.
    pub fn analyze_test_results(&self, test_id: &TestId) -> Result<ABTestResults, RouterError> {
        let (config, executions) = {
            let tests = self.tests.read();
            let entry = tests
                .by_id
                .get(test_id)
                .ok_or_else(|| RouterError::TestNotFound(test_id.clone()))?;
            (
                entry.config.clone(),
                entry.executions.iter().cloned().collect::<Vec<_>>(),
            )
        };
        let results = analysis::analyze(&config, &executions, &self.config.thresholds);
        tracing::info!(
            test_id = %test_id,
            executions = results.total_executions,
            winner = results.winner.as_deref().unwrap_or("none"),
            "A/B test analyzed"
        );
        Ok(results)
    }
}

fn count_active(tests: &Tests) -> usize {
    tests
        .by_id
        .values()
        .filter(|e| e.config.status() == TestStatus::Active)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{BrokerAdapter, MockBrokerAdapter};
    use crate::application::services::performance::MetricsCollectorConfig;
    use crate::application::services::registry::{BrokerRegistration, RegistryConfig};
    use crate::domain::ab_testing::{TestFilters, TrafficSplit};
    use crate::domain::capability::BrokerDescriptor;
    use crate::domain::order_execution::{OrderSide, OrderStatus};
    use crate::domain::shared::BrokerOrderId;
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn mock(name: &'static str, fail: bool) -> Arc<dyn BrokerAdapter> {
        let mut mock = MockBrokerAdapter::new();
        mock.expect_descriptor()
            .return_const(BrokerDescriptor::new(name, name, "v1"));
        mock.expect_place_order().returning(move |_| {
            if fail {
                Err(StandardBrokerError::new(StandardErrorCode::InsufficientMargin, "no margin")
                    .with_retry(false, None))
            } else {
                Ok(OrderResult::accepted(BrokerOrderId::new("b-1"), OrderStatus::Filled))
            }
        });
        Arc::new(mock)
    }

    async fn router(brokers: &[(&'static str, bool)]) -> TrafficRouter {
        let registry = Arc::new(BrokerRegistry::new(RegistryConfig::default()));
        for (name, fail) in brokers {
            let adapter = mock(name, *fail);
            registry.register_adapter(BrokerRegistration::new(*name, "1", move |_| Ok(Arc::clone(&adapter))));
            registry.create_adapter(name, json!({})).await.unwrap();
        }
        let collector = Arc::new(PerformanceMetricsCollector::new(
            MetricsCollectorConfig::default(),
            Arc::clone(&registry),
        ));
        TrafficRouter::new(RouterConfig::default(), registry, collector)
    }

    fn split_test(strategy: RoutingStrategy) -> ABTestConfig {
        ABTestConfig::new(
            "a-vs-b",
            vec![TrafficSplit::new("a", 50.0), TrafficSplit::new("b", 50.0)],
            strategy,
        )
        .unwrap()
    }

    fn order() -> BrokerOrder {
        BrokerOrder::market("EUR_USD", OrderSide::Buy, dec!(10))
    }

    #[tokio::test]
    async fn create_rejects_unregistered_broker() {
        let router = router(&[("a", false)]).await;
        let err = router.create_test(split_test(RoutingStrategy::Random)).unwrap_err();
        assert!(matches!(err, RouterError::UnregisteredBroker(b) if b == "b"));
        assert!(router.list_tests().is_empty());
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let router = router(&[("a", false), ("b", false)]).await;
        let id = router.create_test(split_test(RoutingStrategy::Random)).unwrap();
        assert_eq!(router.get_test(&id).unwrap().status(), TestStatus::Draft);

        router.start_test(&id).unwrap();
        assert_eq!(router.active_test_count(), 1);
        router.pause_test(&id).unwrap();
        router.start_test(&id).unwrap();
        router.stop_test(&id).unwrap();
        assert_eq!(router.active_test_count(), 0);

        let err = router.start_test(&id).unwrap_err();
        assert!(matches!(
            err,
            RouterError::InvalidTest(TestConfigError::InvalidTransition { .. })
        ));
        assert!(matches!(
            router.cancel_test(&TestId::new("missing")),
            Err(RouterError::TestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn round_robin_alternates_through_execution() {
        let router = router(&[("a", false), ("b", false)]).await;
        let id = router.create_test(split_test(RoutingStrategy::RoundRobin)).unwrap();
        router.start_test(&id).unwrap();

        for _ in 0..10 {
            router.execute_order_with_test(order(), Some(&id)).await.unwrap();
        }
        let executions = router.get_test_executions(&id).unwrap();
        let to_a = executions.iter().filter(|e| e.broker == "a").count();
        assert_eq!(to_a, 5);
        assert_eq!(executions[0].broker, "a");
        assert_eq!(executions[1].broker, "b");
        assert_eq!(router.total_recorded(&id).unwrap(), 10);
    }

    #[tokio::test]
    async fn failure_is_recorded_then_returned() {
        let router = router(&[("a", true), ("b", true)]).await;
        let id = router.create_test(split_test(RoutingStrategy::HashBased)).unwrap();
        router.start_test(&id).unwrap();

        let err = router.execute_order_with_test(order(), Some(&id)).await.unwrap_err();
        let RouterError::Broker(error) = err else {
            panic!("expected broker error");
        };
        assert_eq!(error.error_code(), StandardErrorCode::InsufficientMargin);

        let executions = router.get_test_executions(&id).unwrap();
        assert_eq!(executions.len(), 1);
        assert!(!executions[0].success);
        assert_eq!(executions[0].error_code, Some(StandardErrorCode::InsufficientMargin));
        assert!(router.collector.knows(&executions[0].broker));
    }

    #[tokio::test]
    async fn missing_instance_error_reaches_aggregator() {
        let aggregator = Arc::new(ErrorAggregator::default());
        let router = router(&[("a", false)])
            .await
            .with_error_aggregator(Arc::clone(&aggregator));
        let id = router.registry.list_instances()[0].id.clone();
        router.registry.set_maintenance(&id, true).unwrap();

        let err = router.execute_order_with_test(order(), None).await.unwrap_err();
        assert!(matches!(err, RouterError::AdapterUnavailable(b) if b == "a"));

        let summary = aggregator.error_summary(TimeDelta::hours(1));
        assert_eq!(summary.total_errors, 1);
        assert_eq!(summary.by_code[&StandardErrorCode::ServiceUnavailable], 1);
        assert_eq!(summary.by_broker["a"], 1);
    }

    #[tokio::test]
    async fn unmatched_order_falls_back_to_first_broker() {
        let router = router(&[("a", false), ("b", false)]).await;
        let filters = TestFilters {
            instruments: ["BTC_USD".to_string()].into(),
            ..TestFilters::default()
        };
        let id = router
            .create_test(split_test(RoutingStrategy::Random).with_filters(filters))
            .unwrap();
        router.start_test(&id).unwrap();

        let decision = router.route_order(&order(), None).unwrap();
        assert_eq!(decision, RoutingDecision::fallback("a".to_string()));

        let crypto = BrokerOrder::market("BTC_USD", OrderSide::Buy, dec!(1));
        let decision = router.route_order(&crypto, None).unwrap();
        assert_eq!(decision.test_id, Some(id));
    }

    #[tokio::test]
    async fn expired_test_completes_during_routing() {
        let router = router(&[("a", false), ("b", false)]).await;
        let id = router
            .create_test(split_test(RoutingStrategy::Random).with_duration(TimeDelta::minutes(5)))
            .unwrap();
        router.start_test(&id).unwrap();

        let later = Utc::now() + TimeDelta::minutes(10);
        let decision = router.route_at(&order(), Some(&id), later).unwrap();
        assert_eq!(decision.test_id, None);
        assert_eq!(decision.broker, "a");
        assert_eq!(router.get_test(&id).unwrap().status(), TestStatus::Completed);
        assert_eq!(router.active_test_count(), 0);
    }

    #[tokio::test]
    async fn hash_routing_is_stable_per_client_id() {
        let router = router(&[("a", false), ("b", false)]).await;
        let id = router.create_test(split_test(RoutingStrategy::HashBased)).unwrap();
        router.start_test(&id).unwrap();

        for n in 0..20 {
            let order = order().with_client_order_id(format!("client-{n}"));
            let first = router.route_order(&order, Some(&id)).unwrap();
            let second = router.route_order(&order, Some(&id)).unwrap();
            assert_eq!(first.broker, second.broker);
        }
    }

    #[tokio::test]
    async fn empty_registry_has_nothing_to_route() {
        let router = router(&[]).await;
        assert!(matches!(
            router.route_order(&order(), None),
            Err(RouterError::NoBrokersAvailable)
        ));
    }
}
