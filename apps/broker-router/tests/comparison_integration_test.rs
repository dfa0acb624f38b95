//! Comparison Integration Tests
//!
//! Performance comparison, capability discovery, error mapping, order
//! validation and report export over paper brokers.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use broker_router::application::ports::{
    OrderValidationError, TransactionRecorders, validate_order_against,
};
use broker_router::application::services::registry::RegistryConfig;
use broker_router::application::services::{
    BrokerRegistry, CapabilityDiscoveryService, ComparisonEngine, DiscoveryConfig, ErrorMapper,
    MetricsCollectorConfig, PerformanceMetricsCollector, RouterConfig, TrafficRouter,
};
use broker_router::domain::ab_testing::{ABTestConfig, ABTestResults, RoutingStrategy, TrafficSplit};
use broker_router::domain::capability::{BrokerCapability, BrokerCapabilityProfile, TestingStrategy};
use broker_router::domain::errors::{ErrorCategory, StandardErrorCode};
use broker_router::domain::order_execution::{BrokerOrder, OrderSide, OrderType};
use broker_router::domain::performance::{BrokerComparison, HealthThresholds, RankingDimension};
use broker_router::infrastructure::broker::PaperControls;
use broker_router::infrastructure::broker::paper;
use broker_router::infrastructure::export;
use chrono::TimeDelta;
use rust_decimal_macros::dec;
use serde_json::json;
use tempfile::TempDir;

struct Harness {
    registry: Arc<BrokerRegistry>,
    collector: Arc<PerformanceMetricsCollector>,
    router: TrafficRouter,
    controls: Vec<Arc<PaperControls>>,
}

async fn harness() -> Harness {
    let registry = Arc::new(BrokerRegistry::new(RegistryConfig::default()));
    let mapper = Arc::new(ErrorMapper::with_default_mappings());
    let mut controls = Vec::new();
    for name in ["fast", "slow"] {
        let control = Arc::new(PaperControls::default());
        registry.register_adapter(paper::registration_with_controls(
            name,
            Arc::clone(&mapper),
            TransactionRecorders::new(),
            Arc::clone(&control),
        ));
        registry.create_adapter(name, json!({})).await.unwrap();
        controls.push(control);
    }
    let collector = Arc::new(PerformanceMetricsCollector::new(
        MetricsCollectorConfig::default(),
        Arc::clone(&registry),
    ));
    let router = TrafficRouter::new(
        RouterConfig::default(),
        Arc::clone(&registry),
        Arc::clone(&collector),
    );
    Harness {
        registry,
        collector,
        router,
        controls,
    }
}

/// Run a round-robin test where "fast" answers in ~20ms and "slow" in ~600ms.
async fn run_latency_test(h: &Harness) -> ABTestResults {
    let config = ABTestConfig::new(
        "fast vs slow",
        vec![TrafficSplit::new("fast", 50.0), TrafficSplit::new("slow", 50.0)],
        RoutingStrategy::RoundRobin,
    )
    .unwrap()
    .with_minimum_sample_size(5);
    let id = h.router.create_test(config).unwrap();
    h.router.start_test(&id).unwrap();

    for i in 0..20_u64 {
        h.controls[0].set_latency(Duration::from_millis(20 + i % 3));
        h.controls[1].set_latency(Duration::from_millis(600 + i % 5));
        let order = BrokerOrder::market("EUR_USD", OrderSide::Buy, dec!(100))
            .with_client_order_id(format!("cmp-{i}"));
        h.router.execute_order_with_test(order, Some(&id)).await.unwrap();
    }
    h.router.analyze_test_results(&id).unwrap()
}

#[tokio::test(start_paused = true)]
async fn lower_latency_ranks_first() {
    let h = harness().await;
    run_latency_test(&h).await;

    let engine = ComparisonEngine::new(Arc::clone(&h.collector), HealthThresholds::default());
    let comparison = engine
        .compare_brokers(&["slow".to_string(), "fast".to_string()], TimeDelta::hours(1))
        .unwrap();

    assert_eq!(comparison.brokers, vec!["slow", "fast"]);
    assert_eq!(comparison.rankings[&RankingDimension::Latency][0], "fast");
    assert_eq!(comparison.rankings[&RankingDimension::Overall][0], "fast");
    assert_eq!(comparison.winner.as_deref(), Some("fast"));
    assert!(
        comparison.benchmarks["fast"].overall_score > comparison.benchmarks["slow"].overall_score
    );
}

#[tokio::test]
async fn unknown_broker_cannot_be_benchmarked() {
    let h = harness().await;
    let engine = ComparisonEngine::new(Arc::clone(&h.collector), HealthThresholds::default());

    assert!(engine.compare_brokers(&[], TimeDelta::hours(1)).is_err());
    assert!(
        engine
            .generate_broker_benchmark("ghost", TimeDelta::hours(1))
            .is_err()
    );
    // Registered but never sampled still benchmarks, with neutral scores.
    let benchmark = engine
        .generate_broker_benchmark("fast", TimeDelta::hours(1))
        .unwrap();
    assert_eq!(benchmark.broker, "fast");
}

#[tokio::test(start_paused = true)]
async fn reports_round_trip_through_export() {
    let h = harness().await;
    let results = run_latency_test(&h).await;
    let engine = ComparisonEngine::new(Arc::clone(&h.collector), HealthThresholds::default());
    let comparison = engine
        .compare_brokers(&["fast".to_string(), "slow".to_string()], TimeDelta::hours(1))
        .unwrap();

    let dir = TempDir::new().unwrap();
    let results_path = export::export_to_dir(dir.path(), &results).unwrap();
    let comparison_path = export::export_to_dir(dir.path(), &comparison).unwrap();

    let restored: ABTestResults = export::read_report(&results_path).unwrap();
    assert_eq!(restored.test_id, results.test_id);
    assert_eq!(restored.winner, results.winner);
    for (broker, metrics) in &results.metrics {
        let other = &restored.metrics[broker];
        assert_eq!(other.sample_size, metrics.sample_size);
        assert!((other.mean_latency_ms - metrics.mean_latency_ms).abs() < 1e-9);
        assert!((other.composite_score - metrics.composite_score).abs() < 1e-9);
    }

    let restored: BrokerComparison = export::read_report(&comparison_path).unwrap();
    assert_eq!(restored.comparison_id, comparison.comparison_id);
    assert_eq!(restored.winner, comparison.winner);
    assert_eq!(restored.rankings, comparison.rankings);
    for (broker, benchmark) in &comparison.benchmarks {
        let other = &restored.benchmarks[broker];
        assert!((other.overall_score - benchmark.overall_score).abs() < 1e-9);
        assert!((other.speed_score - benchmark.speed_score).abs() < 1e-9);
    }
}

#[tokio::test]
async fn discovery_profiles_paper_brokers() {
    let h = harness().await;
    let discovery = CapabilityDiscoveryService::new(DiscoveryConfig::default(), Arc::clone(&h.registry));

    let profile = discovery
        .discover("fast", TestingStrategy::Static, false)
        .await
        .unwrap();
    assert_eq!(profile.broker, "fast");
    assert!(profile.supports(BrokerCapability::MarketOrders));
    assert!(!profile.supports(BrokerCapability::GuaranteedStops));

    let cached = discovery.cached_profile("fast").unwrap();
    assert_eq!(cached.discovered_at, profile.discovered_at);

    let dir = TempDir::new().unwrap();
    let path = export::export_to_dir(dir.path(), &profile).unwrap();
    let restored: BrokerCapabilityProfile = export::read_report(&path).unwrap();
    assert_eq!(restored.capabilities, profile.capabilities);
}

#[test]
fn oanda_insufficient_margin_is_not_retryable() {
    let mapper = ErrorMapper::with_default_mappings();
    let error = mapper.map_error("oanda", "INSUFFICIENT_MARGIN", "Not enough margin", None);

    assert_eq!(error.error_code(), StandardErrorCode::InsufficientMargin);
    assert_eq!(error.category(), ErrorCategory::BusinessLogic);
    assert!(!error.is_retryable());
    assert_eq!(error.message(), "Not enough margin");
}

#[tokio::test]
async fn validate_order_against_paper_descriptor() {
    let h = harness().await;
    let adapter = h.registry.adapter_for("fast").unwrap();
    let descriptor = adapter.descriptor();

    let mut limit = BrokerOrder::limit("EUR_USD", OrderSide::Buy, dec!(10), dec!(1.1));
    limit.price = None;
    let errors = validate_order_against(descriptor, &limit);
    assert!(errors.contains(&OrderValidationError::MissingPrice(OrderType::Limit)));
    assert!(errors.iter().any(|e| e.to_string().contains("Price is required")));

    let market = BrokerOrder::market("EUR_USD", OrderSide::Sell, dec!(10));
    assert!(validate_order_against(descriptor, &market).is_empty());
}
