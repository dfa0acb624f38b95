//! Broker Router Binary
//!
//! Loads the broker configuration, creates an instance per configured
//! broker, runs the health-check, metrics and config-reload loops, and
//! shuts down cleanly on Ctrl+C or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin broker-router
//! ```
//!
//! # Environment Variables
//!
//! - `BROKER_ROUTER_CONFIG`: Config file path (default: `config.yaml`)
//! - `BROKER_ROUTER_ENV`: development | staging | production | testing
//!   (default: development)
//! - `BROKER_ROUTER_REPORT_DIR`: Directory for the shutdown comparison and
//!   error reports
//! - `RUST_LOG`: Log filter (default: the configured logging level)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use broker_router::application::ports::TransactionRecorders;
use broker_router::application::services::{
    BrokerRegistry, CapabilityDiscoveryService, ComparisonEngine, ErrorAggregator, ErrorMapper,
    PerformanceMetricsCollector, TrafficRouter,
};
use broker_router::config::{AppConfig, BrokerKind, BrokerSettings, ConfigManager, Environment};
use broker_router::infrastructure::broker::paper;
use broker_router::infrastructure::export;
use broker_router::observability::{self, MetricsConfig};
use broker_router::telemetry;
use chrono::TimeDelta;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default config file.
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// How often the config file's mtime is checked.
const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Long-lived services wired together.
#[derive(Clone)]
struct Services {
    mapper: Arc<ErrorMapper>,
    errors: Arc<ErrorAggregator>,
    recorders: TransactionRecorders,
    registry: Arc<BrokerRegistry>,
    collector: Arc<PerformanceMetricsCollector>,
    router: Arc<TrafficRouter>,
    discovery: Arc<CapabilityDiscoveryService>,
    comparison: ComparisonEngine,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let environment = Environment::from_env()?;
    let config_path = std::env::var("BROKER_ROUTER_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let manager = Arc::new(
        ConfigManager::load(&config_path, environment)
            .with_context(|| format!("loading {}", config_path.display()))?,
    );
    let config = manager.current();

    let _telemetry = telemetry::init_telemetry(&config.observability.logging.level, environment);
    tracing::info!(
        environment = %environment,
        config = %config_path.display(),
        brokers = config.brokers.len(),
        "Starting broker router"
    );

    if config.observability.metrics_enabled {
        observability::init_metrics(&MetricsConfig::with_addr(config.observability.metrics_addr))
            .context("starting metrics exporter")?;
    }

    let services = create_services(&config);
    register_brokers(&services, &config).await;

    services.registry.start_health_checks();
    services.collector.start();
    log_capabilities(&services, &config).await;

    let shutdown_token = CancellationToken::new();
    let watch_handle = start_config_watch(Arc::clone(&manager), shutdown_token.clone());
    let reload_handle = start_reload_listener(&services, manager.subscribe(), shutdown_token.clone());

    tracing::info!(
        instances = services.registry.list_instances().len(),
        active_tests = services.router.active_test_count(),
        "Broker router ready"
    );

    shutdown_signal().await;
    shutdown_token.cancel();

    let shutdown = async {
        for handle in [watch_handle, reload_handle] {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        let config = manager.current();
        export_final_comparison(&services, &config);
        export_error_summary(&services, &config);
        services.collector.shutdown().await;
        services.registry.shutdown().await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Graceful shutdown timed out"
        );
    }

    tracing::info!("Broker router stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Build the registry and the services over it.
fn create_services(config: &AppConfig) -> Services {
    let errors = Arc::new(ErrorAggregator::default());
    let mapper = Arc::new(ErrorMapper::with_default_mappings().with_aggregator(Arc::clone(&errors)));
    let registry = Arc::new(BrokerRegistry::new(config.registry.to_registry_config()));
    let collector = Arc::new(PerformanceMetricsCollector::new(
        config.metrics.to_collector_config(),
        Arc::clone(&registry),
    ));
    let router_config = config.router.to_router_config();
    let comparison = ComparisonEngine::new(Arc::clone(&collector), router_config.thresholds);
    let router = Arc::new(
        TrafficRouter::new(router_config, Arc::clone(&registry), Arc::clone(&collector))
            .with_error_aggregator(Arc::clone(&errors)),
    );
    let discovery = Arc::new(CapabilityDiscoveryService::new(
        config.discovery.to_discovery_config(),
        Arc::clone(&registry),
    ));

    Services {
        mapper,
        errors,
        recorders: TransactionRecorders::new(),
        registry,
        collector,
        router,
        discovery,
        comparison,
    }
}

/// Register and instantiate every enabled broker the registry can build.
async fn register_brokers(services: &Services, config: &AppConfig) {
    for (name, settings) in config.enabled_brokers() {
        register_broker(services, name, settings).await;
    }
}

async fn register_broker(
    services: &Services,
    name: &str,
    settings: &BrokerSettings,
) {
    if settings.kind != BrokerKind::Paper {
        tracing::warn!(
            broker = name,
            kind = ?settings.kind,
            "No client available for broker kind, skipping"
        );
        return;
    }

    if !services.registry.is_registered(name) {
        services.registry.register_adapter(paper::registration(
            name,
            Arc::clone(&services.mapper),
            services.recorders.clone(),
        ));
    }

    match services
        .registry
        .create_adapter(name, settings.instance_config())
        .await
    {
        Ok(info) => tracing::info!(
            broker = name,
            instance_id = %info.id,
            status = ?info.status,
            "Broker instance ready"
        ),
        Err(e) => tracing::error!(broker = name, error = %e, "Failed to create broker instance"),
    }
}

/// Discover and log each registered broker's capabilities.
async fn log_capabilities(services: &Services, config: &AppConfig) {
    for broker in services.registry.registered_brokers() {
        match services
            .discovery
            .discover(&broker, config.discovery.strategy, false)
            .await
        {
            Ok(profile) => tracing::info!(
                broker = %broker,
                capabilities = profile.capabilities.len(),
                instruments = profile.instruments.len(),
                "Capabilities discovered"
            ),
            Err(e) => tracing::warn!(broker = %broker, error = %e, "Capability discovery failed"),
        }
    }
}

/// Poll the config file until cancelled.
fn start_config_watch(manager: Arc<ConfigManager>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move { manager.watch(CONFIG_POLL_INTERVAL, shutdown).await })
}

/// Apply broker changes from reloaded configurations.
///
/// New enabled paper brokers are instantiated; removed or disabled brokers
/// stop receiving new instances. Service tuning takes effect on restart.
fn start_reload_listener(
    services: &Services,
    mut updates: watch::Receiver<Arc<AppConfig>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let services = services.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let config = Arc::clone(&*updates.borrow_and_update());
                    apply_broker_changes(&services, &config).await;
                }
                () = shutdown.cancelled() => break,
            }
        }
    })
}

async fn apply_broker_changes(services: &Services, config: &AppConfig) {
    for broker in services.registry.registered_brokers() {
        let enabled = config.brokers.get(&broker).is_some_and(|s| s.enabled);
        if !enabled && services.registry.set_enabled(&broker, false).is_ok() {
            tracing::info!(broker = %broker, "Broker disabled by config reload");
        }
    }

    for (name, settings) in config.enabled_brokers() {
        if services.registry.is_registered(name) {
            if services.registry.set_enabled(name, true).is_ok()
                && services.registry.adapter_for(name).is_none()
            {
                register_broker(services, name, settings).await;
            }
            continue;
        }
        register_broker(services, name, settings).await;
    }
}

/// Log a comparison of every tracked broker and export it when
/// `BROKER_ROUTER_REPORT_DIR` is set.
fn export_final_comparison(services: &Services, config: &AppConfig) {
    let brokers = services.collector.tracked_brokers();
    if brokers.is_empty() {
        return;
    }

    let period = TimeDelta::seconds(config.metrics.rolling_window_secs);
    let comparison = match services.comparison.compare_brokers(&brokers, period) {
        Ok(comparison) => comparison,
        Err(e) => {
            tracing::warn!(error = %e, "Final broker comparison failed");
            return;
        }
    };

    let Ok(dir) = std::env::var("BROKER_ROUTER_REPORT_DIR") else {
        return;
    };
    match export::export_to_dir(&dir, &comparison) {
        Ok(path) => tracing::info!(path = %path.display(), "Broker comparison exported"),
        Err(e) => tracing::warn!(error = %e, "Broker comparison export failed"),
    }
}

/// Log the error summary for the rolling window and export it when
/// `BROKER_ROUTER_REPORT_DIR` is set.
fn export_error_summary(services: &Services, config: &AppConfig) {
    let summary = services
        .errors
        .error_summary(TimeDelta::seconds(config.metrics.rolling_window_secs));
    tracing::info!(
        total_errors = summary.total_errors,
        retryable = summary.retryable_count,
        most_common = ?summary.most_common_code,
        "Broker error summary"
    );
    if summary.total_errors == 0 {
        return;
    }

    let Ok(dir) = std::env::var("BROKER_ROUTER_REPORT_DIR") else {
        return;
    };
    match export::export_to_dir(&dir, &summary) {
        Ok(path) => tracing::info!(path = %path.display(), "Error summary exported"),
        Err(e) => tracing::warn!(error = %e, "Error summary export failed"),
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
