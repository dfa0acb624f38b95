//! Performance Metrics Collector
//!
//! Keeps a bounded per-broker sample history. Executions are pushed in by
//! the router; a background loop adds timed health checks, timed price
//! fetches and a rolling order snapshot for every routable broker.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;

use crate::application::ports::BrokerAdapter;
use crate::application::services::registry::BrokerRegistry;
use crate::domain::order_execution::OrderExecution;
use crate::domain::performance::PerformanceSample;
use crate::observability;

/// Collector tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsCollectorConfig {
    /// Interval between collection rounds.
    pub collection_interval: Duration,
    /// Budget for a timed health check.
    pub health_check_timeout: Duration,
    /// Budget for a timed price fetch.
    pub price_timeout: Duration,
    /// Samples kept per broker.
    pub history_capacity: usize,
    /// Window of the rolling order snapshot.
    pub rolling_window: TimeDelta,
    /// Instrument priced each round; defaults to the broker's first
    /// declared instrument.
    pub probe_instrument: Option<String>,
}

impl Default for MetricsCollectorConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(60),
            health_check_timeout: Duration::from_secs(30),
            price_timeout: Duration::from_secs(10),
            history_capacity: 10_000,
            rolling_window: TimeDelta::hours(1),
            probe_instrument: None,
        }
    }
}

/// Collects broker performance samples.
pub struct PerformanceMetricsCollector {
    config: MetricsCollectorConfig,
    registry: Arc<BrokerRegistry>,
    history: RwLock<HashMap<String, VecDeque<PerformanceSample>>>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PerformanceMetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMetricsCollector")
            .field("config", &self.config)
            .field("brokers", &self.history.read().len())
            .finish_non_exhaustive()
    }
}

impl PerformanceMetricsCollector {
    /// Create a collector over the registry's instances.
    #[must_use]
    pub fn new(config: MetricsCollectorConfig, registry: Arc<BrokerRegistry>) -> Self {
        Self {
            config,
            registry,
            history: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Collector tuning.
    #[must_use]
    pub const fn config(&self) -> &MetricsCollectorConfig {
        &self.config
    }

    /// Append an execution sample.
    pub fn record_execution(&self, execution: &OrderExecution) {
        self.record_sample(&execution.broker, PerformanceSample::from_execution(execution));
    }

    /// Append a sample, evicting the oldest past capacity.
    pub fn record_sample(&self, broker: &str, sample: PerformanceSample) {
        self.record_samples(broker, std::iter::once(sample));
    }

    fn record_samples(&self, broker: &str, samples: impl IntoIterator<Item = PerformanceSample>) {
        let capacity = self.config.history_capacity.max(1);
        let mut history = self.history.write();
        let entry = history.entry(broker.to_string()).or_default();
        for sample in samples {
            if entry.len() >= capacity {
                entry.pop_front();
            }
            entry.push_back(sample);
        }
    }

    /// Full history of a broker, oldest first.
    #[must_use]
    pub fn history(&self, broker: &str) -> Vec<PerformanceSample> {
        self.history
            .read()
            .get(broker)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// History samples of a broker inside `[from, to]`.
    #[must_use]
    pub fn history_between(
        &self,
        broker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<PerformanceSample> {
        self.history
            .read()
            .get(broker)
            .map(|h| {
                h.iter()
                    .filter(|s| (from..=to).contains(&s.timestamp()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Last `n` execution samples of a broker, oldest first.
    #[must_use]
    pub fn recent_executions(&self, broker: &str, n: usize) -> Vec<PerformanceSample> {
        let history = self.history.read();
        let Some(samples) = history.get(broker) else {
            return Vec::new();
        };
        let mut recent: Vec<PerformanceSample> = samples
            .iter()
            .rev()
            .filter(|s| matches!(s, PerformanceSample::Execution { .. }))
            .take(n)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    /// Brokers with recorded history, sorted.
    #[must_use]
    pub fn tracked_brokers(&self) -> Vec<String> {
        let mut brokers: Vec<String> = self.history.read().keys().cloned().collect();
        brokers.sort();
        brokers
    }

    /// Returns true if the broker has history or is registered.
    #[must_use]
    pub fn knows(&self, broker: &str) -> bool {
        self.history.read().contains_key(broker) || self.registry.is_registered(broker)
    }

    /// Rolling order statistics over the configured window ending at `now`.
    #[must_use]
    pub fn rolling_snapshot(&self, broker: &str, now: DateTime<Utc>) -> PerformanceSample {
        let window_start = now - self.config.rolling_window;
        let (mut orders, mut successes) = (0usize, 0usize);
        if let Some(samples) = self.history.read().get(broker) {
            for sample in samples {
                if let PerformanceSample::Execution {
                    timestamp, success, ..
                } = sample
                    && *timestamp >= window_start
                    && *timestamp <= now
                {
                    orders += 1;
                    successes += usize::from(*success);
                }
            }
        }

        let (success_rate, error_rate) = if orders == 0 {
            (1.0, 0.0)
        } else {
            let rate = successes as f64 / orders as f64;
            (rate, 1.0 - rate)
        };
        let minutes = (self.config.rolling_window.num_seconds() as f64 / 60.0).max(1.0);
        PerformanceSample::Rolling {
            timestamp: now,
            orders,
            success_rate,
            error_rate,
            throughput_per_minute: orders as f64 / minutes,
        }
    }

    /// Sample every routable broker once. Returns the number sampled.
    pub async fn collect_once(&self) -> usize {
        let targets = self.registry.routable_adapters();
        let count = targets.len();
        let batches = join_all(
            targets
                .into_iter()
                .map(|(broker, adapter)| async move {
                    let samples = self.probe(&broker, adapter.as_ref()).await;
                    (broker, samples)
                }),
        )
        .await;

        let now = Utc::now();
        for (broker, mut samples) in batches {
            samples.push(self.rolling_snapshot(&broker, now));
            self.record_samples(&broker, samples);
        }
        count
    }

    async fn probe(&self, broker: &str, adapter: &dyn BrokerAdapter) -> Vec<PerformanceSample> {
        let mut samples = Vec::with_capacity(3);

        let started = Instant::now();
        let health = timeout(self.config.health_check_timeout, adapter.health_check()).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let available = match health {
            Ok(Ok(report)) => report.is_healthy(),
            Ok(Err(e)) => {
                tracing::debug!(broker, error = %e, "Collector health probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(broker, "Collector health probe timed out");
                false
            }
        };
        samples.push(PerformanceSample::HealthCheck {
            timestamp: Utc::now(),
            latency_ms,
            available,
        });

        let instrument = self
            .config
            .probe_instrument
            .clone()
            .or_else(|| adapter.descriptor().supported_instruments.first().cloned());
        if let Some(instrument) = instrument {
            let started = Instant::now();
            let price = timeout(self.config.price_timeout, adapter.get_current_price(&instrument)).await;
            let elapsed = started.elapsed().as_secs_f64();
            let (success, spread_bps) = match price {
                Ok(Ok(tick)) => (true, tick.spread_bps()),
                Ok(Err(e)) => {
                    tracing::debug!(broker, instrument = %instrument, error = %e, "Collector price probe failed");
                    (false, None)
                }
                Err(_) => (false, None),
            };
            observability::record_price_feed_latency(broker, success, elapsed);
            samples.push(PerformanceSample::PriceFeed {
                timestamp: Utc::now(),
                latency_ms: elapsed * 1_000.0,
                success,
                spread_bps,
            });
        }

        samples
    }

    /// Start the background collection loop. Has no effect while running.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let collector = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let period = self.config.collection_interval;

        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(collector) = collector.upgrade() else {
                            break;
                        };
                        let sampled = collector.collect_once().await;
                        tracing::debug!(brokers = sampled, "Metrics collection round complete");
                    }
                    () = shutdown.cancelled() => {
                        tracing::info!("Metrics collector shutting down");
                        break;
                    }
                }
            }
        }));

        tracing::info!(interval_secs = period.as_secs(), "Metrics collector started");
    }

    /// Stop the collection loop.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Metrics collector task ended abnormally");
        }
    }
}
