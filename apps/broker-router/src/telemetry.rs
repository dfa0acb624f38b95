//! Tracing Setup
//!
//! Console logging for every environment, plus OTLP span export unless
//! `OTEL_ENABLED=false`.
//!
//! - `RUST_LOG`: log filter; falls back to the configured level
//! - `OTEL_ENABLED`: `false` keeps logging console-only
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP gRPC endpoint (default `http://localhost:4317`)
//! - `OTEL_SERVICE_NAME`: reported service name (default `broker-router`)

use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Environment;

const DEFAULT_ENDPOINT: &str = "http://localhost:4317";
const DEFAULT_SERVICE_NAME: &str = "broker-router";

/// Shuts the tracer provider down, flushing spans, when dropped.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Error shutting down tracer provider: {e:?}");
        }
    }
}

/// OTLP export settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OtlpSettings {
    enabled: bool,
    endpoint: String,
    service_name: String,
}

impl OtlpSettings {
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            enabled: lookup("OTEL_ENABLED").is_none_or(|v| v != "false"),
            endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            service_name: lookup("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
        }
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Development logs are colored and omit targets.
fn console_layer<S>(environment: Environment) -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let development = environment == Environment::Development;
    tracing_subscriber::fmt::layer()
        .with_target(!development)
        .with_ansi(development)
}

fn init_console(default_level: &str, environment: Environment) -> TelemetryGuard {
    Registry::default()
        .with(env_filter(default_level))
        .with(console_layer(environment))
        .init();
    TelemetryGuard { provider: None }
}

/// Install the global subscriber.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
#[must_use]
pub fn init_telemetry(default_level: &str, environment: Environment) -> TelemetryGuard {
    let otlp = OtlpSettings::from_env();
    if !otlp.enabled {
        let guard = init_console(default_level, environment);
        tracing::info!("OTLP export disabled, logging to console only");
        return guard;
    }

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otlp.endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            let guard = init_console(default_level, environment);
            tracing::warn!(error = ?e, endpoint = %otlp.endpoint, "OTLP exporter unavailable, logging to console only");
            return guard;
        }
    };

    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter)
        .build();
    let otel_layer = tracing_opentelemetry::layer().with_tracer(provider.tracer(otlp.service_name.clone()));

    Registry::default()
        .with(env_filter(default_level))
        .with(console_layer(environment))
        .with(otel_layer)
        .init();

    tracing::info!(
        service_name = %otlp.service_name,
        endpoint = %otlp.endpoint,
        environment = %environment,
        "OTLP span export enabled"
    );

    TelemetryGuard {
        provider: Some(provider),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> OtlpSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        OtlpSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_export_to_local_collector() {
        let otlp = settings(&[]);
        assert!(otlp.enabled);
        assert_eq!(otlp.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(otlp.service_name, "broker-router");
    }

    #[test]
    fn only_false_disables_export() {
        assert!(!settings(&[("OTEL_ENABLED", "false")]).enabled);
        assert!(settings(&[("OTEL_ENABLED", "0")]).enabled);
    }

    #[test]
    fn overrides_are_honoured() {
        let otlp = settings(&[
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://otel:4317"),
            ("OTEL_SERVICE_NAME", "router-canary"),
        ]);
        assert_eq!(otlp.endpoint, "http://otel:4317");
        assert_eq!(otlp.service_name, "router-canary");
    }
}
