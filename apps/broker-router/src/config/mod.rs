//! Configuration for the broker router.
//!
//! A config file holds a `default` block plus optional per-environment
//! blocks (`development`, `staging`, `production`, `testing`). The block
//! named by `BROKER_ROUTER_ENV` is deep-merged over `default`: maps merge
//! key by key, scalars and lists replace. A file with no `default` block is
//! read as a single flat configuration.
//!
//! `${VAR}` and `${VAR:-default}` are interpolated before parsing.
//!
//! # Usage
//!
//! ```rust,ignore
//! use broker_router::config::{Environment, load_config};
//!
//! let config = load_config("config.yaml", Environment::from_env()?)?;
//! println!("health checks every {}s", config.registry.health_check_interval_secs);
//! ```

mod brokers;
mod environment;
mod manager;
mod observability;
mod services;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use brokers::{BrokerKind, BrokerSettings, ConnectionSettings, Endpoints, RateLimitSettings};
pub use environment::{ENVIRONMENT_VAR, Environment};
pub use manager::ConfigManager;
pub use observability::{LoggingConfig, ObservabilityConfig};
pub use services::{DiscoverySettings, MetricsSettings, RegistrySettings, RouterSettings};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// The merged document does not match the configuration shape.
    #[error("Invalid config structure: {0}")]
    InvalidStructure(#[from] serde_json::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// `BROKER_ROUTER_ENV` names no known environment.
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Registry and health checks.
    #[serde(default)]
    pub registry: RegistrySettings,
    /// Performance collection.
    #[serde(default)]
    pub metrics: MetricsSettings,
    /// Traffic routing and A/B tests.
    #[serde(default)]
    pub router: RouterSettings,
    /// Capability discovery.
    #[serde(default)]
    pub discovery: DiscoverySettings,
    /// Logging and metrics export.
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Brokers by name.
    #[serde(default)]
    pub brokers: BTreeMap<String, BrokerSettings>,
}

impl AppConfig {
    /// Enabled brokers in name order.
    pub fn enabled_brokers(&self) -> impl Iterator<Item = (&String, &BrokerSettings)> {
        self.brokers.iter().filter(|(_, settings)| settings.enabled)
    }
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file for `environment`.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(
    path: impl AsRef<Path>,
    environment: Environment,
) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    load_config_from_string(&contents, environment)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(
    yaml: &str,
    environment: Environment,
) -> Result<AppConfig, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let document: Value = if interpolated.trim().is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };

    let merged = select_environment(document, environment)?;
    let config: AppConfig = serde_json::from_value(merged)?;
    validate_config(&config)?;
    Ok(config)
}

/// Resolve the effective document: `default` with the environment's block
/// merged over it, or the document itself when it has no `default` block.
fn select_environment(document: Value, environment: Environment) -> Result<Value, ConfigError> {
    let Value::Object(mut root) = document else {
        return Err(ConfigError::ValidationError(
            "config root must be a mapping".to_string(),
        ));
    };

    let Some(mut base) = root.remove("default") else {
        for env in Environment::ALL {
            root.remove(env.as_str());
        }
        return Ok(Value::Object(root));
    };

    if let Some(overlay) = root.remove(environment.as_str()) {
        deep_merge(&mut base, overlay);
    }
    Ok(base)
}

/// Merge `overlay` into `base`. Maps merge recursively; anything else in
/// the overlay replaces the base value.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map(|m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let registry = &config.registry;
    if registry.health_check_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "registry.health_check_interval_secs must be positive".to_string(),
        ));
    }
    if registry.health_check_timeout_secs == 0 || registry.auth_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "registry timeouts must be positive".to_string(),
        ));
    }
    if registry.max_consecutive_failures == 0 {
        return Err(ConfigError::ValidationError(
            "registry.max_consecutive_failures must be at least 1".to_string(),
        ));
    }

    let metrics = &config.metrics;
    if metrics.collection_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "metrics.collection_interval_secs must be positive".to_string(),
        ));
    }
    if metrics.history_capacity == 0 || metrics.rolling_window_secs <= 0 {
        return Err(ConfigError::ValidationError(
            "metrics.history_capacity and metrics.rolling_window_secs must be positive"
                .to_string(),
        ));
    }

    let router = &config.router;
    if router.order_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "router.order_timeout_secs must be positive".to_string(),
        ));
    }
    if router.execution_history_capacity == 0 || router.performance_window == 0 {
        return Err(ConfigError::ValidationError(
            "router.execution_history_capacity and router.performance_window must be positive"
                .to_string(),
        ));
    }

    let discovery = &config.discovery;
    if discovery.cache_ttl_hours <= 0 || discovery.probe_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "discovery.cache_ttl_hours and discovery.probe_timeout_secs must be positive"
                .to_string(),
        ));
    }

    for (name, broker) in &config.brokers {
        if name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "broker names must not be empty".to_string(),
            ));
        }
        if broker.settings.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "brokers.{name}.settings.timeout_secs must be positive"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYERED: &str = r"
default:
  registry:
    health_check_interval_secs: 60
    max_consecutive_failures: 3
  brokers:
    paper_a:
      kind: paper
      instruments: [EUR_USD, GBP_USD]
      settings:
        timeout_secs: 20
    paper_b:
      kind: paper
      enabled: false
production:
  registry:
    health_check_interval_secs: 15
  brokers:
    paper_a:
      instruments: [USD_JPY]
      settings:
        max_retries: 5
";

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = load_config_from_string("", Environment::Development).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.registry.max_consecutive_failures, 3);
        assert_eq!(config.router.order_timeout_secs, 30);
    }

    #[test]
    fn test_default_block_without_overlay() {
        let config = load_config_from_string(LAYERED, Environment::Staging).unwrap();
        assert_eq!(config.registry.health_check_interval_secs, 60);
        assert_eq!(config.brokers["paper_a"].instruments, vec!["EUR_USD", "GBP_USD"]);
    }

    #[test]
    fn test_environment_overlay_deep_merges() {
        let config = load_config_from_string(LAYERED, Environment::Production).unwrap();

        assert_eq!(config.registry.health_check_interval_secs, 15);
        assert_eq!(config.registry.max_consecutive_failures, 3);

        let paper_a = &config.brokers["paper_a"];
        // lists replace
        assert_eq!(paper_a.instruments, vec!["USD_JPY"]);
        // maps merge
        assert_eq!(paper_a.settings.timeout_secs, 20);
        assert_eq!(paper_a.settings.max_retries, 5);
    }

    #[test]
    fn test_enabled_brokers_skips_disabled() {
        let config = load_config_from_string(LAYERED, Environment::Development).unwrap();
        let names: Vec<_> = config.enabled_brokers().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["paper_a"]);
    }

    #[test]
    fn test_flat_document_ignores_environment_blocks() {
        let yaml = r"
router:
  order_timeout_secs: 5
testing:
  router:
    order_timeout_secs: 1
";
        let config = load_config_from_string(yaml, Environment::Testing).unwrap();
        assert_eq!(config.router.order_timeout_secs, 5);
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "mode: ${BROKER_ROUTER_CONFIG_TEST_NONEXISTENT_VAR:-paper}";
        assert_eq!(interpolate_env_vars(input), "mode: paper");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax, not format args
    fn test_env_var_with_default_uses_existing() {
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);

        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "api_key: ${BROKER_ROUTER_CONFIG_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "api_key: ");
    }

    #[test]
    fn test_interpolated_credentials_reach_instance_config() {
        let yaml = r"
brokers:
  paper:
    credentials:
      api_key: ${BROKER_ROUTER_CONFIG_TEST_MISSING_KEY:-demo-key}
";
        let config = load_config_from_string(yaml, Environment::Development).unwrap();
        let instance = config.brokers["paper"].instance_config();
        assert_eq!(instance["credentials"]["api_key"], "demo-key");
    }

    #[test]
    fn test_validation_zero_failure_threshold() {
        let yaml = "registry:\n  max_consecutive_failures: 0\n";
        let result = load_config_from_string(yaml, Environment::Development);

        let Err(ConfigError::ValidationError(msg)) = result else {
            panic!("expected validation error, got {result:?}");
        };
        assert!(msg.contains("max_consecutive_failures"));
    }

    #[test]
    fn test_validation_zero_interval() {
        let yaml = "metrics:\n  collection_interval_secs: 0\n";
        assert!(matches!(
            load_config_from_string(yaml, Environment::Development),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_wrong_shape_is_structure_error() {
        let yaml = "registry:\n  health_check_interval_secs: soon\n";
        assert!(matches!(
            load_config_from_string(yaml, Environment::Development),
            Err(ConfigError::InvalidStructure(_))
        ));
    }

    #[test]
    fn test_non_mapping_root_rejected() {
        assert!(matches!(
            load_config_from_string("- a\n- b\n", Environment::Development),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = load_config("/nonexistent/broker-router.yaml", Environment::Development);
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_deep_merge_replaces_scalars_and_lists() {
        let mut base = serde_json::json!({"a": {"b": 1, "c": [1, 2]}, "d": "x"});
        deep_merge(
            &mut base,
            serde_json::json!({"a": {"c": [3]}, "d": {"nested": true}}),
        );
        assert_eq!(
            base,
            serde_json::json!({"a": {"b": 1, "c": [3]}, "d": {"nested": true}})
        );
    }
}
