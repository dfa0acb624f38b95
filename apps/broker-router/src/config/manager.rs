//! Config file ownership with change detection.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{AppConfig, ConfigError, Environment, load_config};

/// Owns the loaded configuration and reloads it when the file changes.
///
/// A reload that fails to read, parse, or validate leaves the current
/// configuration in place.
#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    environment: Environment,
    current: RwLock<Arc<AppConfig>>,
    modified: RwLock<Option<SystemTime>>,
    tx: watch::Sender<Arc<AppConfig>>,
}

impl ConfigManager {
    /// Load `path` for `environment`.
    ///
    /// # Errors
    ///
    /// Returns the load error when the initial configuration is invalid.
    pub fn load(path: impl Into<PathBuf>, environment: Environment) -> Result<Self, ConfigError> {
        let path = path.into();
        let modified = modified_at(&path);
        let config = Arc::new(load_config(&path, environment)?);
        let (tx, _) = watch::channel(Arc::clone(&config));

        Ok(Self {
            path,
            environment,
            current: RwLock::new(config),
            modified: RwLock::new(modified),
            tx,
        })
    }

    /// File being watched.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Active environment.
    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    /// Current configuration.
    #[must_use]
    pub fn current(&self) -> Arc<AppConfig> {
        Arc::clone(&self.current.read())
    }

    /// Receiver that observes every successful reload.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppConfig>> {
        self.tx.subscribe()
    }

    /// Reload when the file's modification time moved.
    ///
    /// Returns `Ok(true)` when a new configuration was applied.
    ///
    /// # Errors
    ///
    /// Returns the load error; the previous configuration stays current and
    /// the same modification time is not retried.
    pub fn reload_if_changed(&self) -> Result<bool, ConfigError> {
        let modified = modified_at(&self.path);
        if modified == *self.modified.read() {
            return Ok(false);
        }
        *self.modified.write() = modified;

        let config = Arc::new(load_config(&self.path, self.environment)?);
        *self.current.write() = Arc::clone(&config);
        self.tx.send_replace(config);

        tracing::info!(path = %self.path.display(), "Configuration reloaded");
        Ok(true)
    }

    /// Poll the file every `interval` until cancelled.
    pub async fn watch(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Config watcher stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reload_if_changed() {
                        tracing::warn!(
                            path = %self.path.display(),
                            error = %e,
                            "Config reload failed, keeping previous configuration"
                        );
                    }
                }
            }
        }
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use filetime::FileTime;
    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(file: &mut NamedTempFile, yaml: &str, mtime_secs: i64) {
        let handle = file.as_file_mut();
        handle.set_len(0).unwrap();
        std::io::Seek::rewind(handle).unwrap();
        handle.write_all(yaml.as_bytes()).unwrap();
        handle.sync_all().unwrap();
        filetime::set_file_mtime(file.path(), FileTime::from_unix_time(mtime_secs, 0)).unwrap();
    }

    #[test]
    fn unchanged_file_is_not_reloaded() {
        let mut file = NamedTempFile::new().unwrap();
        write_config(&mut file, "router:\n  order_timeout_secs: 5\n", 1_000);

        let manager = ConfigManager::load(file.path(), Environment::Development).unwrap();
        assert_eq!(manager.current().router.order_timeout_secs, 5);
        assert!(!manager.reload_if_changed().unwrap());
    }

    #[test]
    fn changed_file_is_reloaded_and_published() {
        let mut file = NamedTempFile::new().unwrap();
        write_config(&mut file, "router:\n  order_timeout_secs: 5\n", 1_000);

        let manager = ConfigManager::load(file.path(), Environment::Development).unwrap();
        let mut rx = manager.subscribe();

        write_config(&mut file, "router:\n  order_timeout_secs: 9\n", 2_000);
        assert!(manager.reload_if_changed().unwrap());

        assert_eq!(manager.current().router.order_timeout_secs, 9);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().router.order_timeout_secs, 9);
    }

    #[test]
    fn invalid_reload_keeps_previous_config() {
        let mut file = NamedTempFile::new().unwrap();
        write_config(&mut file, "router:\n  order_timeout_secs: 5\n", 1_000);

        let manager = ConfigManager::load(file.path(), Environment::Development).unwrap();

        write_config(&mut file, "router:\n  order_timeout_secs: 0\n", 2_000);
        assert!(matches!(
            manager.reload_if_changed(),
            Err(ConfigError::ValidationError(_))
        ));
        assert_eq!(manager.current().router.order_timeout_secs, 5);

        // Same mtime is not retried.
        assert!(!manager.reload_if_changed().unwrap());
    }

    #[test]
    fn environment_overlay_applies_on_reload() {
        let mut file = NamedTempFile::new().unwrap();
        write_config(&mut file, "default:\n  router:\n    order_timeout_secs: 5\n", 1_000);

        let manager = ConfigManager::load(file.path(), Environment::Testing).unwrap();
        write_config(
            &mut file,
            "default:\n  router:\n    order_timeout_secs: 5\ntesting:\n  router:\n    order_timeout_secs: 2\n",
            2_000,
        );
        manager.reload_if_changed().unwrap();
        assert_eq!(manager.current().router.order_timeout_secs, 2);
        assert_eq!(manager.environment(), Environment::Testing);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_stops_on_cancel() {
        let mut file = NamedTempFile::new().unwrap();
        write_config(&mut file, "{}\n", 1_000);

        let manager = Arc::new(ConfigManager::load(file.path(), Environment::Development).unwrap());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let manager = Arc::clone(&manager);
            let cancel = cancel.clone();
            async move { manager.watch(Duration::from_secs(1), cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
