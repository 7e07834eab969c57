//! Pipeline configuration.

use std::time::Duration;

/// Reconciler and dispatcher configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Run the reconciler loop in this process
    pub reconciler_enabled: bool,
    /// Poll interval between reconciliation cycles
    pub reconciler_interval: Duration,
    /// Watcher tasks reconciled concurrently
    pub reconciler_concurrency: usize,
    /// Watcher tasks pulled per cycle
    pub reconciler_batch_size: usize,
    /// Lifetime of a fan-in watcher before it is abandoned
    pub watcher_ttl: Duration,
    /// Grace period for an in-flight cycle on shutdown
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reconciler_enabled: true,
            reconciler_interval: Duration::from_secs(10),
            reconciler_concurrency: 5,
            reconciler_batch_size: 100,
            watcher_ttl: Duration::from_secs(3600), // 1 hour
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            reconciler_enabled: std::env::var("RECONCILER_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            reconciler_interval: Duration::from_secs(
                std::env::var("RECONCILER_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(10),
            ),
            reconciler_concurrency: std::env::var("RECONCILER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(5),
            reconciler_batch_size: std::env::var("RECONCILER_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(100),
            watcher_ttl: Duration::from_secs(
                std::env::var("WATCHER_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("RECONCILER_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Watcher lifetime as a chrono duration.
    pub fn watcher_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.watcher_ttl).unwrap_or_else(|_| chrono::Duration::hours(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 6] = [
        "RECONCILER_ENABLED",
        "RECONCILER_INTERVAL_SECS",
        "RECONCILER_CONCURRENCY",
        "RECONCILER_BATCH_SIZE",
        "WATCHER_TTL_SECS",
        "RECONCILER_SHUTDOWN_TIMEOUT_SECS",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = PipelineConfig::from_env();
        assert!(config.reconciler_enabled);
        assert_eq!(config.reconciler_interval, Duration::from_secs(10));
        assert_eq!(config.reconciler_concurrency, 5);
        assert_eq!(config.reconciler_batch_size, 100);
        assert_eq!(config.watcher_ttl(), chrono::Duration::hours(1));
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        std::env::set_var("RECONCILER_ENABLED", "false");
        std::env::set_var("RECONCILER_CONCURRENCY", "8");
        std::env::set_var("RECONCILER_INTERVAL_SECS", "0");
        std::env::set_var("WATCHER_TTL_SECS", "120");
        let config = PipelineConfig::from_env();
        assert!(!config.reconciler_enabled);
        assert_eq!(config.reconciler_concurrency, 8);
        assert_eq!(config.reconciler_interval, Duration::from_secs(10));
        assert_eq!(config.watcher_ttl, Duration::from_secs(120));
        clear();
    }
}
