//! Process configuration.
//!
//! All options come from environment variables with sensible defaults; the
//! backoff function is not part of this struct because it is injected into
//! the worker directly (see `worker::with_backoff`).

use std::time::Duration;

use crate::error::{Error, Result};

/// Recognised configuration options.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for a worker process; becomes the worker row's
    /// hostname and the `worker_id` metric label.
    pub worker_id: String,
    /// Interval between heartbeat writes.
    pub heartbeat_interval: Duration,
    /// Window after which a silent worker is considered dead. Defaults to
    /// three heartbeat intervals.
    pub liveness_timeout: Duration,
    /// Port for the metrics/health endpoint.
    pub metrics_port: u16,
    /// Port for the REST + WebSocket API server.
    pub http_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_id: "worker-1".to_string(),
            heartbeat_interval: Duration::from_secs(15),
            liveness_timeout: Duration::from_secs(45),
            metrics_port: 9090,
            http_port: 8080,
        }
    }
}

impl Config {
    /// Load configuration from the environment. `default_metrics_port`
    /// differs per binary (scheduler 9090, worker 9091, API 8080).
    pub fn from_env(default_metrics_port: u16) -> Result<Self> {
        let mut config = Self {
            metrics_port: default_metrics_port,
            ..Self::default()
        };

        if let Ok(id) = std::env::var("WORKER_ID") {
            if !id.is_empty() {
                config.worker_id = id;
            }
        }

        if let Ok(secs) = std::env::var("HEARTBEAT_INTERVAL_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::invalid(format!("invalid HEARTBEAT_INTERVAL_SECS: {e}")))?;
            config.heartbeat_interval = Duration::from_secs(secs);
            config.liveness_timeout = config.heartbeat_interval * 3;
        }

        if let Ok(secs) = std::env::var("LIVENESS_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::invalid(format!("invalid LIVENESS_TIMEOUT_SECS: {e}")))?;
            config.liveness_timeout = Duration::from_secs(secs);
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            config.metrics_port = port
                .parse()
                .map_err(|e| Error::invalid(format!("invalid METRICS_PORT: {e}")))?;
        }

        if let Ok(port) = std::env::var("PORT") {
            config.http_port = port
                .parse()
                .map_err(|e| Error::invalid(format!("invalid PORT: {e}")))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_heartbeat_interval() {
        let config = Config::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.liveness_timeout, config.heartbeat_interval * 3);
    }
}
