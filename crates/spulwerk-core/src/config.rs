// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable knobs for the queue and delivery pipeline.
///
/// Round-trips through serde so deployments can override any subset of the
/// defaults from a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolConfig {
    /// Maximum number of tasks held in the in-memory queue.
    pub queue_capacity: usize,
    /// How long `submit` waits for queue space before rejecting.
    pub admission_timeout_secs: u64,
    /// Dispatch loop polling period.
    pub poll_interval_ms: u64,
    /// Number of concurrent delivery workers.
    pub worker_count: usize,
    /// Backlog between the dispatch loop and the workers.
    pub worker_backlog: usize,
    /// Failed attempts allowed before a task becomes terminally Failed.
    pub max_retry: u32,
    /// Base for the exponential retry backoff.
    pub backoff_base_ms: u64,
    /// Upper bound on a single backoff delay.
    pub backoff_max_ms: u64,
    /// Random jitter added to each backoff delay.
    pub backoff_jitter_ms: u64,
    /// Pending records older than this are not retried after a restart.
    pub task_expiry_hours: i64,
    /// Archived records older than this are deleted by the sweep.
    pub retention_days: i64,
    /// How often the retention sweep runs.
    pub sweep_interval_hours: u64,
    /// Per-sink budget for a single status notification.
    pub notify_timeout_ms: u64,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            admission_timeout_secs: 3,
            poll_interval_ms: 1000,
            worker_count: 4,
            worker_backlog: 50,
            max_retry: 3,
            backoff_base_ms: 1000,
            backoff_max_ms: 120_000,
            backoff_jitter_ms: 1000,
            task_expiry_hours: 24,
            retention_days: 7,
            sweep_interval_hours: 24,
            notify_timeout_ms: 2000,
        }
    }
}

impl SpoolConfig {
    pub fn admission_timeout(&self) -> Duration {
        Duration::from_secs(self.admission_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn backoff_jitter(&self) -> Duration {
        Duration::from_millis(self.backoff_jitter_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_hours * 3600)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    pub fn task_expiry(&self) -> chrono::Duration {
        chrono::Duration::hours(self.task_expiry_hours)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_values() {
        let config = SpoolConfig::default();
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.admission_timeout(), Duration::from_secs(3));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.max_retry, 3);
        assert_eq!(config.task_expiry(), chrono::Duration::hours(24));
        assert_eq!(config.retention(), chrono::Duration::days(7));
    }

    #[test]
    fn partial_config_file_fills_in_defaults() {
        let config: SpoolConfig =
            serde_json::from_str(r#"{"queue_capacity": 10, "max_retry": 5}"#).expect("parse");
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.max_retry, 5);
        assert_eq!(config.worker_backlog, 50);
        assert_eq!(config.retention_days, 7);
    }
}
