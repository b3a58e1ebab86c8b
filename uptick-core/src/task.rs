//! The hand-off contract between the scheduler and downstream check workers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitor::{Monitor, MonitorKind, RetryPolicy};
use crate::proxy::Proxy;

/// Task type tag under which health checks are enqueued.
pub const HEALTHCHECK_TASK_TYPE: &str = "monitor:healthcheck";

/// Name of the downstream queue health checks are routed to.
pub const HEALTHCHECK_QUEUE: &str = "healthcheck";

/// Uniqueness key suppressing duplicate enqueues for a monitor.
#[must_use]
pub fn uniqueness_key(monitor_id: &str) -> String {
    format!("healthcheck:{monitor_id}")
}

/// A snapshot of everything a check executor needs, frozen at enqueue time.
///
/// Monitor records may change or disappear between enqueue and execution;
/// executors work from this snapshot, never from the repository.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthCheckTask {
    pub monitor_id: String,
    pub monitor_name: String,
    #[serde(rename = "type")]
    pub kind: MonitorKind,
    pub config: serde_json::Value,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    #[serde(default)]
    pub proxy: Option<Proxy>,
    /// The slot this check was scheduled for, per the Redis clock.
    pub scheduled_at: DateTime<Utc>,
    pub is_under_maintenance: bool,
    pub check_cert_expiry: bool,
}

impl HealthCheckTask {
    /// Build the payload for `monitor`, scheduled at `scheduled_at`.
    #[must_use]
    pub fn from_monitor(
        monitor: &Monitor,
        proxy: Option<Proxy>,
        scheduled_at: DateTime<Utc>,
        is_under_maintenance: bool,
    ) -> Self {
        Self {
            monitor_id: monitor.id.clone(),
            monitor_name: monitor.name.clone(),
            kind: monitor.kind,
            config: monitor.config.clone(),
            timeout_secs: monitor.timeout_secs,
            retry: monitor.retry,
            proxy,
            scheduled_at,
            is_under_maintenance,
            check_cert_expiry: monitor.kind.checks_cert_expiry(),
        }
    }
}

/// Queue-layer options attached to an enqueued task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Target queue name.
    pub queue: String,
    /// Retries at the queue layer. The scheduler always passes zero; the
    /// executor and the monitor's own retry policy handle failures.
    pub max_retries: u32,
    /// Per-task execution budget, derived from the monitor timeout.
    pub timeout: Duration,
    /// How long a completed task is retained. Zero for health checks.
    pub retention: Duration,
}

impl EnqueueOptions {
    /// Options for a health check of a monitor with the given timeout.
    #[must_use]
    pub fn healthcheck(timeout: Duration) -> Self {
        Self {
            queue: HEALTHCHECK_QUEUE.to_string(),
            max_retries: 0,
            timeout,
            retention: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniqueness_key_is_namespaced_by_monitor() {
        assert_eq!(uniqueness_key("m1"), "healthcheck:m1");
    }

    #[test]
    fn payload_snapshots_monitor_fields() {
        let monitor = Monitor {
            id: "m1".into(),
            name: "edge-1".into(),
            kind: MonitorKind::Http,
            interval_secs: 60,
            timeout_secs: 16,
            proxy_id: None,
            config: serde_json::json!({"url": "https://example.com"}),
            active: true,
            retry: RetryPolicy {
                max_retries: 3,
                retry_interval_secs: 30,
            },
        };
        let task = HealthCheckTask::from_monitor(&monitor, None, Utc::now(), false);
        assert_eq!(task.monitor_id, "m1");
        assert_eq!(task.timeout_secs, 16);
        assert_eq!(task.retry.max_retries, 3);
        assert!(task.check_cert_expiry);
        assert!(!task.is_under_maintenance);
    }

    #[test]
    fn healthcheck_options_never_retry_at_the_queue_layer() {
        let opts = EnqueueOptions::healthcheck(Duration::from_secs(16));
        assert_eq!(opts.queue, HEALTHCHECK_QUEUE);
        assert_eq!(opts.max_retries, 0);
        assert_eq!(opts.retention, Duration::ZERO);
    }
}
