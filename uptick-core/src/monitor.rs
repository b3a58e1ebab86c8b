//! The monitor data model consumed by the scheduler.

use serde::{Deserialize, Serialize};

/// The probe transport of a monitor.
///
/// The scheduler never dispatches on the kind itself; it copies the tag (and
/// the opaque config blob) into the task payload for downstream executors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    Http,
    Tcp,
    Ping,
    Dns,
    Smtp,
    Database,
    Push,
    /// A kind this build does not know about. Kept so that newer monitor
    /// records still schedule; the executor decides what to do with them.
    #[serde(other)]
    Other,
}

impl MonitorKind {
    /// Whether checks of this kind should also verify certificate expiry.
    ///
    /// True exactly for the TLS-capable transports.
    #[must_use]
    pub fn checks_cert_expiry(self) -> bool {
        matches!(self, MonitorKind::Http | MonitorKind::Tcp)
    }
}

/// Retry behavior owned by the monitor, passed through to executors.
///
/// The scheduler itself never retries at the queue layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Consecutive failures before the monitor is considered down.
    pub max_retries: u32,
    /// Seconds between executor-side retries.
    pub retry_interval_secs: u32,
}

/// A user-defined periodic health check.
///
/// Read-only to the scheduler core; the source of truth is the monitor
/// repository. `active && interval_secs > 0` means the monitor is
/// schedulable, any other state means unschedule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Monitor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MonitorKind,
    /// Seconds between consecutive checks. Positive for schedulable monitors.
    pub interval_secs: i64,
    /// Per-check execution budget in seconds.
    pub timeout_secs: u64,
    /// Reference to a proxy record, resolved lazily at enqueue time.
    #[serde(default)]
    pub proxy_id: Option<String>,
    /// Kind-specific configuration, opaque to the scheduler.
    #[serde(default)]
    pub config: serde_json::Value,
    pub active: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Monitor {
    /// Whether this monitor belongs in the schedule at all.
    #[must_use]
    pub fn is_schedulable(&self) -> bool {
        self.active && self.interval_secs > 0
    }
}
