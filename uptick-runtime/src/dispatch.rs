//! The enqueue pipeline: load monitor context, build the task payload,
//! enqueue it with duplicate suppression.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use uptick_core::queue::{self, EnqueueOutcome, TaskQueue};
use uptick_core::repository::{self, MaintenanceService, MonitorRepository, ProxyRepository};
use uptick_core::task::{uniqueness_key, EnqueueOptions, HealthCheckTask, HEALTHCHECK_TASK_TYPE};

use crate::time::utc_from_ms;

#[derive(Debug, Error)]
pub enum Error {
    #[error("monitor lookup failed: {0}")]
    Repository(#[from] repository::Error),
    #[error("task enqueue failed: {0}")]
    Queue(#[from] queue::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Turns a claimed monitor id into a health-check task on the downstream
/// queue.
///
/// Degradation ladder: a missing or inactive monitor skips the enqueue and
/// reports interval zero so the worker drops the reschedule; maintenance and
/// proxy lookup failures degrade to "no maintenance" / "no proxy" with a
/// warning; a duplicate enqueue is the intended dedup path and is swallowed.
pub struct Dispatcher {
    monitors: Arc<dyn MonitorRepository>,
    proxies: Arc<dyn ProxyRepository>,
    maintenance: Arc<dyn MaintenanceService>,
    queue: Arc<dyn TaskQueue>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        monitors: Arc<dyn MonitorRepository>,
        proxies: Arc<dyn ProxyRepository>,
        maintenance: Arc<dyn MaintenanceService>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            monitors,
            proxies,
            maintenance,
            queue,
        }
    }

    /// Process one claimed monitor at the slot `now_ms`.
    ///
    /// Returns the interval to reschedule with; zero means the monitor is
    /// gone or inactive and must not be rescheduled (its lease expires and
    /// the next refresh purges it).
    #[tracing::instrument(level = "debug", skip_all, fields(monitor = monitor_id))]
    pub async fn process(&self, monitor_id: &str, now_ms: i64) -> Result<i64> {
        let Some(monitor) = self.monitors.find_by_id(monitor_id).await? else {
            tracing::info!("monitor disappeared since scheduling, skipping");
            return Ok(0);
        };
        if !monitor.is_schedulable() {
            tracing::debug!("monitor inactive, skipping");
            return Ok(0);
        }

        let scheduled_at = utc_from_ms(now_ms);
        let is_under_maintenance = match self
            .maintenance
            .is_under_maintenance(monitor_id, scheduled_at)
            .await
        {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "maintenance lookup failed, assuming none");
                false
            }
        };

        let proxy = match &monitor.proxy_id {
            Some(proxy_id) => match self.proxies.find_by_id(proxy_id).await {
                Ok(found) => {
                    if found.is_none() {
                        tracing::debug!(proxy = %proxy_id, "referenced proxy missing");
                    }
                    found
                }
                Err(err) => {
                    tracing::warn!(proxy = %proxy_id, error = %err, "proxy lookup failed, continuing without");
                    None
                }
            },
            None => None,
        };

        let task =
            HealthCheckTask::from_monitor(&monitor, proxy, scheduled_at, is_under_maintenance);
        let opts = EnqueueOptions::healthcheck(Duration::from_secs(monitor.timeout_secs));
        let unique_ttl = Duration::from_secs(monitor.interval_secs.unsigned_abs() * 2);
        match self
            .queue
            .enqueue_unique(
                HEALTHCHECK_TASK_TYPE,
                &task,
                &uniqueness_key(monitor_id),
                unique_ttl,
                &opts,
            )
            .await?
        {
            EnqueueOutcome::Pushed => tracing::debug!("health check enqueued"),
            EnqueueOutcome::Duplicate => {
                tracing::debug!("duplicate suppressed by uniqueness key");
            }
        }
        Ok(monitor.interval_secs)
    }
}
