//! Database ↔ schedule reconciliation, run by the leader only.
//!
//! Two entry points: [`SyncEngine::bootstrap`] once on gaining leadership and
//! [`SyncEngine::refresh`] periodically afterwards. Both paginate the
//! active-monitor listing to bound per-cycle memory. Event-driven deltas
//! handle the common case quickly; anything they miss (lost events,
//! leadership gaps, failed cycles) is corrected by the next refresh.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use uptick_core::repository::{self, MonitorRepository};

use crate::schedule::{self, ScheduleStore};
use crate::time::next_aligned;

/// Page size for walks over the active-monitor listing.
const PAGE_SIZE: u64 = 100;

#[derive(Debug, Error)]
pub enum Error {
    #[error("monitor listing failed: {0}")]
    Repository(#[from] repository::Error),
    #[error("schedule update failed: {0}")]
    Schedule(#[from] schedule::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Keeps the Redis schedule consistent with the monitor database.
pub struct SyncEngine {
    monitors: Arc<dyn MonitorRepository>,
    schedule: ScheduleStore,
    /// Mirror of schedule membership, used to detect interval changes
    /// without an extra read per monitor per refresh.
    intervals: RwLock<HashMap<String, i64>>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(monitors: Arc<dyn MonitorRepository>, schedule: ScheduleStore) -> Self {
        Self {
            monitors,
            schedule,
            intervals: RwLock::new(HashMap::new()),
        }
    }

    /// The interval currently tracked for a monitor, if any.
    #[must_use]
    pub fn interval_of(&self, id: &str) -> Option<i64> {
        self.intervals.read().get(id).copied()
    }

    /// Number of monitors currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.intervals.read().len()
    }

    /// Populate the schedule on gaining leadership.
    ///
    /// Entries already present in Redis are preserved: in-flight leases and
    /// pending fires must not be disturbed by a leadership change. Members
    /// no longer active in the database are pruned afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<()> {
        let existing = self.schedule.members().await?;
        let now_ms = self.schedule.now_ms().await;
        let mut seen = HashSet::new();
        let mut scheduled = 0_usize;
        let mut page = 1;
        loop {
            let batch = self.monitors.find_active_paginated(page, PAGE_SIZE).await?;
            if batch.is_empty() {
                break;
            }
            for monitor in &batch {
                if monitor.interval_secs <= 0 {
                    continue;
                }
                seen.insert(monitor.id.clone());
                self.intervals
                    .write()
                    .insert(monitor.id.clone(), monitor.interval_secs);
                if !existing.contains(&monitor.id) {
                    self.schedule
                        .upsert_due(&monitor.id, next_aligned(now_ms, monitor.interval_secs))
                        .await?;
                    scheduled += 1;
                }
            }
            page += 1;
        }

        let mut pruned = 0_usize;
        for id in existing.difference(&seen) {
            self.schedule.remove(id).await?;
            pruned += 1;
        }
        self.intervals.write().retain(|id, _| seen.contains(id));
        tracing::info!(scheduled, pruned, tracked = seen.len(), "schedule bootstrap complete");
        Ok(())
    }

    /// Periodic reconciliation: pick up monitors that are new or whose
    /// interval changed, and unschedule everything that left the active set.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let now_ms = self.schedule.now_ms().await;
        let mut seen = HashSet::new();
        let mut changed = 0_usize;
        let mut page = 1;
        loop {
            let batch = self.monitors.find_active_paginated(page, PAGE_SIZE).await?;
            if batch.is_empty() {
                break;
            }
            for monitor in &batch {
                if monitor.interval_secs <= 0 {
                    continue;
                }
                seen.insert(monitor.id.clone());
                let known = self.intervals.read().get(&monitor.id).copied();
                if known != Some(monitor.interval_secs) {
                    self.schedule
                        .upsert_due(&monitor.id, next_aligned(now_ms, monitor.interval_secs))
                        .await?;
                    self.intervals
                        .write()
                        .insert(monitor.id.clone(), monitor.interval_secs);
                    changed += 1;
                }
            }
            page += 1;
        }

        let stale: Vec<String> = self
            .intervals
            .read()
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for id in &stale {
            self.schedule.remove(id).await?;
        }
        self.intervals.write().retain(|id, _| seen.contains(id));
        if changed > 0 || !stale.is_empty() {
            tracing::info!(changed, removed = stale.len(), "schedule refresh applied changes");
        }
        Ok(())
    }

    /// `monitor.created`: schedule if the record is schedulable, ignore
    /// otherwise (the refresh picks it up if that changes later).
    pub async fn handle_created(&self, id: &str) -> Result<()> {
        match self.monitors.find_by_id(id).await? {
            Some(m) if m.is_schedulable() => self.schedule_monitor(id, m.interval_secs).await,
            _ => Ok(()),
        }
    }

    /// `monitor.updated`: re-read the record; reschedule with the current
    /// interval, or unschedule if it is no longer schedulable.
    pub async fn handle_updated(&self, id: &str) -> Result<()> {
        match self.monitors.find_by_id(id).await? {
            Some(m) if m.is_schedulable() => self.schedule_monitor(id, m.interval_secs).await,
            _ => self.unschedule_monitor(id).await,
        }
    }

    /// `monitor.deleted`: unschedule.
    pub async fn handle_deleted(&self, id: &str) -> Result<()> {
        self.unschedule_monitor(id).await
    }

    /// Upsert into the due set at the next aligned slot, dropping any lease.
    pub async fn schedule_monitor(&self, id: &str, interval_secs: i64) -> Result<()> {
        let now_ms = self.schedule.now_ms().await;
        self.schedule
            .upsert_due(id, next_aligned(now_ms, interval_secs))
            .await?;
        self.intervals.write().insert(id.to_string(), interval_secs);
        tracing::debug!(monitor = id, interval_secs, "monitor scheduled");
        Ok(())
    }

    /// Remove from both sets and forget the interval.
    pub async fn unschedule_monitor(&self, id: &str) -> Result<()> {
        self.schedule.remove(id).await?;
        self.intervals.write().remove(id);
        tracing::debug!(monitor = id, "monitor unscheduled");
        Ok(())
    }

    /// The periodic refresh loop, cancelled on leadership loss. Errors abort
    /// the cycle; the next tick retries from scratch.
    pub async fn run_refresher(self: Arc<Self>, every: Duration, token: CancellationToken) {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // An interval's first tick is immediate, and bootstrap just ran.
        tick.tick().await;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = tick.tick() => {
                    if let Err(err) = self.refresh().await {
                        tracing::warn!(error = %err, "schedule refresh failed, retrying next cycle");
                    }
                }
            }
        }
        tracing::debug!("refresher stopped");
    }
}
