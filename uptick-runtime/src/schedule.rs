//! The Redis-backed distributed schedule.
//!
//! A schedule entry is a `(monitor_id, fire_at_ms)` pair living in exactly
//! one of two sorted sets: the due set (score: when the monitor becomes
//! eligible to fire) or the lease set (score: when a worker's claim on it
//! expires). Every transition between the sets goes through an atomic script,
//! so a monitor id appears in at most one set at any instant.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

use crate::scripts::ScheduleScripts;
use crate::time;

/// Sorted set of monitors eligible to fire at or after their score.
pub const DUE_SET: &str = "sched:due";

/// Sorted set of monitors currently claimed by a worker.
pub const LEASE_SET: &str = "sched:lease";

#[derive(Debug, Error)]
pub enum Error {
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Handle to the two schedule sets. Cheap to clone; clones share the
/// multiplexed connection.
#[derive(Clone)]
pub struct ScheduleStore {
    conn: ConnectionManager,
    scripts: Arc<ScheduleScripts>,
    due_key: String,
    lease_key: String,
}

impl ScheduleStore {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self::with_keys(conn, DUE_SET, LEASE_SET)
    }

    /// Custom key names, used by tests to isolate suites on a shared server.
    #[must_use]
    pub fn with_keys(conn: ConnectionManager, due_key: &str, lease_key: &str) -> Self {
        Self {
            conn,
            scripts: Arc::new(ScheduleScripts::default()),
            due_key: due_key.to_string(),
            lease_key: lease_key.to_string(),
        }
    }

    /// The coordination clock, in milliseconds.
    pub async fn now_ms(&self) -> i64 {
        time::redis_now_ms(&mut self.conn.clone()).await
    }

    /// Atomically move up to `batch` due monitors into the lease set.
    ///
    /// Concurrent claims never return overlapping ids; this is the only
    /// primitive that provides that guarantee.
    pub async fn claim(
        &self,
        now_ms: i64,
        batch: usize,
        lease_ttl: Duration,
    ) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = self
            .scripts
            .claim
            .key(&self.due_key)
            .key(&self.lease_key)
            .arg(now_ms)
            .arg(batch)
            .arg(lease_ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(ids)
    }

    /// Return a leased monitor to the due set with a new fire time.
    ///
    /// Returns false when the lease was already reclaimed, in which case the
    /// reclaimer has put the monitor back itself and this call is a no-op.
    pub async fn reschedule(&self, id: &str, next_ms: i64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let moved: i64 = self
            .scripts
            .reschedule
            .key(&self.lease_key)
            .key(&self.due_key)
            .arg(id)
            .arg(next_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved == 1)
    }

    /// Move leases expired at `cutoff_ms` back to the due set, immediately
    /// eligible. Returns the rescued ids.
    pub async fn reclaim(&self, cutoff_ms: i64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = self
            .scripts
            .reclaim
            .key(&self.lease_key)
            .key(&self.due_key)
            .arg(cutoff_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(ids)
    }

    /// Upsert a monitor into the due set at `fire_at_ms`, dropping any lease
    /// it may hold. Used by the sync engine for (re)scheduling.
    pub async fn upsert_due(&self, id: &str, fire_at_ms: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = redis::pipe()
            .atomic()
            .zrem(&self.lease_key, id)
            .ignore()
            .zadd(&self.due_key, id, fire_at_ms)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Remove a monitor from both sets.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = redis::pipe()
            .atomic()
            .zrem(&self.due_key, id)
            .ignore()
            .zrem(&self.lease_key, id)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// The union of members across both sets.
    pub async fn members(&self) -> Result<HashSet<String>> {
        let mut conn = self.conn.clone();
        let due: Vec<String> = conn.zrange(&self.due_key, 0, -1).await?;
        let leased: Vec<String> = conn.zrange(&self.lease_key, 0, -1).await?;
        Ok(due.into_iter().chain(leased).collect())
    }

    /// Fire time of a monitor in the due set, if present.
    pub async fn due_score(&self, id: &str) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = conn.zscore(&self.due_key, id).await?;
        Ok(score.map(|s| s as i64))
    }

    /// Lease expiry of a monitor in the lease set, if present.
    pub async fn lease_score(&self, id: &str) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = conn.zscore(&self.lease_key, id).await?;
        Ok(score.map(|s| s as i64))
    }
}
