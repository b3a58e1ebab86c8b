//! The downstream work queue interface, plus an in-memory double.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::time::Instant;

use crate::task::{EnqueueOptions, HealthCheckTask};

#[derive(Debug, Error)]
pub enum Error {
    /// The queue transport failed; the caller retries on its next tick.
    #[error("queue backend error: {0}")]
    Backend(String),
    /// The payload could not be serialized.
    #[error("task encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Result of a unique enqueue attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The task was deposited on the queue.
    Pushed,
    /// A task with the same uniqueness key is still live; nothing was
    /// enqueued. This is the intended duplicate-suppression path, not an
    /// error.
    Duplicate,
}

/// Producer-side surface of the downstream job queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue `task` unless `unique_key` was used within `unique_ttl`.
    async fn enqueue_unique(
        &self,
        task_type: &str,
        task: &HealthCheckTask,
        unique_key: &str,
        unique_ttl: Duration,
        opts: &EnqueueOptions,
    ) -> Result<EnqueueOutcome>;
}

/// A recorded enqueue, kept by [`MemoryTaskQueue`] for assertions.
#[derive(Clone, Debug)]
pub struct QueuedTask {
    pub task_type: String,
    pub task: HealthCheckTask,
    pub unique_key: String,
    pub opts: EnqueueOptions,
    pub enqueued_at: Instant,
}

/// In-memory queue honoring uniqueness TTLs, for tests and local bring-up.
#[derive(Default)]
pub struct MemoryTaskQueue {
    log: RwLock<Vec<QueuedTask>>,
    pending: RwLock<VecDeque<QueuedTask>>,
    unique: RwLock<HashMap<String, Instant>>,
}

impl MemoryTaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything ever enqueued, duplicates excluded. Unaffected by
    /// [`take`](Self::take).
    pub fn tasks(&self) -> Vec<QueuedTask> {
        self.log.read().clone()
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.read().is_empty()
    }

    /// Consume the oldest waiting task. Taking a task releases its
    /// uniqueness key, the way a real queue does once a worker picks the
    /// task up.
    pub fn take(&self) -> Option<QueuedTask> {
        let taken = self.pending.write().pop_front()?;
        self.unique.write().remove(&taken.unique_key);
        Some(taken)
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue_unique(
        &self,
        task_type: &str,
        task: &HealthCheckTask,
        unique_key: &str,
        unique_ttl: Duration,
        opts: &EnqueueOptions,
    ) -> Result<EnqueueOutcome> {
        let now = Instant::now();
        {
            let mut unique = self.unique.write();
            if let Some(expires) = unique.get(unique_key) {
                if *expires > now {
                    return Ok(EnqueueOutcome::Duplicate);
                }
            }
            unique.insert(unique_key.to_string(), now + unique_ttl);
        }
        let queued = QueuedTask {
            task_type: task_type.to_string(),
            task: task.clone(),
            unique_key: unique_key.to_string(),
            opts: opts.clone(),
            enqueued_at: now,
        };
        self.log.write().push(queued.clone());
        self.pending.write().push_back(queued);
        Ok(EnqueueOutcome::Pushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{Monitor, MonitorKind, RetryPolicy};
    use crate::task::{uniqueness_key, HEALTHCHECK_TASK_TYPE};
    use chrono::Utc;

    fn task() -> HealthCheckTask {
        let monitor = Monitor {
            id: "m1".into(),
            name: "edge-1".into(),
            kind: MonitorKind::Tcp,
            interval_secs: 60,
            timeout_secs: 10,
            proxy_id: None,
            config: serde_json::Value::Null,
            active: true,
            retry: RetryPolicy::default(),
        };
        HealthCheckTask::from_monitor(&monitor, None, Utc::now(), false)
    }

    #[tokio::test(start_paused = true)]
    async fn unique_key_suppresses_until_ttl_elapses() {
        let queue = MemoryTaskQueue::new();
        let t = task();
        let key = uniqueness_key(&t.monitor_id);
        let opts = EnqueueOptions::healthcheck(Duration::from_secs(10));
        let ttl = Duration::from_secs(120);

        let first = queue
            .enqueue_unique(HEALTHCHECK_TASK_TYPE, &t, &key, ttl, &opts)
            .await
            .unwrap();
        assert_eq!(first, EnqueueOutcome::Pushed);

        let second = queue
            .enqueue_unique(HEALTHCHECK_TASK_TYPE, &t, &key, ttl, &opts)
            .await
            .unwrap();
        assert_eq!(second, EnqueueOutcome::Duplicate);
        assert_eq!(queue.len(), 1);

        tokio::time::advance(Duration::from_secs(121)).await;
        let third = queue
            .enqueue_unique(HEALTHCHECK_TASK_TYPE, &t, &key, ttl, &opts)
            .await
            .unwrap();
        assert_eq!(third, EnqueueOutcome::Pushed);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn taking_a_task_releases_its_uniqueness_key() {
        let queue = MemoryTaskQueue::new();
        let t = task();
        let key = uniqueness_key(&t.monitor_id);
        let opts = EnqueueOptions::healthcheck(Duration::from_secs(10));
        let ttl = Duration::from_secs(120);

        queue
            .enqueue_unique(HEALTHCHECK_TASK_TYPE, &t, &key, ttl, &opts)
            .await
            .unwrap();
        let taken = queue.take().unwrap();
        assert_eq!(taken.unique_key, key);

        // The key is free again well before its TTL.
        let next = queue
            .enqueue_unique(HEALTHCHECK_TASK_TYPE, &t, &key, ttl, &opts)
            .await
            .unwrap();
        assert_eq!(next, EnqueueOutcome::Pushed);
        assert!(queue.take().is_some());
        assert!(queue.take().is_none());
        // The log still remembers both enqueues.
        assert_eq!(queue.len(), 2);
    }
}
