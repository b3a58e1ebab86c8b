//! Redis-backed downstream queue with unique-key duplicate suppression.
//!
//! The producer only needs one queue operation: deposit a task unless the
//! same uniqueness key was used within its TTL. Both halves happen inside a
//! single script so a crash between them can never leave a claimed key
//! without its task.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};

use uptick_core::queue::{self, EnqueueOutcome, TaskQueue};
use uptick_core::task::{uniqueness_key, EnqueueOptions, HealthCheckTask};

use crate::scripts;

/// The wire format deposited on the queue list: queue-layer options ride
/// along with the payload so consumers need no side channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_type: String,
    pub queue: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub retention_secs: u64,
    pub payload: HealthCheckTask,
}

/// `TaskQueue` over Redis lists, namespaced per queue name.
#[derive(Clone)]
pub struct RedisTaskQueue {
    conn: ConnectionManager,
    enqueue: Script,
    namespace: String,
}

impl RedisTaskQueue {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self::with_namespace(conn, "uptick")
    }

    /// Custom key namespace, used by tests to isolate suites.
    #[must_use]
    pub fn with_namespace(conn: ConnectionManager, namespace: &str) -> Self {
        Self {
            conn,
            enqueue: scripts::enqueue_unique(),
            namespace: namespace.to_string(),
        }
    }

    fn jobs_key(&self, queue: &str) -> String {
        format!("{}:{}:jobs", self.namespace, queue)
    }

    fn unique_key(&self, key: &str) -> String {
        format!("{}:unique:{}", self.namespace, key)
    }

    /// Number of tasks waiting on a queue.
    pub async fn depth(&self, queue: &str) -> queue::Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn
            .llen(self.jobs_key(queue))
            .await
            .map_err(|e| queue::Error::Backend(e.to_string()))?;
        Ok(len)
    }

    /// Pop the oldest waiting task, if any. Consumer side, used by tests and
    /// by check workers colocated with the producer.
    ///
    /// Taking a task releases its uniqueness key: the TTL is only the
    /// fallback bound for tasks nobody consumes, and the next interval's
    /// enqueue must be admitted once this one is being processed.
    pub async fn pop(&self, queue: &str) -> queue::Result<Option<TaskEnvelope>> {
        let mut conn = self.conn.clone();
        let body: Option<String> = conn
            .rpop(self.jobs_key(queue), None)
            .await
            .map_err(|e| queue::Error::Backend(e.to_string()))?;
        let Some(body) = body else {
            return Ok(None);
        };
        let envelope: TaskEnvelope = serde_json::from_str(&body)?;
        let unique = self.unique_key(&uniqueness_key(&envelope.payload.monitor_id));
        conn.del::<_, ()>(unique)
            .await
            .map_err(|e| queue::Error::Backend(e.to_string()))?;
        Ok(Some(envelope))
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue_unique(
        &self,
        task_type: &str,
        task: &HealthCheckTask,
        unique_key: &str,
        unique_ttl: Duration,
        opts: &EnqueueOptions,
    ) -> queue::Result<EnqueueOutcome> {
        let envelope = TaskEnvelope {
            task_type: task_type.to_string(),
            queue: opts.queue.clone(),
            max_retries: opts.max_retries,
            timeout_secs: opts.timeout.as_secs(),
            retention_secs: opts.retention.as_secs(),
            payload: task.clone(),
        };
        let body = serde_json::to_string(&envelope)?;
        let ttl_ms = u64::try_from(unique_ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let mut conn = self.conn.clone();
        let pushed: i64 = self
            .enqueue
            .key(self.unique_key(unique_key))
            .key(self.jobs_key(&opts.queue))
            .arg(ttl_ms)
            .arg(body)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| queue::Error::Backend(e.to_string()))?;
        Ok(if pushed == 1 {
            EnqueueOutcome::Pushed
        } else {
            EnqueueOutcome::Duplicate
        })
    }
}
