//! Leader election over a single TTL-backed Redis key.
//!
//! Exactly one producer at a time may run the sync engine (the component
//! that reads the authoritative monitor database and writes schedule
//! entries); claim workers and the reclaimer keep running on every producer
//! regardless of leadership.
//!
//! The protocol is a compare-and-set loop on one key: candidates `SET NX EX`
//! their node id, the holder renews with `EXPIRE`, and a crashed leader is
//! succeeded within the key's TTL. Leadership may therefore be vacant for up
//! to one TTL after a crash; during that window producers keep draining the
//! existing schedule and only sync pauses. Release on shutdown is an
//! owner-checked delete so a node never drops a lease it lost to a peer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::scripts;

/// The election key. A value is the node id of the current leader.
pub const LEADER_KEY: &str = "producer:leader";

/// Fraction of the renewal interval used to jitter non-leader attempts, so a
/// leader crash does not produce a synchronized SETNX storm.
const JITTER_FACTOR: f64 = 0.2;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid leader election config: {0}")]
    Config(String),
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Configuration for the leader elector.
#[derive(Clone, Debug)]
pub struct ElectionConfig {
    /// The Redis key contended for.
    pub leader_key: String,
    /// Stable identity of this process; see [`node_id`].
    pub node_id: String,
    /// How often the elector tries to acquire or renew.
    pub renewal_interval: Duration,
    /// TTL on the leader key. Bounds failover time after a leader crash.
    pub lease_ttl: Duration,
}

impl ElectionConfig {
    /// Defaults: renewal every 5 s against a 10 s lease.
    #[must_use]
    pub fn for_node(node_id: impl Into<String>) -> Self {
        Self {
            leader_key: LEADER_KEY.to_string(),
            node_id: node_id.into(),
            renewal_interval: Duration::from_secs(5),
            lease_ttl: Duration::from_secs(10),
        }
    }

    /// Validate the config.
    ///
    /// # Errors
    /// Returns `Error::Config` when `node_id` is empty, either duration is
    /// zero, or the lease would expire before its next renewal.
    pub fn validate(self) -> Result<Self> {
        if self.node_id.is_empty() {
            return Err(Error::Config("node_id may not be empty".into()));
        }
        if self.renewal_interval.is_zero() || self.lease_ttl.is_zero() {
            return Err(Error::Config(
                "renewal_interval and lease_ttl must be non-zero".into(),
            ));
        }
        if self.lease_ttl <= self.renewal_interval {
            return Err(Error::Config(
                "lease_ttl must be greater than renewal_interval".into(),
            ));
        }
        Ok(self)
    }
}

/// Leadership as observed by this process.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LeaderState {
    /// This node holds the leader key.
    Leading,
    /// Another node holds the leader key.
    Following,
    /// The key is unheld or unknown (startup, vacancy, or Redis errors).
    Standby,
}

impl LeaderState {
    #[must_use]
    pub fn is_leader(self) -> bool {
        matches!(self, LeaderState::Leading)
    }
}

/// The election task. Spawn one per producer process.
pub struct LeaderElector {
    conn: ConnectionManager,
    config: ElectionConfig,
    release: redis::Script,
    state_tx: watch::Sender<LeaderState>,
    is_leader: Arc<AtomicBool>,
    token: CancellationToken,
    had_error_on_last_try: bool,
}

impl LeaderElector {
    /// Create a `LeaderElector` and spawn it onto the runtime.
    ///
    /// The task runs until `token` is cancelled, then releases the key if it
    /// still owns it.
    #[must_use = "handle must be used for observing leadership state"]
    pub fn spawn(
        conn: ConnectionManager,
        config: ElectionConfig,
        token: CancellationToken,
    ) -> LeaderElectorHandle {
        let (state_tx, state_rx) = watch::channel(LeaderState::Standby);
        let is_leader = Arc::new(AtomicBool::new(false));
        let this = LeaderElector {
            conn,
            config,
            release: scripts::release_leader(),
            state_tx,
            is_leader: is_leader.clone(),
            token,
            had_error_on_last_try: false,
        };
        let handle = tokio::spawn(this.run());
        LeaderElectorHandle {
            state: state_rx,
            is_leader,
            handle,
        }
    }

    async fn run(mut self) {
        tracing::info!(node = %self.config.node_id, "leader elector started");
        let token = self.token.clone();
        self.attempt().await;
        loop {
            let delay = self.next_attempt_delay();
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(delay) => self.attempt().await,
            }
        }
        if self.is_leader.load(Ordering::SeqCst) {
            if let Err(err) = self.release().await {
                tracing::warn!(error = %err, "failed to release leadership on shutdown");
            }
        }
        self.update_state(LeaderState::Standby);
        tracing::info!(node = %self.config.node_id, "leader elector terminated");
    }

    async fn attempt(&mut self) {
        match self.try_acquire_or_renew().await {
            Ok(state) => self.update_state(state),
            Err(err) => {
                tracing::warn!(error = %err, "leader election attempt failed");
                self.had_error_on_last_try = true;
                self.update_state(LeaderState::Standby);
            }
        }
    }

    /// One pass of the CAS protocol: acquire if vacant, renew if held by us,
    /// follow otherwise.
    #[tracing::instrument(level = "debug", skip_all)]
    async fn try_acquire_or_renew(&mut self) -> Result<LeaderState> {
        let mut conn = self.conn.clone();
        let ttl_secs = self.config.lease_ttl.as_secs().max(1);

        let acquired: bool = redis::cmd("SET")
            .arg(&self.config.leader_key)
            .arg(&self.config.node_id)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        if acquired {
            return Ok(LeaderState::Leading);
        }

        let holder: Option<String> = conn.get(&self.config.leader_key).await?;
        match holder {
            Some(id) if id == self.config.node_id => {
                let renewed: bool = conn
                    .expire(&self.config.leader_key, ttl_secs as i64)
                    .await?;
                if renewed {
                    Ok(LeaderState::Leading)
                } else {
                    // Key expired between SET and EXPIRE; contend again next tick.
                    Ok(LeaderState::Standby)
                }
            }
            Some(_) => Ok(LeaderState::Following),
            None => Ok(LeaderState::Standby),
        }
    }

    fn update_state(&mut self, next: LeaderState) {
        let prev = *self.state_tx.borrow();
        self.is_leader.store(next.is_leader(), Ordering::SeqCst);
        if prev == next {
            return;
        }
        if next.is_leader() {
            tracing::info!(node = %self.config.node_id, "acquired leadership");
        } else if prev.is_leader() {
            tracing::warn!(node = %self.config.node_id, "lost leadership");
        }
        self.state_tx.send_replace(next);
    }

    fn next_attempt_delay(&mut self) -> Duration {
        let base = self.config.renewal_interval;
        if self.had_error_on_last_try {
            self.had_error_on_last_try = false;
            return base.mul_f64(rand::rng().random_range(0.5..1.5));
        }
        match *self.state_tx.borrow() {
            LeaderState::Leading => base,
            LeaderState::Following | LeaderState::Standby => {
                base.mul_f64(1.0 + JITTER_FACTOR * rand::rng().random_range(0.0..1.0))
            }
        }
    }

    async fn release(&mut self) -> Result<()> {
        let mut conn = self.conn.clone();
        let released: i64 = self
            .release
            .key(&self.config.leader_key)
            .arg(&self.config.node_id)
            .invoke_async(&mut conn)
            .await?;
        if released == 1 {
            tracing::info!(node = %self.config.node_id, "released leadership");
        }
        Ok(())
    }
}

/// Handle to a spawned elector task.
pub struct LeaderElectorHandle {
    state: watch::Receiver<LeaderState>,
    is_leader: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl LeaderElectorHandle {
    /// Whether this node currently believes it is the leader.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// A channel over the observed leadership state, for components that
    /// react to transitions rather than polling Redis.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<LeaderState> {
        self.state.clone()
    }

    /// Wait for the elector task to exit. It releases held leadership on the
    /// way out; cancel the token passed to [`LeaderElector::spawn`] first.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// A stable per-process identity: hostname and pid, with a random component
/// when the hostname is unavailable.
#[must_use]
pub fn node_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| format!("node-{:04x}", rand::rng().random::<u16>()));
    format!("{host}-{}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_empty_identity() {
        let cfg = ElectionConfig::for_node("");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_rejects_lease_shorter_than_renewal() {
        let mut cfg = ElectionConfig::for_node("n1");
        cfg.lease_ttl = Duration::from_secs(3);
        cfg.renewal_interval = Duration::from_secs(5);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_defaults_are_valid() {
        assert!(ElectionConfig::for_node("n1").validate().is_ok());
    }

    #[test]
    fn node_id_embeds_the_pid() {
        let id = node_id();
        assert!(id.ends_with(&format!("-{}", std::process::id())));
    }

    #[test]
    fn only_leading_counts_as_leader() {
        assert!(LeaderState::Leading.is_leader());
        assert!(!LeaderState::Following.is_leader());
        assert!(!LeaderState::Standby.is_leader());
    }
}
