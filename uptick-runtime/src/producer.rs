//! Producer orchestration: lifecycle of every background loop.
//!
//! On spawn, a producer starts the leader elector, the reclaimer and the
//! claim-worker pool (always on), subscribes the monitor lifecycle handlers,
//! and runs a leadership monitor that opens a child cancellation scope for
//! the sync side on gaining leadership and cancels it on losing it.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use uptick_core::events::{self, EventBus, EventHandler, MonitorEvent};
use uptick_core::queue::TaskQueue;
use uptick_core::repository::{MaintenanceService, MonitorRepository, ProxyRepository};

use crate::coordination::{self, ElectionConfig, LeaderElector, LeaderElectorHandle, LeaderState};
use crate::dispatch::Dispatcher;
use crate::reclaim;
use crate::schedule::ScheduleStore;
use crate::sync::SyncEngine;
use crate::worker::{run_claim_worker, WorkerSettings};

/// Claim workers per producer process.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Hard bounds on the worker pool size.
pub const CONCURRENCY_BOUNDS: std::ops::RangeInclusive<usize> = 1..=128;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid producer config: {0}")]
    Config(String),
    #[error(transparent)]
    Election(#[from] coordination::Error),
    #[error("event subscription failed: {0}")]
    Events(#[from] events::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Tunables for one producer process.
#[derive(Clone, Debug)]
pub struct ProducerConfig {
    /// Size of the claim-worker pool, bounded by [`CONCURRENCY_BOUNDS`].
    pub concurrency: usize,
    /// Monitors moved per claim script call. Bounds in-flight work at
    /// `batch_size × concurrency`.
    pub batch_size: usize,
    /// Idle sleep between claim attempts when nothing is due.
    pub claim_tick: Duration,
    /// Sleep after a failed claim before retrying.
    pub claim_error_backoff: Duration,
    /// How long a worker's claim on a monitor is honored.
    pub lease_ttl: Duration,
    /// Cadence of the expired-lease reclaimer.
    pub reclaim_every: Duration,
    /// Margin past expiry before a lease is considered abandoned.
    pub reclaim_grace: Duration,
    /// Cadence of the leader's periodic schedule refresh.
    pub refresh_every: Duration,
    pub election: ElectionConfig,
}

impl ProducerConfig {
    /// Defaults for a node; see the field docs for the individual values.
    #[must_use]
    pub fn for_node(node_id: impl Into<String>) -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: 50,
            claim_tick: Duration::from_millis(200),
            claim_error_backoff: Duration::from_millis(100),
            lease_ttl: Duration::from_secs(30),
            reclaim_every: Duration::from_secs(5),
            reclaim_grace: Duration::from_secs(5),
            refresh_every: Duration::from_secs(30),
            election: ElectionConfig::for_node(node_id),
        }
    }

    /// Validate the config.
    ///
    /// # Errors
    /// Returns `Error::Config` when the concurrency or batch size is out of
    /// bounds, or the election config is invalid.
    pub fn validate(mut self) -> Result<Self> {
        if !CONCURRENCY_BOUNDS.contains(&self.concurrency) {
            return Err(Error::Config(format!(
                "concurrency {} outside {:?}",
                self.concurrency, CONCURRENCY_BOUNDS
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if self.lease_ttl.is_zero() {
            return Err(Error::Config("lease_ttl must be non-zero".into()));
        }
        self.election = self.election.validate()?;
        Ok(self)
    }
}

/// External collaborators a producer is wired to at construction time.
pub struct Collaborators {
    pub monitors: Arc<dyn MonitorRepository>,
    pub proxies: Arc<dyn ProxyRepository>,
    pub maintenance: Arc<dyn MaintenanceService>,
    pub queue: Arc<dyn TaskQueue>,
    pub bus: Arc<dyn EventBus>,
}

/// A producer process: one schedule consumer among interchangeable peers.
pub struct Producer {
    schedule: ScheduleStore,
    sync: Arc<SyncEngine>,
    dispatcher: Arc<Dispatcher>,
    bus: Arc<dyn EventBus>,
    conn: ConnectionManager,
    config: ProducerConfig,
}

impl Producer {
    /// Wire a producer. Fails fast on invalid config.
    pub fn new(
        conn: ConnectionManager,
        collaborators: Collaborators,
        config: ProducerConfig,
    ) -> Result<Self> {
        let config = config.validate()?;
        let schedule = ScheduleStore::new(conn.clone());
        Ok(Self::with_schedule(conn, schedule, collaborators, config))
    }

    /// Like [`Producer::new`] but over an existing store; lets tests point a
    /// producer at namespaced schedule keys. Skips re-validation.
    #[must_use]
    pub fn with_schedule(
        conn: ConnectionManager,
        schedule: ScheduleStore,
        collaborators: Collaborators,
        config: ProducerConfig,
    ) -> Self {
        let sync = Arc::new(SyncEngine::new(
            collaborators.monitors.clone(),
            schedule.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            collaborators.monitors,
            collaborators.proxies,
            collaborators.maintenance,
            collaborators.queue,
        ));
        Self {
            schedule,
            sync,
            dispatcher,
            bus: collaborators.bus,
            conn,
            config,
        }
    }

    /// Start every background loop and return the running producer's handle.
    pub async fn spawn(self) -> Result<ProducerHandle> {
        let token = CancellationToken::new();
        let elector = LeaderElector::spawn(
            self.conn.clone(),
            self.config.election.clone(),
            token.child_token(),
        );

        self.subscribe_events(elector.state()).await?;

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        tasks.push(tokio::spawn(reclaim::run_reclaimer(
            self.schedule.clone(),
            self.config.reclaim_every,
            self.config.reclaim_grace,
            token.clone(),
        )));

        let settings = WorkerSettings {
            batch_size: self.config.batch_size,
            claim_tick: self.config.claim_tick,
            error_backoff: self.config.claim_error_backoff,
            lease_ttl: self.config.lease_ttl,
        };
        for worker in 0..self.config.concurrency {
            tasks.push(tokio::spawn(run_claim_worker(
                worker,
                self.schedule.clone(),
                self.dispatcher.clone(),
                settings.clone(),
                token.clone(),
            )));
        }

        tasks.push(tokio::spawn(run_leadership_monitor(
            self.sync.clone(),
            elector.state(),
            self.config.refresh_every,
            token.clone(),
        )));

        tracing::info!(
            node = %self.config.election.node_id,
            concurrency = self.config.concurrency,
            "producer started"
        );
        Ok(ProducerHandle {
            token,
            tasks,
            elector,
        })
    }

    /// Register the three lifecycle handlers. They are no-ops on non-leader
    /// nodes; the gate is a best-effort optimisation, not a correctness
    /// requirement, since every schedule write is safe to double-apply.
    async fn subscribe_events(
        &self,
        state: watch::Receiver<LeaderState>,
    ) -> Result<(), events::Error> {
        for event in [
            MonitorEvent::Created,
            MonitorEvent::Updated,
            MonitorEvent::Deleted,
        ] {
            let sync = self.sync.clone();
            let state = state.clone();
            let handler: EventHandler = Box::new(move |payload| {
                let sync = sync.clone();
                let state = state.clone();
                Box::pin(async move {
                    if !state.borrow().is_leader() {
                        return;
                    }
                    let id = match payload.monitor_id() {
                        Ok(id) => id,
                        Err(err) => {
                            tracing::warn!(event = %event, error = %err, "dropping undecodable monitor event");
                            return;
                        }
                    };
                    let outcome = match event {
                        MonitorEvent::Created => sync.handle_created(&id).await,
                        MonitorEvent::Updated => sync.handle_updated(&id).await,
                        MonitorEvent::Deleted => sync.handle_deleted(&id).await,
                    };
                    if let Err(err) = outcome {
                        tracing::warn!(
                            event = %event,
                            monitor = %id,
                            error = %err,
                            "event-driven sync failed; next refresh reconciles"
                        );
                    }
                })
            });
            self.bus.subscribe(event, handler).await?;
        }
        Ok(())
    }
}

/// Watches leadership transitions once a second: gaining leadership runs the
/// bootstrap and starts the refresher under a child scope; losing it cancels
/// that scope so the refresher exits before its next cycle.
async fn run_leadership_monitor(
    sync: Arc<SyncEngine>,
    state: watch::Receiver<LeaderState>,
    refresh_every: Duration,
    token: CancellationToken,
) {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut sync_scope: Option<CancellationToken> = None;
    let mut was_leader = false;
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = tick.tick() => {
                let is_leader = state.borrow().is_leader();
                if is_leader && !was_leader {
                    tracing::info!("gained leadership, starting schedule sync");
                    let scope = token.child_token();
                    if let Err(err) = sync.bootstrap().await {
                        tracing::warn!(error = %err, "bootstrap failed; periodic refresh will reconcile");
                    }
                    tokio::spawn(sync.clone().run_refresher(refresh_every, scope.clone()));
                    sync_scope = Some(scope);
                } else if !is_leader && was_leader {
                    tracing::info!("lost leadership, stopping schedule sync");
                    if let Some(scope) = sync_scope.take() {
                        scope.cancel();
                    }
                }
                was_leader = is_leader;
            }
        }
    }
    if let Some(scope) = sync_scope.take() {
        scope.cancel();
    }
}

/// Handle to a running producer.
pub struct ProducerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    elector: LeaderElectorHandle,
}

impl ProducerHandle {
    /// Whether this producer currently owns the sync role.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.elector.is_leader()
    }

    /// Observe leadership transitions.
    #[must_use]
    pub fn leader_state(&self) -> watch::Receiver<LeaderState> {
        self.elector.state()
    }

    /// Graceful stop: cancel every loop, wait for them to exit, and release
    /// leadership if held.
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        self.elector.join().await;
        tracing::info!("producer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_is_bounded() {
        let mut cfg = ProducerConfig::for_node("n1");
        cfg.concurrency = 0;
        assert!(cfg.clone().validate().is_err());
        cfg.concurrency = 129;
        assert!(cfg.clone().validate().is_err());
        cfg.concurrency = 128;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn defaults_validate() {
        assert!(ProducerConfig::for_node("n1").validate().is_ok());
    }

    #[test]
    fn zero_batch_rejected() {
        let mut cfg = ProducerConfig::for_node("n1");
        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());
    }
}
