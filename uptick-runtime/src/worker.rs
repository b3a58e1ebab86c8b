//! Claim workers: the claim → process → reschedule loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::schedule::ScheduleStore;
use crate::time::next_aligned;

/// Tunables for a single claim worker.
#[derive(Clone, Debug)]
pub(crate) struct WorkerSettings {
    pub(crate) batch_size: usize,
    pub(crate) claim_tick: Duration,
    pub(crate) error_backoff: Duration,
    pub(crate) lease_ttl: Duration,
}

/// One worker of the claim pool. Runs until the token is cancelled.
///
/// A crash or cancellation mid-batch leaves the unprocessed leases to expire
/// and be reclaimed; at most a TTL-bounded window of work is delayed, never
/// duplicated.
pub(crate) async fn run_claim_worker(
    worker: usize,
    schedule: ScheduleStore,
    dispatcher: Arc<Dispatcher>,
    settings: WorkerSettings,
    token: CancellationToken,
) {
    tracing::debug!(worker, "claim worker started");
    loop {
        if token.is_cancelled() {
            break;
        }
        let now_ms = schedule.now_ms().await;
        let ids = match schedule
            .claim(now_ms, settings.batch_size, settings.lease_ttl)
            .await
        {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!(worker, error = %err, "claim failed");
                if sleep_or_cancelled(&token, settings.error_backoff).await {
                    break;
                }
                continue;
            }
        };
        if ids.is_empty() {
            if sleep_or_cancelled(&token, settings.claim_tick).await {
                break;
            }
            continue;
        }
        tracing::debug!(worker, count = ids.len(), "claimed due monitors");

        let mut processed = Vec::with_capacity(ids.len());
        for id in ids {
            if token.is_cancelled() {
                break;
            }
            match dispatcher.process(&id, now_ms).await {
                Ok(interval_secs) => processed.push((id, interval_secs)),
                Err(err) => {
                    // No reschedule: the lease expires and the reclaimer
                    // recovers the monitor on its next pass.
                    tracing::warn!(worker, monitor = %id, error = %err, "monitor processing failed");
                }
            }
        }

        for (id, interval_secs) in processed {
            if interval_secs <= 0 {
                // Gone or inactive; the lease expires and the next refresh
                // purges the entry.
                continue;
            }
            match schedule
                .reschedule(&id, next_aligned(now_ms, interval_secs))
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(worker, monitor = %id, "lease already reclaimed, reschedule skipped");
                }
                Err(err) => {
                    tracing::warn!(worker, monitor = %id, error = %err, "reschedule failed");
                }
            }
        }
    }
    tracing::debug!(worker, "claim worker stopped");
}

/// Sleep for `duration` unless cancelled first; true means cancelled.
async fn sleep_or_cancelled(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        () = token.cancelled() => true,
        () = tokio::time::sleep(duration) => false,
    }
}
