//! Recovery of leases whose workers crashed, stalled, or partitioned away.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::schedule::ScheduleStore;

/// One reclaimer runs per producer; the reclaim script itself is the mutual
/// exclusion point, so concurrent reclaimers are safe.
pub(crate) async fn run_reclaimer(
    schedule: ScheduleStore,
    every: Duration,
    grace: Duration,
    token: CancellationToken,
) {
    tracing::debug!("reclaimer started");
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = tick.tick() => {
                let now_ms = schedule.now_ms().await;
                // The cutoff trails the clock so a worker finishing its
                // reschedule is not raced the instant its lease expires.
                let cutoff = now_ms - i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
                match schedule.reclaim(cutoff).await {
                    Ok(ids) if !ids.is_empty() => {
                        tracing::info!(count = ids.len(), "reclaimed expired leases");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "lease reclaim failed"),
                }
            }
        }
    }
    tracing::debug!("reclaimer stopped");
}
