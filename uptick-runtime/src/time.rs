//! The scheduler's clock and interval alignment.
//!
//! Every coordination decision reads the clock from Redis rather than the
//! local host: producers may have drifted clocks, and Redis is already the
//! single coordination authority. Local time is only ever used for pure
//! time-since measurements.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;

/// Milliseconds since the epoch according to the Redis server.
///
/// Falls back to local UTC with a warning if the `TIME` call fails, so a
/// transient Redis hiccup degrades alignment rather than stalling workers.
pub async fn redis_now_ms(conn: &mut ConnectionManager) -> i64 {
    let reply: Result<(i64, i64), redis::RedisError> =
        redis::cmd("TIME").query_async(conn).await;
    match reply {
        Ok((secs, micros)) => secs * 1_000 + micros / 1_000,
        Err(err) => {
            tracing::warn!(error = %err, "redis TIME failed, falling back to local clock");
            Utc::now().timestamp_millis()
        }
    }
}

/// The next interval-aligned fire time strictly after `after_ms`.
///
/// All producers derive slot boundaries from this one rule, so they agree on
/// the same boundaries regardless of when each of them looked at the clock.
#[must_use]
pub fn next_aligned(after_ms: i64, interval_secs: i64) -> i64 {
    debug_assert!(interval_secs > 0);
    let period_ms = interval_secs * 1_000;
    ((after_ms / period_ms) + 1) * period_ms
}

/// UTC timestamp for a millisecond epoch offset.
#[must_use]
pub fn utc_from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_time_is_next_multiple_of_period() {
        assert_eq!(next_aligned(0, 60), 60_000);
        assert_eq!(next_aligned(59_999, 60), 60_000);
        assert_eq!(next_aligned(60_001, 60), 120_000);
    }

    #[test]
    fn aligned_time_is_strictly_greater_on_boundary() {
        // A fire exactly on a slot boundary lands in the next slot.
        assert_eq!(next_aligned(120_000, 60), 180_000);
        assert_eq!(next_aligned(30_000, 30), 60_000);
    }

    #[test]
    fn alignment_is_idempotent_across_producers() {
        // Two producers observing different instants inside the same slot
        // still compute the same next boundary.
        let interval = 30;
        assert_eq!(
            next_aligned(90_100, interval),
            next_aligned(119_900, interval)
        );
    }

    #[test]
    fn utc_conversion_roundtrips() {
        let ms = 1_767_225_600_000; // 2026-01-01T00:00:00Z
        assert_eq!(utc_from_ms(ms).timestamp_millis(), ms);
    }
}
