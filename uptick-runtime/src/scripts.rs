//! Server-side Lua scripts.
//!
//! Redis executes scripts single-threaded, which makes `claim` the sole
//! mutual-exclusion primitive between producers; none of the schedule
//! mutations ever needs an in-process lock.

use redis::Script;

/// The three schedule-mutation scripts, compiled once per store.
#[derive(Clone)]
pub(crate) struct ScheduleScripts {
    pub(crate) claim: Script,
    pub(crate) reschedule: Script,
    pub(crate) reclaim: Script,
}

impl Default for ScheduleScripts {
    fn default() -> Self {
        Self {
            claim: Script::new(include_str!("../lua/claim.lua")),
            reschedule: Script::new(include_str!("../lua/reschedule.lua")),
            reclaim: Script::new(include_str!("../lua/reclaim.lua")),
        }
    }
}

/// Owner-checked delete of the leader key.
pub(crate) fn release_leader() -> Script {
    Script::new(include_str!("../lua/release_leader.lua"))
}

/// Unique-key guarded task push.
pub(crate) fn enqueue_unique() -> Script {
    Script::new(include_str!("../lua/enqueue_unique.lua"))
}
