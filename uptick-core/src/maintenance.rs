//! Maintenance windows suppressing alerting for otherwise-due monitors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A maintenance window attached to one or more monitors.
///
/// A monitor under an active window is still checked on schedule, but its
/// task is enqueued in maintenance-suppressed form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub id: String,
    pub title: String,
    /// Windows can be staged ahead of time and toggled off without deletion.
    pub enabled: bool,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl MaintenanceWindow {
    /// Whether the window suppresses checks at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.starts_at <= now && now < self.ends_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(enabled: bool, start_h: u32, end_h: u32) -> MaintenanceWindow {
        MaintenanceWindow {
            id: "w1".into(),
            title: "db upgrade".into(),
            enabled,
            starts_at: Utc.with_ymd_and_hms(2026, 3, 1, start_h, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2026, 3, 1, end_h, 0, 0).unwrap(),
        }
    }

    #[test]
    fn active_only_inside_enabled_window() {
        let noon = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert!(window(true, 11, 13).is_active_at(noon));
        assert!(!window(false, 11, 13).is_active_at(noon));
        assert!(!window(true, 13, 14).is_active_at(noon));
        // End bound is exclusive.
        assert!(!window(true, 11, 12).is_active_at(noon));
    }
}
