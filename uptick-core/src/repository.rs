//! Repository interfaces the scheduler consumes, plus in-memory doubles.
//!
//! The production repositories (SQL-backed, owned by the wider service) are
//! external collaborators; the runtime only ever sees these traits. The
//! in-memory implementations back the test suites and the e2e boot binary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;

use crate::maintenance::MaintenanceWindow;
use crate::monitor::Monitor;
use crate::proxy::Proxy;

/// Errors surfaced by repository lookups.
#[derive(Debug, Error)]
pub enum Error {
    /// The backing store failed or was unreachable.
    #[error("repository backend error: {0}")]
    Backend(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Read access to the authoritative monitor database.
///
/// The core must tolerate monitor records disappearing between schedule and
/// process; `find_by_id` returning `None` is a normal outcome.
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Monitor>>;

    /// One page of active monitors. Pages are 1-based; an empty page marks
    /// the end of the listing.
    async fn find_active_paginated(&self, page: u64, page_size: u64) -> Result<Vec<Monitor>>;
}

/// Read access to proxy records. Lookup failures are non-fatal to callers.
#[async_trait]
pub trait ProxyRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Proxy>>;
}

/// Maintenance windows attached to a monitor.
#[async_trait]
pub trait MaintenanceService: Send + Sync {
    async fn maintenances_by_monitor_id(&self, monitor_id: &str) -> Result<Vec<MaintenanceWindow>>;

    /// Whether any of the monitor's windows is active at `now`.
    async fn is_under_maintenance(&self, monitor_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let windows = self.maintenances_by_monitor_id(monitor_id).await?;
        Ok(windows.iter().any(|w| w.is_active_at(now)))
    }
}

/// In-memory monitor store with stable id-ordered pagination.
#[derive(Default)]
pub struct MemoryMonitorRepository {
    monitors: RwLock<HashMap<String, Monitor>>,
    list_calls: AtomicUsize,
}

impl MemoryMonitorRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, monitor: Monitor) {
        self.monitors.write().insert(monitor.id.clone(), monitor);
    }

    pub fn remove(&self, id: &str) {
        self.monitors.write().remove(id);
    }

    /// Flip the active flag in place; no-op for unknown ids.
    pub fn set_active(&self, id: &str, active: bool) {
        if let Some(m) = self.monitors.write().get_mut(id) {
            m.active = active;
        }
    }

    /// Number of `find_active_paginated` calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MonitorRepository for MemoryMonitorRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Monitor>> {
        Ok(self.monitors.read().get(id).cloned())
    }

    async fn find_active_paginated(&self, page: u64, page_size: u64) -> Result<Vec<Monitor>> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        let mut active: Vec<Monitor> = self
            .monitors
            .read()
            .values()
            .filter(|m| m.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        let start = usize::try_from(page.saturating_sub(1) * page_size).unwrap_or(usize::MAX);
        Ok(active
            .into_iter()
            .skip(start)
            .take(usize::try_from(page_size).unwrap_or(usize::MAX))
            .collect())
    }
}

/// In-memory proxy store.
#[derive(Default)]
pub struct MemoryProxyRepository {
    proxies: RwLock<HashMap<String, Proxy>>,
}

impl MemoryProxyRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, proxy: Proxy) {
        self.proxies.write().insert(proxy.id.clone(), proxy);
    }
}

#[async_trait]
impl ProxyRepository for MemoryProxyRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Proxy>> {
        Ok(self.proxies.read().get(id).cloned())
    }
}

/// In-memory maintenance store keyed by monitor id.
#[derive(Default)]
pub struct MemoryMaintenanceService {
    windows: RwLock<HashMap<String, Vec<MaintenanceWindow>>>,
}

impl MemoryMaintenanceService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, monitor_id: &str, window: MaintenanceWindow) {
        self.windows
            .write()
            .entry(monitor_id.to_string())
            .or_default()
            .push(window);
    }
}

#[async_trait]
impl MaintenanceService for MemoryMaintenanceService {
    async fn maintenances_by_monitor_id(&self, monitor_id: &str) -> Result<Vec<MaintenanceWindow>> {
        Ok(self
            .windows
            .read()
            .get(monitor_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{MonitorKind, RetryPolicy};
    use chrono::TimeZone;

    fn monitor(id: &str, active: bool) -> Monitor {
        Monitor {
            id: id.into(),
            name: id.into(),
            kind: MonitorKind::Ping,
            interval_secs: 30,
            timeout_secs: 5,
            proxy_id: None,
            config: serde_json::Value::Null,
            active,
            retry: RetryPolicy::default(),
        }
    }

    #[tokio::test]
    async fn pagination_walks_active_monitors_in_id_order() {
        let repo = MemoryMonitorRepository::new();
        for i in 0..5 {
            repo.upsert(monitor(&format!("m{i}"), true));
        }
        repo.upsert(monitor("zz-inactive", false));

        let page1 = repo.find_active_paginated(1, 2).await.unwrap();
        let page2 = repo.find_active_paginated(2, 2).await.unwrap();
        let page3 = repo.find_active_paginated(3, 2).await.unwrap();
        let page4 = repo.find_active_paginated(4, 2).await.unwrap();

        let ids: Vec<_> = page1
            .iter()
            .chain(&page2)
            .chain(&page3)
            .map(|m| m.id.clone())
            .collect();
        assert_eq!(ids, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert!(page4.is_empty());
        assert_eq!(repo.list_calls(), 4);
    }

    #[tokio::test]
    async fn maintenance_predicate_checks_all_windows() {
        let svc = MemoryMaintenanceService::new();
        let noon = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        svc.attach("m1", MaintenanceWindow {
            id: "w1".into(),
            title: "past".into(),
            enabled: true,
            starts_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        });
        assert!(!svc.is_under_maintenance("m1", noon).await.unwrap());

        svc.attach("m1", MaintenanceWindow {
            id: "w2".into(),
            title: "live".into(),
            enabled: true,
            starts_at: Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap(),
        });
        assert!(svc.is_under_maintenance("m1", noon).await.unwrap());
        assert!(!svc.is_under_maintenance("m2", noon).await.unwrap());
    }
}
