//! Distributed monitor scheduling over Redis.
//!
//! An uptick producer turns a database of periodically-checked monitors
//! (HTTP, TCP, ping, DNS, ...) into an at-most-one-per-interval stream of
//! health-check tasks on a shared work queue. Any number of interchangeable
//! producers share one Redis-backed schedule; atomic claim/lease/reschedule
//! scripts guarantee that a monitor fires at most once per tick even across
//! crashes, and a leader-elected sync engine keeps the schedule consistent
//! with the monitor database.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use uptick::producer::{Collaborators, Producer, ProducerConfig};
//! use uptick::repository::{
//!     MemoryMaintenanceService, MemoryMonitorRepository, MemoryProxyRepository,
//! };
//! use uptick::events::MemoryEventBus;
//! use uptick::runtime::{node_id, RedisTaskQueue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = uptick::runtime::Config::from_env()?;
//!     let client = redis::Client::open(config.redis.url())?;
//!     let conn = client.get_connection_manager().await?;
//!
//!     let producer = Producer::new(
//!         conn.clone(),
//!         Collaborators {
//!             monitors: Arc::new(MemoryMonitorRepository::new()),
//!             proxies: Arc::new(MemoryProxyRepository::new()),
//!             maintenance: Arc::new(MemoryMaintenanceService::new()),
//!             queue: Arc::new(RedisTaskQueue::new(conn)),
//!             bus: Arc::new(MemoryEventBus::new()),
//!         },
//!         ProducerConfig::for_node(node_id()),
//!     )?;
//!
//!     let handle = producer.spawn().await?;
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]

pub use uptick_core::{
    events, maintenance, monitor, proxy, queue, repository, task, HealthCheckTask, Monitor,
    MonitorKind,
};

pub use uptick_runtime::{coordination, dispatch, producer, schedule, sync};

/// Runtime entry points re-exported in one place.
pub mod runtime {
    pub use uptick_runtime::{
        node_id, Config, Dispatcher, ElectionConfig, LeaderElector, LeaderElectorHandle,
        LeaderState, Producer, ProducerConfig, ProducerHandle, RedisTaskQueue, ScheduleStore,
        SyncEngine,
    };
}
