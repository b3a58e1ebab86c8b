//! Shared types and collaborator interfaces for the uptick scheduler.
//!
//! This crate is deliberately free of I/O: it defines the monitor data model,
//! the hand-off payload deposited on the downstream work queue, and the traits
//! through which the runtime consumes its external collaborators (monitor,
//! proxy and maintenance repositories, the lifecycle event bus, and the work
//! queue itself). In-memory implementations of every collaborator live here
//! too, for tests and local bring-up.

pub mod events;
pub use events::{EventBus, EventPayload, MonitorEvent};

pub mod maintenance;
pub use maintenance::MaintenanceWindow;

pub mod monitor;
pub use monitor::{Monitor, MonitorKind, RetryPolicy};

pub mod proxy;
pub use proxy::Proxy;

pub mod queue;
pub use queue::{EnqueueOutcome, TaskQueue};

pub mod repository;
pub use repository::{MaintenanceService, MonitorRepository, ProxyRepository};

pub mod task;
pub use task::{EnqueueOptions, HealthCheckTask};
