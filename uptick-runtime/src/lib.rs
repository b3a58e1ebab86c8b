//! Runtime for the uptick monitor scheduler.
//!
//! A producer process turns the monitor database into an
//! at-most-one-per-interval stream of health-check tasks on the downstream
//! work queue, coordinating with its peers exclusively through Redis:
//!
//! - [`schedule`] holds the distributed schedule (two sorted sets, mutated
//!   only by atomic server-side scripts),
//! - [`coordination`] elects the single node allowed to run [`sync`],
//! - claim workers and the lease reclaimer run on every producer,
//! - [`dispatch`] builds the task payload and enqueues it with duplicate
//!   suppression,
//! - [`producer`] owns the lifecycle of all of the above.

pub mod config;
pub use config::Config;

pub mod coordination;
pub use coordination::{node_id, ElectionConfig, LeaderElector, LeaderElectorHandle, LeaderState};

pub mod dispatch;
pub use dispatch::Dispatcher;

pub mod producer;
pub use producer::{Producer, ProducerConfig, ProducerHandle};

pub mod queue;
pub use queue::RedisTaskQueue;

mod reclaim;

pub mod schedule;
pub use schedule::ScheduleStore;

mod scripts;

pub mod sync;
pub use sync::SyncEngine;

pub mod time;

mod worker;
