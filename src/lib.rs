//! flowline: a lightweight distributed task scheduler.
//!
//! Workflows are named, cron-schedulable DAGs of commands. The scheduler
//! instantiates workflow runs, expands them into task runs in dependency
//! order, and hands them to workers through an ordered in-memory queue;
//! workers execute each task with retry and backoff while heartbeating, and
//! every status change fans out to WebSocket subscribers through the event
//! hub.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod web;
pub mod worker;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{Event, EventHub, EventType};
pub use queue::{QueuedTask, TaskQueue};
pub use scheduler::{CronTrigger, Scheduler, TaskRunCompletion};
pub use service::Service;
pub use worker::Worker;
