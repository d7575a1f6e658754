//! Core domain entities for the distributed task scheduler.
//!
//! Relations are navigated through repository lookups: entities store
//! parent references as ids only and never embed child collections, so the
//! object graph stays acyclic even though the data model is bidirectional.

pub mod run;
pub mod states;
pub mod task;
pub mod workflow;
pub mod worker;

pub use run::{TaskRun, WorkflowRun};
pub use states::{RunStatus, TaskRunStatus, WorkerStatus};
pub use task::{Task, TaskDependency};
pub use workflow::Workflow;
pub use worker::Worker;
