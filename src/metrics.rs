//! Prometheus metrics for the scheduler system.
//!
//! All collectors are registered against an explicit [`Registry`] owned by
//! the [`Collector`] handle; components receive the handle at construction
//! so tests never share hidden global state.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::error::{Error, Result};

/// Groups every Prometheus metric exposed by the scheduler system.
pub struct Collector {
    registry: Registry,
    /// Workflow runs observed, labelled by status.
    pub workflows_total: IntCounterVec,
    /// Task runs processed, labelled by terminal status.
    pub tasks_total: IntCounterVec,
    /// Task execution duration histogram, labelled by terminal status.
    pub task_duration_seconds: HistogramVec,
    pub workflow_failures_total: IntCounter,
    pub workflow_successes_total: IntCounter,
    /// Heartbeat ticks, labelled by worker id.
    pub worker_heartbeats_total: IntCounterVec,
    /// Retry attempts, labelled by worker id.
    pub task_retries_total: IntCounterVec,
}

impl Collector {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let workflows_total = IntCounterVec::new(
            Opts::new(
                "scheduler_workflows_total",
                "Total number of workflow runs triggered.",
            ),
            &["status"],
        )
        .map_err(|e| Error::Backend(e.to_string()))?;

        let tasks_total = IntCounterVec::new(
            Opts::new(
                "scheduler_tasks_total",
                "Total number of task runs processed.",
            ),
            &["status"],
        )
        .map_err(|e| Error::Backend(e.to_string()))?;

        let task_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "scheduler_task_duration_seconds",
                "Histogram of task execution durations in seconds.",
            ),
            &["status"],
        )
        .map_err(|e| Error::Backend(e.to_string()))?;

        let workflow_failures_total = IntCounter::new(
            "scheduler_workflow_failures_total",
            "Total number of workflow run failures.",
        )
        .map_err(|e| Error::Backend(e.to_string()))?;

        let workflow_successes_total = IntCounter::new(
            "scheduler_workflow_successes_total",
            "Total number of workflow run successes.",
        )
        .map_err(|e| Error::Backend(e.to_string()))?;

        let worker_heartbeats_total = IntCounterVec::new(
            Opts::new(
                "scheduler_worker_heartbeats_total",
                "Total number of worker heartbeat ticks.",
            ),
            &["worker_id"],
        )
        .map_err(|e| Error::Backend(e.to_string()))?;

        let task_retries_total = IntCounterVec::new(
            Opts::new(
                "scheduler_task_retries_total",
                "Total number of task retry attempts.",
            ),
            &["worker_id"],
        )
        .map_err(|e| Error::Backend(e.to_string()))?;

        for collector in [
            Box::new(workflows_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(tasks_total.clone()),
            Box::new(task_duration_seconds.clone()),
            Box::new(workflow_failures_total.clone()),
            Box::new(workflow_successes_total.clone()),
            Box::new(worker_heartbeats_total.clone()),
            Box::new(task_retries_total.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| Error::Backend(e.to_string()))?;
        }

        Ok(Self {
            registry,
            workflows_total,
            tasks_total,
            task_duration_seconds,
            workflow_failures_total,
            workflow_successes_total,
            worker_heartbeats_total,
            task_retries_total,
        })
    }

    /// Render all registered metrics in the Prometheus text exposition
    /// format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .map_err(|e| Error::Backend(e.to_string()))
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new().expect("failed to build metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_appear_in_text_exposition() {
        let collector = Collector::default();
        collector.tasks_total.with_label_values(&["success"]).inc();
        collector
            .worker_heartbeats_total
            .with_label_values(&["worker-1"])
            .inc_by(3);
        collector.workflow_successes_total.inc();

        let text = collector.render().unwrap();
        assert!(text.contains("scheduler_tasks_total{status=\"success\"} 1"));
        assert!(text.contains("scheduler_worker_heartbeats_total{worker_id=\"worker-1\"} 3"));
        assert!(text.contains("scheduler_workflow_successes_total 1"));
    }

    #[test]
    fn duration_histogram_observes() {
        let collector = Collector::default();
        collector
            .task_duration_seconds
            .with_label_values(&["failed"])
            .observe(0.25);
        let text = collector.render().unwrap();
        assert!(text.contains("scheduler_task_duration_seconds_count{status=\"failed\"} 1"));
    }
}
