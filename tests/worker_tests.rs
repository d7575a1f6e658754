//! Worker runtime behaviour: heartbeats, liveness filtering, graceful
//! shutdown, and at-least-once delivery.

mod common;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use flowline::models::TaskRunStatus;
use flowline::repository::{TaskRunRepository, WorkerRepository, WorkflowRunRepository};
use flowline::worker::MockHandler;

use common::*;

#[tokio::test]
async fn heartbeat_keeps_the_worker_listed_active() {
    let env = TestEnv::new();

    let worker = env.worker(Arc::new(MockHandler));
    let worker_id = worker.id();
    let worker_cancel = env.cancel.clone();
    let handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    // Within two heartbeat intervals the row's heartbeat is fresh.
    let beating = eventually(Duration::from_millis(500), || async {
        env.workers
            .get_by_id(&env.cancel, worker_id)
            .await
            .map(|w| {
                Utc::now().signed_duration_since(w.last_heartbeat)
                    <= chrono::Duration::milliseconds(100)
            })
            .unwrap_or(false)
    })
    .await;
    assert!(beating, "heartbeat never advanced");

    let listed = env.service.list_workers(&env.cancel).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].hostname, "test-worker");

    env.cancel.cancel();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn stale_worker_disappears_from_listing() {
    let env = TestEnv::new();

    // Register a worker whose heartbeat loop has "died": the row exists with
    // status active but its heartbeat never advances.
    let mut record = flowline::models::Worker::new("zombie");
    record.last_heartbeat = Utc::now();
    env.workers.create(&env.cancel, &record).await.unwrap();

    assert_eq!(env.service.list_workers(&env.cancel).await.unwrap().len(), 1);

    // After the liveness window passes without a heartbeat, the read-time
    // filter excludes it.
    tokio::time::sleep(TEST_LIVENESS_TIMEOUT + Duration::from_millis(100)).await;
    assert!(env.service.list_workers(&env.cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn graceful_shutdown_leaves_no_running_rows() {
    let env = TestEnv::new();
    let _progress = env.spawn_progress_loop();

    let tasks = (0..100).map(|i| task_input(&format!("t{i}"), &[])).collect();
    let wf = env
        .service
        .create_workflow(&env.cancel, workflow_input("bulk", tasks))
        .await
        .unwrap();

    let worker = env.worker(Arc::new(SlowHandler {
        delay: Duration::from_millis(100),
    }));
    let worker_cancel = env.cancel.clone();
    let handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    env.service.trigger_workflow(&env.cancel, wf.id).await.unwrap();

    // Let a few tasks start, then pull the plug mid-flight.
    tokio::time::sleep(Duration::from_millis(250)).await;
    env.cancel.cancel();

    // The worker loop exits cleanly.
    let result = handle.await.unwrap();
    assert!(result.is_ok());

    // Whatever ran reached a terminal state; nothing is left `running`.
    let detached = tokio_util::sync::CancellationToken::new();
    let all = env
        .task_runs
        .list_by_status(&detached, TaskRunStatus::Running)
        .await
        .unwrap();
    assert!(all.is_empty(), "orphan running rows after shutdown");
}

#[tokio::test]
async fn every_submitted_task_is_dequeued_at_least_once() {
    let env = TestEnv::new();
    let _progress = env.spawn_progress_loop();

    let n = 25;
    let tasks = (0..n).map(|i| task_input(&format!("t{i}"), &[])).collect();
    let wf = env
        .service
        .create_workflow(&env.cancel, workflow_input("fanout", tasks))
        .await
        .unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let worker = env.worker(handler.clone());
    let worker_cancel = env.cancel.clone();
    tokio::spawn(async move { worker.run(worker_cancel).await });

    let run = env.service.trigger_workflow(&env.cancel, wf.id).await.unwrap();

    let drained = eventually(Duration::from_secs(3), || async {
        env.workflow_runs
            .get_by_id(&env.cancel, run.id)
            .await
            .map(|r| r.is_terminal())
            .unwrap_or(false)
    })
    .await;
    assert!(drained);
    assert_eq!(handler.names().len(), n);

    env.cancel.cancel();
}

#[tokio::test]
async fn worker_skips_task_runs_cancelled_while_queued() {
    let env = TestEnv::new();

    let wf = env
        .service
        .create_workflow(
            &env.cancel,
            workflow_input("cancelme", vec![task_input("only", &[])]),
        )
        .await
        .unwrap();
    let run = env.service.trigger_workflow(&env.cancel, wf.id).await.unwrap();

    // The task sits queued; cancel it before any worker starts.
    let queued = env
        .task_runs
        .list_by_workflow_run(&env.cancel, run.id)
        .await
        .unwrap();
    env.scheduler.cancel(&env.cancel, queued[0].id).await.unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let worker = env.worker(handler.clone());
    let worker_cancel = env.cancel.clone();
    let handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    // Give the worker time to drain the queue entry, then stop it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    env.cancel.cancel();
    handle.await.unwrap().unwrap();

    // The handler never ran and the run stayed failed (terminal states are
    // never re-entered).
    assert!(handler.names().is_empty());
    let detached = tokio_util::sync::CancellationToken::new();
    let got = env.task_runs.get_by_id(&detached, queued[0].id).await.unwrap();
    assert_eq!(got.status, TaskRunStatus::Failed);
}

#[tokio::test]
async fn heartbeat_metric_advances() {
    let env = TestEnv::new();

    let worker = env.worker(Arc::new(MockHandler));
    let worker_cancel = env.cancel.clone();
    let handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    let counted = eventually(Duration::from_millis(500), || async {
        env.metrics
            .render()
            .map(|text| text.contains("scheduler_worker_heartbeats_total{worker_id=\"test-worker\"}"))
            .unwrap_or(false)
    })
    .await;
    assert!(counted, "heartbeat counter never appeared");

    env.cancel.cancel();
    assert!(handle.await.unwrap().is_ok());

    // Graceful shutdown flips the registration to inactive.
    let detached = tokio_util::sync::CancellationToken::new();
    let active = env.workers.list_active(&detached).await.unwrap();
    assert!(active.is_empty());
}
