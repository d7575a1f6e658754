//! Cron trigger loop behaviour against a live scheduler.

mod common;

use std::time::Duration;

use flowline::repository::{WorkflowRepository, WorkflowRunRepository};
use flowline::CronTrigger;

use common::*;

#[tokio::test]
async fn scheduled_workflow_gets_runs_created() {
    let env = TestEnv::new();

    // Six-field expression: fire every second.
    let mut input = workflow_input("ticker", vec![]);
    input.schedule_cron = "* * * * * *".into();
    let wf = env.service.create_workflow(&env.cancel, input).await.unwrap();

    let trigger = CronTrigger::new(env.scheduler.clone())
        .with_rescan_interval(Duration::from_millis(50));
    let cancel = env.cancel.clone();
    let handle = tokio::spawn(async move { trigger.run(cancel).await });

    let fired = eventually(Duration::from_secs(3), || async {
        env.workflow_runs
            .list_by_workflow(&env.cancel, wf.id)
            .await
            .map(|runs| !runs.is_empty())
            .unwrap_or(false)
    })
    .await;
    assert!(fired, "cron tick never created a run");

    env.cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn deactivated_workflow_stops_getting_runs() {
    let env = TestEnv::new();

    let mut input = workflow_input("flipflop", vec![]);
    input.schedule_cron = "* * * * * *".into();
    let wf = env.service.create_workflow(&env.cancel, input).await.unwrap();

    let trigger = CronTrigger::new(env.scheduler.clone())
        .with_rescan_interval(Duration::from_millis(50));
    let cancel = env.cancel.clone();
    let handle = tokio::spawn(async move { trigger.run(cancel).await });

    let fired = eventually(Duration::from_secs(3), || async {
        env.workflow_runs
            .list_by_workflow(&env.cancel, wf.id)
            .await
            .map(|runs| !runs.is_empty())
            .unwrap_or(false)
    })
    .await;
    assert!(fired);

    // Deactivate; the next rescan retires the tick task.
    let mut updated = env.workflows.get_by_id(&env.cancel, wf.id).await.unwrap();
    updated.is_active = false;
    env.workflows.update(&env.cancel, &updated).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let count_after_retire = env
        .workflow_runs
        .list_by_workflow(&env.cancel, wf.id)
        .await
        .unwrap()
        .len();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let count_later = env
        .workflow_runs
        .list_by_workflow(&env.cancel, wf.id)
        .await
        .unwrap()
        .len();
    assert_eq!(count_after_retire, count_later, "runs kept firing after deactivation");

    env.cancel.cancel();
    handle.await.unwrap();
}
