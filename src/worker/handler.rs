//! Pluggable task execution.
//!
//! The handler is the "how" of running a task: the worker owns status
//! transitions and retries, the handler only turns a command into success
//! or failure. Handlers are assumed trusted; nothing here sandboxes the
//! command.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::models::Task;

/// Executes a task's command. Returns captured output on success; the
/// worker appends it to the task run's logs. A well-behaved handler watches
/// `cancel` (which carries the per-task timeout) and returns promptly once
/// it fires.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, cancel: &CancellationToken, task: &Task) -> anyhow::Result<String>;
}

/// Handler that simulates execution: logs the command and always succeeds.
/// The default during development and in unit tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockHandler;

#[async_trait]
impl TaskHandler for MockHandler {
    async fn execute(&self, _cancel: &CancellationToken, task: &Task) -> anyhow::Result<String> {
        info!(task_id = %task.id, command = %task.command, "mock-exec");
        Ok(format!("mock-exec: {}", task.command))
    }
}

/// Handler that runs the command through `sh -c` and captures its output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellHandler;

#[async_trait]
impl TaskHandler for ShellHandler {
    async fn execute(&self, cancel: &CancellationToken, task: &Task) -> anyhow::Result<String> {
        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg(&task.command).kill_on_drop(true);

        let output = tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("command cancelled"),
            output = command.output() => output?,
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
        }

        if output.status.success() {
            Ok(combined)
        } else {
            anyhow::bail!("command exited with {}: {}", output.status, combined.trim_end())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn mock_handler_echoes_the_command() {
        let task = Task::new(Uuid::new_v4(), "extract", "echo hi");
        let out = MockHandler
            .execute(&CancellationToken::new(), &task)
            .await
            .unwrap();
        assert_eq!(out, "mock-exec: echo hi");
    }

    #[tokio::test]
    async fn shell_handler_captures_stdout() {
        let task = Task::new(Uuid::new_v4(), "hello", "echo hello");
        let out = ShellHandler
            .execute(&CancellationToken::new(), &task)
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn shell_handler_fails_on_nonzero_exit() {
        let task = Task::new(Uuid::new_v4(), "boom", "exit 3");
        let err = ShellHandler
            .execute(&CancellationToken::new(), &task)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[tokio::test]
    async fn shell_handler_honours_cancellation() {
        let task = Task::new(Uuid::new_v4(), "slow", "sleep 30");
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });
        let err = ShellHandler.execute(&cancel, &task).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
