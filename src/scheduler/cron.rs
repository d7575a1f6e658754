//! Cron trigger loop.
//!
//! Standard 5-field Unix cron expressions (minute, hour, day-of-month,
//! month, day-of-week) are normalized to the 6-field format the `cron`
//! crate expects. Each active workflow with a schedule gets its own tick
//! task; a rescan loop picks up workflows created, rescheduled, or
//! deactivated after startup.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::Scheduler;
use crate::error::{Error, Result};

const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Convert a 5-field Unix cron expression to the 6-field format (with a
/// leading seconds field) used by the `cron` crate. Expressions already
/// carrying 6+ fields pass through unchanged.
fn normalize_cron_expr(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Validate a cron expression without computing the next run.
pub fn validate_cron(expr: &str) -> Result<()> {
    Schedule::from_str(&normalize_cron_expr(expr))
        .map(|_| ())
        .map_err(|e| Error::invalid(format!("invalid cron expression '{expr}': {e}")))
}

/// Next occurrence of `expr` after the current time (UTC).
pub fn next_cron_run(expr: &str) -> Result<DateTime<Utc>> {
    let schedule = Schedule::from_str(&normalize_cron_expr(expr))
        .map_err(|e| Error::invalid(format!("invalid cron expression '{expr}': {e}")))?;
    schedule
        .upcoming(Utc)
        .next()
        .ok_or_else(|| Error::invalid(format!("cron expression '{expr}' has no upcoming run")))
}

/// Drives scheduled workflow runs. One trigger instance must be running per
/// deployment; duplicate instances produce duplicate runs at boundary
/// seconds.
pub struct CronTrigger {
    scheduler: Arc<Scheduler>,
    rescan_interval: Duration,
}

impl CronTrigger {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            rescan_interval: DEFAULT_RESCAN_INTERVAL,
        }
    }

    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = interval;
        self
    }

    /// Run until `cancel` fires. Scheduling stops immediately on
    /// cancellation but in-flight ticks complete.
    pub async fn run(&self, cancel: CancellationToken) {
        // workflow id -> (schedule it was registered with, its tick token)
        let mut registered: HashMap<Uuid, (String, CancellationToken)> = HashMap::new();

        loop {
            match self.scheduler.workflows().list_active(&cancel).await {
                Ok(active) => {
                    self.sync_tick_tasks(&cancel, &mut registered, active).await;
                }
                Err(Error::Cancelled) => break,
                Err(err) => {
                    // Transient backend failure; retry on the next rescan.
                    warn!(error = %err, "cron trigger failed to list active workflows");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.rescan_interval) => {}
            }
        }

        for (_, (_, token)) in registered {
            token.cancel();
        }
        info!("cron trigger stopped");
    }

    async fn sync_tick_tasks(
        &self,
        cancel: &CancellationToken,
        registered: &mut HashMap<Uuid, (String, CancellationToken)>,
        active: Vec<crate::models::Workflow>,
    ) {
        let mut seen: HashMap<Uuid, String> = HashMap::new();
        for wf in active {
            if wf.schedule_cron.is_empty() {
                continue;
            }
            seen.insert(wf.id, wf.schedule_cron.clone());

            let needs_spawn = match registered.get(&wf.id) {
                Some((schedule, _)) if *schedule == wf.schedule_cron => false,
                Some((_, token)) => {
                    // Schedule changed; retire the old tick task.
                    token.cancel();
                    true
                }
                None => true,
            };
            if !needs_spawn {
                continue;
            }

            if let Err(err) = validate_cron(&wf.schedule_cron) {
                warn!(workflow_id = %wf.id, error = %err, "skipping workflow with invalid schedule");
                continue;
            }

            let token = cancel.child_token();
            registered.insert(wf.id, (wf.schedule_cron.clone(), token.clone()));
            let scheduler = Arc::clone(&self.scheduler);
            let schedule = wf.schedule_cron.clone();
            let workflow_id = wf.id;
            info!(workflow_id = %workflow_id, schedule = %schedule, "registering cron tick");
            tokio::spawn(async move {
                tick_loop(scheduler, workflow_id, schedule, token).await;
            });
        }

        // Retire ticks for workflows that were deactivated or deleted.
        registered.retain(|id, (_, token)| {
            if seen.contains_key(id) {
                true
            } else {
                debug!(workflow_id = %id, "retiring cron tick");
                token.cancel();
                false
            }
        });
    }
}

async fn tick_loop(
    scheduler: Arc<Scheduler>,
    workflow_id: Uuid,
    schedule: String,
    cancel: CancellationToken,
) {
    loop {
        let next = match next_cron_run(&schedule) {
            Ok(next) => next,
            Err(err) => {
                error!(workflow_id = %workflow_id, error = %err, "cron tick cannot compute next run");
                return;
            }
        };
        let wait = (next - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        debug!(workflow_id = %workflow_id, "cron tick firing");
        match scheduler.trigger_run(&cancel, workflow_id).await {
            Ok(run) => {
                info!(workflow_id = %workflow_id, workflow_run_id = %run.id, "scheduled run created");
            }
            Err(Error::Cancelled) => return,
            Err(Error::NotFound(_)) => {
                // Workflow deleted between rescans; the rescan loop will
                // retire this tick shortly.
                return;
            }
            Err(err) => {
                error!(workflow_id = %workflow_id, error = %err, "scheduled run failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_expressions_gain_a_seconds_field() {
        assert_eq!(normalize_cron_expr("* * * * *"), "0 * * * * *");
        assert_eq!(normalize_cron_expr("0 2 * * *"), "0 0 2 * * *");
        assert_eq!(normalize_cron_expr("0 0 * * * *"), "0 0 * * * *");
    }

    #[test]
    fn standard_expressions_validate() {
        assert!(validate_cron("0 2 * * *").is_ok());
        assert!(validate_cron("*/5 * * * *").is_ok());
        assert!(validate_cron("0 0 * * * *").is_ok());
        assert!(validate_cron("not a cron").is_err());
        assert!(validate_cron("").is_err());
    }

    #[test]
    fn next_run_is_in_the_future() {
        let next = next_cron_run("* * * * *").unwrap();
        assert!(next > Utc::now());
    }
}
