//! One-shot maintenance run: a fixed list of tasks executed in order.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use storage::Storage;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceTask {
    StartupCheck,
    Cleanup { retention_days: i64 },
}

impl MaintenanceTask {
    pub fn name(&self) -> &'static str {
        match self {
            MaintenanceTask::StartupCheck => "startup-check",
            MaintenanceTask::Cleanup { .. } => "cleanup",
        }
    }

    async fn run(&self, storage: &Storage, now: DateTime<Utc>) -> Result<String> {
        match *self {
            MaintenanceTask::StartupCheck => {
                storage.health_check().await?;
                let counts = storage.count_returns_by_status().await?;
                for count in &counts {
                    info!(status = %count.status, count = count.count, "returns by status");
                }
                let total: i64 = counts.iter().map(|c| c.count).sum();
                Ok(format!("storage reachable, {total} returns on file"))
            }
            MaintenanceTask::Cleanup { retention_days } => {
                let cutoff = Duration::try_days(retention_days.max(0))
                    .and_then(|retention| now.checked_sub_signed(retention))
                    .ok_or_else(|| anyhow!("retention of {retention_days} days is out of range"))?;
                let pruned = storage.prune_notifications_before(cutoff).await?;
                Ok(format!("pruned {pruned} notifications older than {cutoff}"))
            }
        }
    }
}

pub fn default_tasks(retention_days: i64) -> Vec<MaintenanceTask> {
    vec![
        MaintenanceTask::StartupCheck,
        MaintenanceTask::Cleanup { retention_days },
    ]
}

#[derive(Debug)]
pub struct TaskReport {
    pub name: &'static str,
    pub outcome: Result<String, String>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Runs every task once, in order. A failing task does not stop the ones
/// after it.
pub async fn run_once(
    storage: &Storage,
    tasks: &[MaintenanceTask],
    now: DateTime<Utc>,
) -> Vec<TaskReport> {
    let mut reports = Vec::with_capacity(tasks.len());
    for task in tasks {
        let name = task.name();
        let outcome = match task.run(storage, now).await {
            Ok(summary) => {
                info!(task = name, %summary, "maintenance task finished");
                Ok(summary)
            }
            Err(err) => {
                error!(task = name, error = %err, "maintenance task failed");
                Err(format!("{err:#}"))
            }
        };
        reports.push(TaskReport { name, outcome });
    }
    reports
}

#[cfg(test)]
#[path = "tests/daemon_tests.rs"]
mod tests;
