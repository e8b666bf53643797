use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use cleaner_common::crd::CronExecutionCleanerStatus;
use cleaner_common::execution::Execution;
use tracing::{info, warn};

use crate::client::{ClientError, ExecutionClient};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Stuck,
    ExcessSucceeded,
    ExcessFailed,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Stuck => "stuck",
            Category::ExcessSucceeded => "excess_succeeded",
            Category::ExcessFailed => "excess_failed",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct DeleteFailure {
    pub execution: String,
    pub error: ClientError,
}

#[derive(Debug)]
pub struct CategoryOutcome {
    pub category: Category,
    pub deleted: u64,
    pub failures: Vec<DeleteFailure>,
}

impl CategoryOutcome {
    pub fn empty(category: Category) -> Self {
        Self {
            category,
            deleted: 0,
            failures: Vec::new(),
        }
    }
}

/// Issues deletions for one cycle, never touching the same Job twice.
pub struct Deleter<'a, C: ?Sized> {
    client: &'a C,
    seen: HashSet<(String, String)>,
}

impl<'a, C: ExecutionClient + ?Sized> Deleter<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            seen: HashSet::new(),
        }
    }

    /// Delete each execution in turn, carrying on past failures.
    ///
    /// A Job that is already gone counts neither as deleted nor as a failure.
    pub async fn delete_all(&mut self, executions: &[Execution], category: Category) -> CategoryOutcome {
        let mut outcome = CategoryOutcome::empty(category);

        for execution in executions {
            let key = (execution.namespace.clone(), execution.name.clone());
            if !self.seen.insert(key) {
                continue;
            }

            info!(job = %execution.name, %category, "deleting job");

            match self.client.delete_execution(execution).await {
                Ok(()) => {
                    outcome.deleted += 1;
                    metrics::counter!("cleaner_executions_deleted_total", "category" => category.as_str())
                        .increment(1);
                }
                Err(ClientError::NotFound) => {
                    info!(job = %execution.name, %category, "job already deleted");
                }
                Err(error) => {
                    warn!(job = %execution.name, %category, error = %error, "failed to delete job");
                    metrics::counter!("cleaner_delete_failures_total", "category" => category.as_str())
                        .increment(1);
                    outcome.failures.push(DeleteFailure {
                        execution: execution.name.clone(),
                        error,
                    });
                }
            }
        }

        outcome
    }
}

/// Outcome of one cycle across all categories.
#[derive(Debug)]
pub struct CleanupResult {
    pub stuck: CategoryOutcome,
    pub excess_succeeded: CategoryOutcome,
    pub excess_failed: CategoryOutcome,
}

impl CleanupResult {
    pub fn aggregate(
        stuck: CategoryOutcome,
        excess_succeeded: CategoryOutcome,
        excess_failed: CategoryOutcome,
    ) -> Self {
        Self {
            stuck,
            excess_succeeded,
            excess_failed,
        }
    }

    pub fn total_deleted(&self) -> u64 {
        self.stuck.deleted + self.excess_succeeded.deleted + self.excess_failed.deleted
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeleteFailure> {
        self.stuck
            .failures
            .iter()
            .chain(&self.excess_succeeded.failures)
            .chain(&self.excess_failed.failures)
    }

    /// Fold this cycle into the cumulative counters.
    ///
    /// A cycle that deleted nothing leaves the status untouched.
    pub fn apply_to_status(&self, status: &mut CronExecutionCleanerStatus, now: DateTime<Utc>) {
        let total = self.total_deleted();
        if total == 0 {
            return;
        }

        status.last_run_time = Some(now);
        status.jobs_deleted = status.jobs_deleted.saturating_add(total);
        status.pods_deleted = status.pods_deleted.saturating_add(total);
    }
}
