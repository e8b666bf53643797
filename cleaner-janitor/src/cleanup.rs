use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use cleaner_common::crd::{
    Condition, ConditionStatus, CronExecutionCleaner, CronExecutionCleanerStatus, READY_CONDITION,
};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::client::{CleanerEvent, ClientError, EventKind, ExecutionClient};
use crate::deletion::{Category, CategoryOutcome, CleanupResult, Deleter};
use crate::policy::{self, CleanupPolicy, SpecError};
use crate::selection::{classify, compute_excess, detect_stuck, filter_by_owner};

pub const REASON_CYCLE_COMPLETED: &str = "CycleCompleted";
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";

#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("failed to fetch cleaner: {0}")]
    Fetch(#[source] ClientError),
    #[error("failed to list jobs in namespace {namespace}: {source}")]
    List {
        namespace: String,
        #[source]
        source: ClientError,
    },
    #[error("failed to update cleaner status: {0}")]
    StatusWrite(#[source] ClientError),
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// The cleaner no longer exists.
    Missing,
    InvalidSpec(SpecError),
    Completed(CleanupResult),
}

impl CycleOutcome {
    fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Missing => "missing",
            CycleOutcome::InvalidSpec(_) => "invalid_spec",
            CycleOutcome::Completed(_) => "completed",
        }
    }
}

#[derive(Debug)]
pub struct CycleReport {
    /// When the cleaner wants to run again; `None` means only on change.
    pub requeue_after: Option<Duration>,
    pub outcome: CycleOutcome,
}

/// Runs cleanup cycles for `CronExecutionCleaner` objects.
///
/// Holds no state between cycles: every call starts from what `client` reports.
pub struct Cleaner<C> {
    client: C,
    invalid_spec_backoff: Duration,
}

impl<C: ExecutionClient> Cleaner<C> {
    pub fn new(client: C, invalid_spec_backoff: Duration) -> Self {
        Cleaner {
            client,
            invalid_spec_backoff: invalid_spec_backoff.max(Duration::from_secs(1)),
        }
    }

    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<CycleReport, CleanupError> {
        let start = Instant::now();
        let result = self.reconcile_at(namespace, name, Utc::now()).await;

        let outcome = match &result {
            Ok(report) => {
                match &report.outcome {
                    CycleOutcome::Missing => {}
                    CycleOutcome::InvalidSpec(e) => {
                        info!(namespace, cleaner = name, error = %e, "cleanup cycle skipped")
                    }
                    CycleOutcome::Completed(result) => info!(
                        namespace,
                        cleaner = name,
                        deleted = result.total_deleted(),
                        failures = result.failures().count(),
                        "cleanup cycle completed"
                    ),
                }
                report.outcome.label()
            }
            Err(e) => {
                error!(namespace, cleaner = name, error = %e, "cleanup cycle failed");
                "error"
            }
        };
        metrics::counter!("cleaner_reconcile_total", "outcome" => outcome).increment(1);
        metrics::histogram!("cleaner_reconcile_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        result
    }

    #[instrument(skip_all, fields(namespace = %namespace, cleaner = %name))]
    async fn reconcile_at(
        &self,
        namespace: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, CleanupError> {
        let cleaner = match self
            .client
            .fetch_policy(namespace, name)
            .await
            .map_err(CleanupError::Fetch)?
        {
            Some(cleaner) => cleaner,
            None => {
                info!("cleaner no longer exists");
                return Ok(CycleReport {
                    requeue_after: None,
                    outcome: CycleOutcome::Missing,
                });
            }
        };

        let policy = match policy::validate(&cleaner.spec) {
            Ok(policy) => policy,
            Err(e) => return self.report_invalid(&cleaner, e, now).await,
        };

        info!(
            target_namespace = %policy.namespace,
            cron_job = %policy.cron_job_name,
            retain_successful = policy.retain_successful,
            retain_failed = policy.retain_failed,
            stuck_after = ?policy.stuck_after,
            run_interval = ?policy.run_interval,
            "reconciling cleaner"
        );

        let result = self.clean(&policy, now).await?;

        let mut status = cleaner.status.clone().unwrap_or_default();
        result.apply_to_status(&mut status, now);
        status.set_condition(ready_condition(
            &cleaner,
            ConditionStatus::True,
            REASON_CYCLE_COMPLETED,
            "cleanup cycle completed".to_owned(),
            now,
        ));
        self.write_status(&cleaner, status).await?;

        let total = result.total_deleted();
        if total > 0 {
            self.publish(
                &cleaner,
                CleanerEvent {
                    kind: EventKind::Normal,
                    reason: "JobsDeleted".to_owned(),
                    action: "Cleanup".to_owned(),
                    note: format!(
                        "deleted {total} jobs (stuck={}, succeeded={}, failed={})",
                        result.stuck.deleted,
                        result.excess_succeeded.deleted,
                        result.excess_failed.deleted
                    ),
                },
            )
            .await;
        }

        if let Some(first) = result.failures().next() {
            let failed: Vec<&str> = result.failures().map(|f| f.execution.as_str()).collect();
            self.publish(
                &cleaner,
                CleanerEvent {
                    kind: EventKind::Warning,
                    reason: "DeleteFailed".to_owned(),
                    action: "Cleanup".to_owned(),
                    note: format!(
                        "failed to delete {}: {}",
                        failed.join(", "),
                        first.error
                    ),
                },
            )
            .await;
        }

        Ok(CycleReport {
            requeue_after: Some(policy.run_interval),
            outcome: CycleOutcome::Completed(result),
        })
    }

    /// List, select and delete. Stuck Jobs go first, then excess succeeded, then excess failed.
    async fn clean(&self, policy: &CleanupPolicy, now: DateTime<Utc>) -> Result<CleanupResult, CleanupError> {
        let executions = self
            .client
            .list_executions(&policy.namespace)
            .await
            .map_err(|source| CleanupError::List {
                namespace: policy.namespace.clone(),
                source,
            })?;

        let owned = filter_by_owner(executions, &policy.cron_job_name);
        info!(cron_job = %policy.cron_job_name, count = owned.len(), "found jobs owned by cronjob");

        let classified = classify(owned);
        info!(
            active = classified.active.len(),
            succeeded = classified.succeeded.len(),
            failed = classified.failed.len(),
            "job classification"
        );

        let stuck = match policy.stuck_after {
            Some(threshold) => {
                let stuck = detect_stuck(&classified.active, threshold, now);
                info!(stuck_after = ?threshold, count = stuck.len(), "stuck job detection");
                stuck
            }
            None => Vec::new(),
        };

        let excess_succeeded = compute_excess(&classified.succeeded, policy.retain_successful);
        info!(
            retain = policy.retain_successful,
            total = classified.succeeded.len(),
            excess = excess_succeeded.len(),
            "succeeded job retention evaluation"
        );

        let excess_failed = compute_excess(&classified.failed, policy.retain_failed);
        info!(
            retain = policy.retain_failed,
            total = classified.failed.len(),
            excess = excess_failed.len(),
            "failed job retention evaluation"
        );

        let mut deleter = Deleter::new(&self.client);
        let stuck = if policy.stuck_after.is_some() {
            deleter.delete_all(&stuck, Category::Stuck).await
        } else {
            CategoryOutcome::empty(Category::Stuck)
        };
        let excess_succeeded = deleter
            .delete_all(&excess_succeeded, Category::ExcessSucceeded)
            .await;
        let excess_failed = deleter.delete_all(&excess_failed, Category::ExcessFailed).await;

        let result = CleanupResult::aggregate(stuck, excess_succeeded, excess_failed);
        for outcome in [&result.stuck, &result.excess_succeeded, &result.excess_failed] {
            if !outcome.failures.is_empty() {
                warn!(
                    category = %outcome.category,
                    failures = outcome.failures.len(),
                    deleted = outcome.deleted,
                    "some jobs could not be deleted"
                );
            }
        }

        Ok(result)
    }

    async fn report_invalid(
        &self,
        cleaner: &CronExecutionCleaner,
        spec_error: SpecError,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, CleanupError> {
        warn!(error = %spec_error, "invalid cleaner spec");

        let mut status = cleaner.status.clone().unwrap_or_default();
        status.set_condition(ready_condition(
            cleaner,
            ConditionStatus::False,
            REASON_INVALID_SPEC,
            spec_error.to_string(),
            now,
        ));
        // Only announce the problem when the condition changed, not on every requeue.
        if self.write_status(cleaner, status).await? {
            self.publish(
                cleaner,
                CleanerEvent {
                    kind: EventKind::Warning,
                    reason: REASON_INVALID_SPEC.to_owned(),
                    action: "Validate".to_owned(),
                    note: spec_error.to_string(),
                },
            )
            .await;
        }

        // An invalid runInterval cannot be trusted as the requeue delay.
        let requeue_after = policy::run_interval(&cleaner.spec).unwrap_or(self.invalid_spec_backoff);

        Ok(CycleReport {
            requeue_after: Some(requeue_after),
            outcome: CycleOutcome::InvalidSpec(spec_error),
        })
    }

    /// Write `status` unless it matches what was observed. Returns whether a write happened.
    async fn write_status(
        &self,
        cleaner: &CronExecutionCleaner,
        status: CronExecutionCleanerStatus,
    ) -> Result<bool, CleanupError> {
        if cleaner.status.as_ref() == Some(&status) {
            return Ok(false);
        }

        self.client
            .update_status(cleaner, &status)
            .await
            .map_err(CleanupError::StatusWrite)?;

        info!(jobs_deleted = status.jobs_deleted, "updated cleaner status");
        Ok(true)
    }

    async fn publish(&self, cleaner: &CronExecutionCleaner, event: CleanerEvent) {
        let reason = event.reason.clone();
        if let Err(e) = self.client.publish_event(cleaner, event).await {
            warn!(reason = %reason, error = %e, "failed to publish event");
        }
    }
}

fn ready_condition(
    cleaner: &CronExecutionCleaner,
    status: ConditionStatus,
    reason: &str,
    message: String,
    now: DateTime<Utc>,
) -> Condition {
    Condition {
        type_: READY_CONDITION.to_owned(),
        status,
        reason: reason.to_owned(),
        message,
        last_transition_time: now,
        observed_generation: cleaner.metadata.generation,
    }
}
