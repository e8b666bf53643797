use std::time::Duration;

use cleaner_common::crd::CronExecutionCleanerSpec;
use cleaner_common::duration::{parse_go_duration, DurationError};
use thiserror::Error;

const MINIMUM_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("spec.namespace must not be empty")]
    EmptyNamespace,
    #[error("spec.cronJobName must not be empty")]
    EmptyCronJobName,
    #[error("spec.runInterval must be at least 1s")]
    RunIntervalTooShort,
    #[error("spec.runInterval is not a valid duration: {0}")]
    RunIntervalUnparsable(DurationError),
    #[error("spec.retain.successfulJobs cannot be negative")]
    NegativeSuccessfulRetention,
    #[error("spec.retain.failedJobs cannot be negative")]
    NegativeFailedRetention,
    #[error("spec.cleanupStuck.stuckAfter must be at least 1s when enabled")]
    StuckAfterTooShort,
    #[error("spec.cleanupStuck.stuckAfter is not a valid duration: {0}")]
    StuckAfterUnparsable(DurationError),
}

/// A spec that passed validation, with durations and counts in their working types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupPolicy {
    pub namespace: String,
    pub cron_job_name: String,
    pub retain_successful: usize,
    pub retain_failed: usize,
    /// `None` when stuck cleanup is disabled.
    pub stuck_after: Option<Duration>,
    pub run_interval: Duration,
}

/// Parse and bound-check `spec.runInterval` on its own.
///
/// The orchestrator also uses this to decide whether an invalid spec can still
/// be requeued at its own interval.
pub fn run_interval(spec: &CronExecutionCleanerSpec) -> Result<Duration, SpecError> {
    match parse_go_duration(&spec.run_interval) {
        Ok(interval) if interval >= MINIMUM_INTERVAL => Ok(interval),
        Ok(_) | Err(DurationError::Negative(_)) => Err(SpecError::RunIntervalTooShort),
        Err(e) => Err(SpecError::RunIntervalUnparsable(e)),
    }
}

fn stuck_after(spec: &CronExecutionCleanerSpec) -> Result<Option<Duration>, SpecError> {
    if !spec.cleanup_stuck.enabled {
        return Ok(None);
    }

    match parse_go_duration(&spec.cleanup_stuck.stuck_after) {
        Ok(threshold) if threshold >= MINIMUM_INTERVAL => Ok(Some(threshold)),
        Ok(_) | Err(DurationError::Negative(_)) | Err(DurationError::Empty) => {
            Err(SpecError::StuckAfterTooShort)
        }
        Err(e) => Err(SpecError::StuckAfterUnparsable(e)),
    }
}

pub fn validate(spec: &CronExecutionCleanerSpec) -> Result<CleanupPolicy, SpecError> {
    if spec.namespace.trim().is_empty() {
        return Err(SpecError::EmptyNamespace);
    }
    if spec.cron_job_name.trim().is_empty() {
        return Err(SpecError::EmptyCronJobName);
    }

    let run_interval = run_interval(spec)?;

    let retain_successful = usize::try_from(spec.retain.successful_jobs)
        .map_err(|_| SpecError::NegativeSuccessfulRetention)?;
    let retain_failed = usize::try_from(spec.retain.failed_jobs)
        .map_err(|_| SpecError::NegativeFailedRetention)?;

    let stuck_after = stuck_after(spec)?;

    Ok(CleanupPolicy {
        namespace: spec.namespace.clone(),
        cron_job_name: spec.cron_job_name.clone(),
        retain_successful,
        retain_failed,
        stuck_after,
        run_interval,
    })
}
