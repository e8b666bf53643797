//! Pure selection of which executions a cycle should delete.
//!
//! Nothing here touches the cluster: each step takes executions in and hands a
//! subset back, so the whole decision can be tested without a client.
use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cleaner_common::execution::{Execution, CRON_JOB_KIND};

/// Executions split by lifecycle state. Executions with every counter at zero are dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Classified {
    pub active: Vec<Execution>,
    pub succeeded: Vec<Execution>,
    pub failed: Vec<Execution>,
}

/// Keep executions owned by the CronJob named `cron_job_name`.
pub fn filter_by_owner(executions: Vec<Execution>, cron_job_name: &str) -> Vec<Execution> {
    executions
        .into_iter()
        .filter(|execution| execution.is_owned_by(CRON_JOB_KIND, cron_job_name))
        .collect()
}

/// Partition by counters, checked in the order active, succeeded, failed.
///
/// A Job can briefly report both active and terminal counts while a pod is
/// being replaced; it is treated as still running.
pub fn classify(executions: Vec<Execution>) -> Classified {
    let mut classified = Classified::default();

    for execution in executions {
        if execution.active > 0 {
            classified.active.push(execution);
        } else if execution.succeeded > 0 {
            classified.succeeded.push(execution);
        } else if execution.failed > 0 {
            classified.failed.push(execution);
        }
    }

    classified
}

/// Active executions that started more than `threshold` before `now`.
///
/// Executions without a start time are never stuck.
pub fn detect_stuck(active: &[Execution], threshold: Duration, now: DateTime<Utc>) -> Vec<Execution> {
    let Ok(threshold) = chrono::Duration::from_std(threshold) else {
        // Longer than chrono can represent: nothing can have run that long.
        return Vec::new();
    };

    active
        .iter()
        .filter(|execution| {
            execution
                .start_time
                .is_some_and(|started| now.signed_duration_since(started) > threshold)
        })
        .cloned()
        .collect()
}

/// Newest start time first, missing start times last, then name ascending.
fn newest_first(a: &Execution, b: &Execution) -> Ordering {
    // `None < Some(_)`, so comparing b to a puts missing start times at the end.
    b.start_time
        .cmp(&a.start_time)
        .then_with(|| a.name.cmp(&b.name))
}

/// Executions beyond the `retain` most recent ones.
///
/// The result is in retention order, so executions without a start time come
/// last in the sort and are always the first to fall outside the kept window.
pub fn compute_excess(terminal: &[Execution], retain: usize) -> Vec<Execution> {
    if terminal.len() <= retain {
        return Vec::new();
    }

    let mut sorted = terminal.to_vec();
    sorted.sort_by(newest_first);
    sorted.split_off(retain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn job(name: &str) -> Execution {
        Execution::new("batch", name).owned_by(CRON_JOB_KIND, "nightly")
    }

    fn names(executions: &[Execution]) -> Vec<&str> {
        executions.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_filter_by_owner() {
        let executions = vec![
            job("nightly-1"),
            Execution::new("batch", "other-1").owned_by(CRON_JOB_KIND, "hourly"),
            Execution::new("batch", "wrong-kind").owned_by("Deployment", "nightly"),
            Execution::new("batch", "orphan"),
            Execution::new("batch", "multi")
                .owned_by("Workflow", "pipeline")
                .owned_by(CRON_JOB_KIND, "nightly"),
        ];

        let owned = filter_by_owner(executions, "nightly");

        assert_eq!(names(&owned), vec!["nightly-1", "multi"]);
    }

    #[test]
    fn test_filter_by_owner_never_returns_foreign_executions() {
        let kinds = ["CronJob", "Job", "Deployment", ""];
        let owners = ["nightly", "nightly-2", "Nightly", ""];
        let mut executions = Vec::new();
        for kind in kinds {
            for owner in owners {
                executions.push(Execution::new("batch", &format!("{kind}/{owner}")).owned_by(kind, owner));
            }
        }

        let owned = filter_by_owner(executions, "nightly");

        assert_eq!(names(&owned), vec!["CronJob/nightly"]);
        for execution in &owned {
            assert!(execution.is_owned_by(CRON_JOB_KIND, "nightly"));
        }
    }

    #[test]
    fn test_classify() {
        let executions = vec![
            job("active").with_counts(1, 0, 0),
            job("succeeded").with_counts(0, 1, 0),
            job("failed").with_counts(0, 0, 1),
            job("pending").with_counts(0, 0, 0),
        ];

        let classified = classify(executions);

        assert_eq!(names(&classified.active), vec!["active"]);
        assert_eq!(names(&classified.succeeded), vec!["succeeded"]);
        assert_eq!(names(&classified.failed), vec!["failed"]);
    }

    #[test]
    fn test_classify_active_wins_over_terminal_counts() {
        let executions = vec![
            job("active-and-succeeded").with_counts(1, 2, 0),
            job("active-and-failed").with_counts(3, 0, 4),
            job("everything").with_counts(1, 1, 1),
            job("succeeded-and-failed").with_counts(0, 1, 1),
        ];

        let classified = classify(executions);

        assert_eq!(
            names(&classified.active),
            vec!["active-and-succeeded", "active-and-failed", "everything"]
        );
        assert_eq!(names(&classified.succeeded), vec!["succeeded-and-failed"]);
        assert!(classified.failed.is_empty());
    }

    #[test]
    fn test_detect_stuck() {
        let now = Utc::now();
        let hour = Duration::from_secs(3600);
        let active = vec![
            job("two-hours").started_at(now - ChronoDuration::hours(2)),
            job("thirty-minutes").started_at(now - ChronoDuration::minutes(30)),
            job("exactly-an-hour").started_at(now - ChronoDuration::hours(1)),
        ];

        let stuck = detect_stuck(&active, hour, now);

        assert_eq!(names(&stuck), vec!["two-hours"]);
    }

    #[test]
    fn test_detect_stuck_ignores_missing_start_time() {
        let now = Utc::now();
        let active = vec![job("unstarted").with_counts(1, 0, 0)];

        for threshold in [1, 60, 3600, 86400 * 365] {
            assert!(detect_stuck(&active, Duration::from_secs(threshold), now).is_empty());
        }
        assert!(detect_stuck(&active, Duration::MAX, now).is_empty());
    }

    #[test]
    fn test_compute_excess_keeps_newest() {
        let now = Utc::now();
        let terminal = vec![
            job("t2").started_at(now - ChronoDuration::hours(3)),
            job("t0").started_at(now),
            job("t1").started_at(now - ChronoDuration::hours(1)),
        ];

        let excess = compute_excess(&terminal, 2);

        assert_eq!(names(&excess), vec!["t2"]);
    }

    #[test]
    fn test_compute_excess_orders_older_after_newer() {
        let now = Utc::now();
        let terminal = vec![
            job("job-1").started_at(now - ChronoDuration::hours(3)),
            job("job-2").started_at(now - ChronoDuration::hours(2)),
            job("job-3").started_at(now),
        ];

        let excess = compute_excess(&terminal, 1);

        assert_eq!(names(&excess), vec!["job-2", "job-1"]);
    }

    #[test]
    fn test_compute_excess_none_when_within_retention() {
        let terminal = vec![job("job-1"), job("job-2")];

        assert!(compute_excess(&terminal, 5).is_empty());
        assert!(compute_excess(&terminal, 2).is_empty());
        assert!(compute_excess(&[], 0).is_empty());
    }

    #[test]
    fn test_compute_excess_retain_zero_takes_everything() {
        let now = Utc::now();
        let terminal = vec![job("a").started_at(now), job("b")];

        assert_eq!(names(&compute_excess(&terminal, 0)), vec!["a", "b"]);
    }

    #[test]
    fn test_compute_excess_missing_start_time_goes_first() {
        let now = Utc::now();
        let terminal = vec![
            job("old").started_at(now - ChronoDuration::days(30)),
            job("unstarted"),
            job("new").started_at(now),
            job("older").started_at(now - ChronoDuration::days(60)),
        ];

        for retain in 0..terminal.len() {
            let excess = compute_excess(&terminal, retain);
            assert!(
                names(&excess).contains(&"unstarted"),
                "retain={retain} dropped the unstarted execution from excess"
            );
        }
    }

    #[test]
    fn test_compute_excess_breaks_ties_by_name() {
        let now = Utc::now();
        let same = now - ChronoDuration::hours(1);
        let forward = vec![
            job("c").started_at(same),
            job("a").started_at(same),
            job("b").started_at(same),
            job("z"),
            job("y"),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let excess = compute_excess(&forward, 1);

        assert_eq!(names(&excess), vec!["b", "c", "y", "z"]);
        assert_eq!(excess, compute_excess(&reversed, 1));
    }
}
