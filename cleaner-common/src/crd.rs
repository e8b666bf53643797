use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde_derive::{Deserialize, Serialize};

pub const READY_CONDITION: &str = "Ready";

/// Desired state of a `CronExecutionCleaner`.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "lifecycle.github.io",
    version = "v1alpha1",
    kind = "CronExecutionCleaner",
    namespaced,
    status = "CronExecutionCleanerStatus",
    shortname = "cec",
    printcolumn = r#"{"name":"CronJob","type":"string","jsonPath":".spec.cronJobName"}"#,
    printcolumn = r#"{"name":"Deleted","type":"integer","jsonPath":".status.jobsDeleted"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CronExecutionCleanerSpec {
    /// Namespace in which the target CronJob exists.
    pub namespace: String,
    /// Name of the CronJob whose executions should be cleaned.
    #[serde(alias = "targetWorkloadName")]
    pub cron_job_name: String,
    pub retain: RetentionSpec,
    #[serde(default)]
    pub cleanup_stuck: CleanupStuckSpec,
    /// Interval at which cleanup runs, as a Go duration string.
    pub run_interval: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSpec {
    /// Number of succeeded Jobs to keep.
    #[serde(alias = "successful")]
    pub successful_jobs: i32,
    /// Number of failed Jobs to keep.
    #[serde(alias = "failed")]
    pub failed_jobs: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupStuckSpec {
    #[serde(default)]
    pub enabled: bool,
    /// How long a Job may stay active before it counts as stuck.
    #[serde(default)]
    pub stuck_after: String,
}

/// Observed state of a `CronExecutionCleaner`, written only by the controller.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CronExecutionCleanerStatus {
    /// Last time a cycle deleted at least one Job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub jobs_deleted: u64,
    /// Mirrors `jobs_deleted`: each Job is assumed to own exactly one Pod.
    #[serde(default)]
    pub pods_deleted: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A `metav1.Condition` shaped status entry.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl CronExecutionCleanerStatus {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Insert or update a condition keyed by type.
    ///
    /// Matches `meta.SetStatusCondition`: `last_transition_time` only moves
    /// when the status value flips, reason/message/generation always follow
    /// the new value.
    pub fn set_condition(&mut self, new: Condition) {
        match self.conditions.iter_mut().find(|c| c.type_ == new.type_) {
            Some(existing) => {
                if existing.status != new.status {
                    existing.status = new.status;
                    existing.last_transition_time = new.last_transition_time;
                }
                existing.reason = new.reason;
                existing.message = new.message;
                existing.observed_generation = new.observed_generation;
            }
            None => self.conditions.push(new),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ready(status: ConditionStatus, reason: &str, at: DateTime<Utc>) -> Condition {
        Condition {
            type_: READY_CONDITION.to_owned(),
            status,
            reason: reason.to_owned(),
            message: String::new(),
            last_transition_time: at,
            observed_generation: Some(1),
        }
    }

    #[test]
    fn test_set_condition_keeps_transition_time_without_flip() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::minutes(5);
        let mut status = CronExecutionCleanerStatus::default();

        status.set_condition(ready(ConditionStatus::True, "CycleCompleted", t0));
        status.set_condition(ready(ConditionStatus::True, "CycleCompleted", t1));

        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].last_transition_time, t0);
    }

    #[test]
    fn test_set_condition_moves_transition_time_on_flip() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::minutes(5);
        let mut status = CronExecutionCleanerStatus::default();

        status.set_condition(ready(ConditionStatus::True, "CycleCompleted", t0));
        status.set_condition(ready(ConditionStatus::False, "InvalidSpec", t1));

        let condition = status.condition(READY_CONDITION).unwrap();
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason, "InvalidSpec");
        assert_eq!(condition.last_transition_time, t1);
    }

    #[test]
    fn test_spec_accepts_field_aliases() {
        let spec: CronExecutionCleanerSpec = serde_json::from_value(serde_json::json!({
            "namespace": "batch",
            "targetWorkloadName": "nightly",
            "retain": {"successful": 3, "failed": 1},
            "runInterval": "5m"
        }))
        .unwrap();

        assert_eq!(spec.cron_job_name, "nightly");
        assert_eq!(spec.retain.successful_jobs, 3);
        assert_eq!(spec.retain.failed_jobs, 1);
        assert!(!spec.cleanup_stuck.enabled);
    }

    #[test]
    fn test_status_wire_names() {
        let status = CronExecutionCleanerStatus {
            jobs_deleted: 4,
            pods_deleted: 4,
            ..Default::default()
        };

        let value = serde_json::to_value(&status).unwrap();

        assert_eq!(value["jobsDeleted"], 4);
        assert_eq!(value["podsDeleted"], 4);
        assert!(value.get("lastRunTime").is_none());
    }
}
