use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::Job;

/// Kind of the owner whose executions a cleaner manages.
pub const CRON_JOB_KIND: &str = "CronJob";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
}

impl OwnerRef {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            name: name.to_owned(),
        }
    }
}

/// One run of a CronJob, reduced to what cleanup decisions need.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    pub name: String,
    pub namespace: String,
    pub uid: Option<String>,
    pub owners: Vec<OwnerRef>,
    pub start_time: Option<DateTime<Utc>>,
    pub active: u32,
    pub succeeded: u32,
    pub failed: u32,
}

impl Execution {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            uid: None,
            owners: Vec::new(),
            start_time: None,
            active: 0,
            succeeded: 0,
            failed: 0,
        }
    }

    pub fn owned_by(mut self, kind: &str, name: &str) -> Self {
        self.owners.push(OwnerRef::new(kind, name));
        self
    }

    pub fn started_at(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_counts(mut self, active: u32, succeeded: u32, failed: u32) -> Self {
        self.active = active;
        self.succeeded = succeeded;
        self.failed = failed;
        self
    }

    pub fn is_owned_by(&self, kind: &str, name: &str) -> bool {
        self.owners
            .iter()
            .any(|owner| owner.kind == kind && owner.name == name)
    }
}

fn non_negative(count: Option<i32>) -> u32 {
    count.map(|c| c.max(0) as u32).unwrap_or(0)
}

impl From<&Job> for Execution {
    fn from(job: &Job) -> Self {
        let metadata = &job.metadata;
        let status = job.status.as_ref();

        Self {
            name: metadata.name.clone().unwrap_or_default(),
            namespace: metadata.namespace.clone().unwrap_or_default(),
            uid: metadata.uid.clone(),
            owners: metadata
                .owner_references
                .iter()
                .flatten()
                .map(|owner| OwnerRef::new(&owner.kind, &owner.name))
                .collect(),
            start_time: status.and_then(|s| s.start_time.as_ref()).map(|t| t.0),
            active: non_negative(status.and_then(|s| s.active)),
            succeeded: non_negative(status.and_then(|s| s.succeeded)),
            failed: non_negative(status.and_then(|s| s.failed)),
        }
    }
}
