use async_trait::async_trait;
use cleaner_common::crd::{CronExecutionCleaner, CronExecutionCleanerStatus};
use cleaner_common::execution::Execution;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, DeleteParams, ListParams, PostParams, Preconditions, PropagationPolicy};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Resource;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("resource not found")]
    NotFound,
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("api request failed with {code}: {message}")]
    Api { code: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to serialize resource: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<kube::Error> for ClientError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) if response.code == 404 => ClientError::NotFound,
            kube::Error::Api(response) if response.code == 409 => {
                ClientError::Conflict(response.message)
            }
            kube::Error::Api(response) => ClientError::Api {
                code: response.code,
                message: response.message,
            },
            other => ClientError::Transport(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanerEvent {
    pub kind: EventKind,
    pub reason: String,
    pub action: String,
    pub note: String,
}

/// Everything a cleanup cycle needs from the cluster.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    async fn fetch_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CronExecutionCleaner>, ClientError>;

    async fn list_executions(&self, namespace: &str) -> Result<Vec<Execution>, ClientError>;

    /// Delete with background propagation. A missing Job yields `ClientError::NotFound`.
    async fn delete_execution(&self, execution: &Execution) -> Result<(), ClientError>;

    /// Replace the status sub-resource, conditional on the resource version `cleaner` was read at.
    async fn update_status(
        &self,
        cleaner: &CronExecutionCleaner,
        status: &CronExecutionCleanerStatus,
    ) -> Result<(), ClientError>;

    async fn publish_event(
        &self,
        cleaner: &CronExecutionCleaner,
        event: CleanerEvent,
    ) -> Result<(), ClientError>;
}

pub struct KubeClient {
    client: kube::Client,
    reporter: Reporter,
}

impl KubeClient {
    pub fn new(client: kube::Client, reporter: Reporter) -> Self {
        Self { client, reporter }
    }
}

#[async_trait]
impl ExecutionClient for KubeClient {
    async fn fetch_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CronExecutionCleaner>, ClientError> {
        let api: Api<CronExecutionCleaner> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_executions(&self, namespace: &str) -> Result<Vec<Execution>, ClientError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let jobs = api.list(&ListParams::default()).await?;

        Ok(jobs.items.iter().map(Execution::from).collect())
    }

    async fn delete_execution(&self, execution: &Execution) -> Result<(), ClientError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), &execution.namespace);
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            preconditions: execution.uid.as_ref().map(|uid| Preconditions {
                uid: Some(uid.clone()),
                resource_version: None,
            }),
            ..DeleteParams::default()
        };

        api.delete(&execution.name, &params).await?;
        Ok(())
    }

    async fn update_status(
        &self,
        cleaner: &CronExecutionCleaner,
        status: &CronExecutionCleanerStatus,
    ) -> Result<(), ClientError> {
        let namespace = cleaner.metadata.namespace.as_deref().unwrap_or_default();
        let name = cleaner.metadata.name.as_deref().unwrap_or_default();
        let api: Api<CronExecutionCleaner> = Api::namespaced(self.client.clone(), namespace);

        // metadata.resourceVersion travels with the body, so a stale write is rejected with 409.
        let mut updated = cleaner.clone();
        updated.status = Some(status.clone());
        let body = serde_json::to_vec(&updated)?;

        api.replace_status(name, &PostParams::default(), body).await?;
        Ok(())
    }

    async fn publish_event(
        &self,
        cleaner: &CronExecutionCleaner,
        event: CleanerEvent,
    ) -> Result<(), ClientError> {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            cleaner.object_ref(&()),
        );

        recorder
            .publish(Event {
                type_: match event.kind {
                    EventKind::Normal => EventType::Normal,
                    EventKind::Warning => EventType::Warning,
                },
                reason: event.reason,
                note: Some(event.note),
                action: event.action,
                secondary: None,
            })
            .await?;
        Ok(())
    }
}
