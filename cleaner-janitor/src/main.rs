use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use cleaner_common::crd::CronExecutionCleaner;
use cleaner_common::retry::RetryPolicy;
use cleanup::{Cleaner, CleanupError};
use client::KubeClient;
use config::Config;
use envconfig::Envconfig;
use eyre::Result;
use futures::future::{select, Either};
use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::events::Reporter;
use kube::runtime::watcher;
use kube::{Api, ResourceExt};

use cleaner_common::metrics;

mod cleanup;
mod client;
mod config;
mod deletion;
mod handlers;
mod policy;
mod selection;

const CONTROLLER_NAME: &str = "cron-execution-cleaner";

struct Context {
    cleaner: Cleaner<KubeClient>,
    retry_policy: RetryPolicy,
    /// Consecutive failed cycles per cleaner, keyed by `namespace/name`.
    failures: Mutex<HashMap<String, u32>>,
}

impl Context {
    fn record_success(&self, key: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
    }

    fn next_retry(&self, key: &str) -> Duration {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let attempt = failures.entry(key.to_owned()).or_insert(0);
        let delay = self.retry_policy.time_until_next_retry(*attempt, None);
        *attempt = attempt.saturating_add(1);
        delay
    }
}

fn key(cleaner: &CronExecutionCleaner) -> String {
    format!(
        "{}/{}",
        cleaner.namespace().unwrap_or_default(),
        cleaner.name_any()
    )
}

async fn reconcile(
    cleaner: Arc<CronExecutionCleaner>,
    context: Arc<Context>,
) -> Result<Action, CleanupError> {
    let namespace = cleaner.namespace().unwrap_or_default();
    let name = cleaner.name_any();

    let report = context.cleaner.reconcile(&namespace, &name).await?;
    context.record_success(&key(&cleaner));

    Ok(match report.requeue_after {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    })
}

fn error_policy(
    cleaner: Arc<CronExecutionCleaner>,
    error: &CleanupError,
    context: Arc<Context>,
) -> Action {
    let delay = context.next_retry(&key(&cleaner));
    tracing::warn!(cleaner = %key(&cleaner), ?delay, "retrying after error: {}", error);
    Action::requeue(delay)
}

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

async fn cleanup_loop(api: Api<CronExecutionCleaner>, context: Arc<Context>) -> Result<()> {
    Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => tracing::debug!(cleaner = %object, "reconciled"),
                Err(e) => tracing::warn!("reconcile failed: {}", e),
            }
        })
        .await;

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let client = kube::Client::try_default()
        .await
        .expect("failed to create kubernetes client");
    let reporter = Reporter {
        controller: CONTROLLER_NAME.to_owned(),
        instance: (!config.pod_name.is_empty()).then(|| config.pod_name.clone()),
    };

    let api: Api<CronExecutionCleaner> = match config.watch_namespace() {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };

    let context = Arc::new(Context {
        cleaner: Cleaner::new(
            KubeClient::new(client, reporter),
            config.invalid_spec_backoff(),
        ),
        retry_policy: config.retry_policy(),
        failures: Mutex::default(),
    });
    let cleanup_loop = Box::pin(cleanup_loop(api, context));

    let recorder_handle =
        metrics::setup_metrics_recorder().expect("failed to install metrics recorder");
    let app = handlers::app(Some(recorder_handle));
    let http_server = Box::pin(listen(app, config.bind()));

    match select(http_server, cleanup_loop).await {
        Either::Left((listen_result, _)) => match listen_result {
            Ok(_) => {}
            Err(e) => tracing::error!("failed to start cleaner-janitor http server, {}", e),
        },
        Either::Right((cleanup_result, _)) => match cleanup_result {
            Ok(_) => {}
            Err(e) => tracing::error!("cleaner-janitor cleanup task exited, {}", e),
        },
    };
}
