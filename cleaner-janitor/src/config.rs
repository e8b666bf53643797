use std::time;

use cleaner_common::retry::RetryPolicy;
use envconfig::Envconfig;

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,

    /// Namespace to watch for cleaners; empty watches all namespaces.
    #[envconfig(from = "WATCH_NAMESPACE", default = "")]
    pub watch_namespace: String,

    /// Requeue delay for a cleaner whose runInterval itself is invalid.
    #[envconfig(from = "INVALID_SPEC_BACKOFF_SECS", default = "30")]
    pub invalid_spec_backoff_secs: u64,

    #[envconfig(from = "RETRY_BACKOFF_COEFFICIENT", default = "2")]
    pub retry_backoff_coefficient: u32,

    #[envconfig(from = "RETRY_INITIAL_INTERVAL_SECS", default = "1")]
    pub retry_initial_interval_secs: u64,

    #[envconfig(from = "RETRY_MAXIMUM_INTERVAL_SECS", default = "300")]
    pub retry_maximum_interval_secs: u64,

    /// Reported as the event source instance.
    #[envconfig(from = "POD_NAME", default = "")]
    pub pod_name: String,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn watch_namespace(&self) -> Option<&str> {
        match self.watch_namespace.trim() {
            "" => None,
            namespace => Some(namespace),
        }
    }

    pub fn invalid_spec_backoff(&self) -> time::Duration {
        time::Duration::from_secs(self.invalid_spec_backoff_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        // A zero coefficient would collapse every retry after the first to no delay.
        RetryPolicy::new(
            self.retry_backoff_coefficient.max(1),
            time::Duration::from_secs(self.retry_initial_interval_secs.max(1)),
        )
        .maximum_interval(time::Duration::from_secs(self.retry_maximum_interval_secs.max(1)))
        .provide()
    }
}
