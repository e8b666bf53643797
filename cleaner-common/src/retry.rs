use std::time;

#[derive(Clone, Debug)]
/// The retry policy the controller uses to space out requeues of a cleaner whose cycle errored.
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past attempt.
    pub backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    pub initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    pub maximum_interval: Option<time::Duration>,
}

impl RetryPolicy {
    pub fn new(backoff_coefficient: u32, initial_interval: time::Duration) -> RetryPolicyBuilder {
        RetryPolicyBuilder::new(backoff_coefficient, initial_interval)
    }

    /// Calculate the time until the next retry for a given attempt number.
    ///
    /// `attempt` counts previous consecutive failures, starting at 0.
    pub fn time_until_next_retry(
        &self,
        attempt: u32,
        preferred_retry_interval: Option<time::Duration>,
    ) -> time::Duration {
        let multiplier = self.backoff_coefficient.saturating_pow(attempt);
        let candidate_interval = self
            .initial_interval
            .checked_mul(multiplier)
            .unwrap_or(time::Duration::MAX);

        match (preferred_retry_interval, self.maximum_interval) {
            (Some(duration), Some(max_interval)) => std::cmp::min(
                std::cmp::max(std::cmp::min(candidate_interval, max_interval), duration),
                max_interval,
            ),
            (Some(duration), None) => std::cmp::max(candidate_interval, duration),
            (None, Some(max_interval)) => std::cmp::min(candidate_interval, max_interval),
            (None, None) => candidate_interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicyBuilder::default().provide()
    }
}

pub struct RetryPolicyBuilder {
    /// Coefficient to multiply initial_interval with for every past attempt.
    pub backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    pub initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    pub maximum_interval: Option<time::Duration>,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: time::Duration::from_secs(1),
            maximum_interval: Some(time::Duration::from_secs(300)),
        }
    }
}

impl RetryPolicyBuilder {
    pub fn new(backoff_coefficient: u32, initial_interval: time::Duration) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            ..RetryPolicyBuilder::default()
        }
    }

    pub fn maximum_interval(mut self, interval: time::Duration) -> RetryPolicyBuilder {
        self.maximum_interval = Some(interval);
        self
    }

    pub fn provide(&self) -> RetryPolicy {
        RetryPolicy {
            backoff_coefficient: self.backoff_coefficient,
            initial_interval: self.initial_interval,
            maximum_interval: self.maximum_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_until_maximum() {
        let policy = RetryPolicy::new(2, time::Duration::from_secs(1))
            .maximum_interval(time::Duration::from_secs(10))
            .provide();

        assert_eq!(policy.time_until_next_retry(0, None), time::Duration::from_secs(1));
        assert_eq!(policy.time_until_next_retry(2, None), time::Duration::from_secs(4));
        assert_eq!(policy.time_until_next_retry(8, None), time::Duration::from_secs(10));
        assert_eq!(
            policy.time_until_next_retry(u32::MAX, None),
            time::Duration::from_secs(10)
        );
    }

    #[test]
    fn test_preferred_interval_is_bounded_by_maximum() {
        let policy = RetryPolicy::new(2, time::Duration::from_secs(1))
            .maximum_interval(time::Duration::from_secs(10))
            .provide();

        assert_eq!(
            policy.time_until_next_retry(0, Some(time::Duration::from_secs(5))),
            time::Duration::from_secs(5)
        );
        assert_eq!(
            policy.time_until_next_retry(0, Some(time::Duration::from_secs(60))),
            time::Duration::from_secs(10)
        );
    }
}
