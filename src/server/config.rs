//! Hub configuration

use std::time::Duration;

use crate::identity::RetryPolicy;
use crate::protocol::constants::*;

/// Hub configuration options
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Namespace prefix of the dialable endpoint name
    pub endpoint_prefix: String,

    /// Period between pings on each active connection
    pub probe_interval: Duration,

    /// Outstanding pings older than this are discarded
    pub probe_timeout: Duration,

    /// Registration retry schedule
    pub retry: RetryPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint_prefix: DEFAULT_ENDPOINT_PREFIX.to_string(),
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl HubConfig {
    /// Set the endpoint prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.endpoint_prefix = prefix.into();
        self
    }

    /// Set the probe interval
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Set the probe timeout
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the registration retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.endpoint_prefix, "viewcal-");
        assert_eq!(config.probe_interval, Duration::from_secs(2));
        assert_eq!(config.probe_timeout, Duration::from_secs(10));
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_builder_prefix() {
        let config = HubConfig::default().prefix("camhub-");

        assert_eq!(config.endpoint_prefix, "camhub-");
    }

    #[test]
    fn test_builder_chaining() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
        };
        let config = HubConfig::default()
            .probe_interval(Duration::from_millis(500))
            .probe_timeout(Duration::from_secs(3))
            .retry_policy(policy);

        assert_eq!(config.probe_interval, Duration::from_millis(500));
        assert_eq!(config.probe_timeout, Duration::from_secs(3));
        assert_eq!(config.retry.max_attempts, 2);
    }
}
