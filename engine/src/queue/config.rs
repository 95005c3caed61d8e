//! Queue and worker pool configuration.

use std::str::FromStr;
use std::time::Duration;

/// What to do at startup with jobs a previous process left in `processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryPolicy {
    /// Put them back to `pending` so they run again.
    #[default]
    Requeue,
    /// Mark them `failed` with an "interrupted" error.
    Fail,
}

impl FromStr for RecoveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requeue" => Ok(RecoveryPolicy::Requeue),
            "fail" => Ok(RecoveryPolicy::Fail),
            other => Err(format!("unknown recovery policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of concurrent workers (fixed for the pool's lifetime).
    pub workers: usize,
    /// Upper bound on how long an idle worker waits before polling again.
    pub poll_interval: Duration,
    /// Retries for a store call that failed with a transient error.
    pub store_retry_attempts: u32,
    /// First retry delay; doubles on each attempt.
    pub store_retry_base: Duration,
    /// Maximum serialized payload size accepted by `submit`.
    pub max_payload_bytes: usize,
    pub recovery_policy: RecoveryPolicy,
    /// Bound on graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval: Duration::from_millis(1000),
            store_retry_attempts: 3,
            store_retry_base: Duration::from_millis(50),
            max_payload_bytes: 1024 * 1024, // 1 MiB
            recovery_policy: RecoveryPolicy::Requeue,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let workers = env_parse("WORKERS")
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.workers);

        let poll_interval = env_parse("POLL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let store_retry_attempts =
            env_parse("STORE_RETRY_ATTEMPTS").unwrap_or(defaults.store_retry_attempts);

        let store_retry_base = env_parse("STORE_RETRY_BASE_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.store_retry_base);

        let max_payload_bytes = env_parse("MAX_PAYLOAD_BYTES").unwrap_or(defaults.max_payload_bytes);

        let recovery_policy = env_parse("RECOVERY_POLICY").unwrap_or(defaults.recovery_policy);

        let shutdown_timeout = env_parse("SHUTDOWN_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.shutdown_timeout);

        Self {
            workers,
            poll_interval,
            store_retry_attempts,
            store_retry_base,
            max_payload_bytes,
            recovery_policy,
            shutdown_timeout,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Backoff before retry `attempt` (1-based), capped at 64x the base.
    #[inline]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.store_retry_base * (1u32 << attempt.saturating_sub(1).min(6))
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.workers, 2);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.recovery_policy, RecoveryPolicy::Requeue);
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let config = QueueConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_millis(50));
        assert_eq!(config.retry_delay(2), Duration::from_millis(100));
        assert_eq!(config.retry_delay(3), Duration::from_millis(200));
        assert_eq!(config.retry_delay(50), Duration::from_millis(50 * 64));
    }

    #[test]
    fn test_with_workers_never_zero() {
        assert_eq!(QueueConfig::default().with_workers(0).workers, 1);
    }

    #[test]
    fn test_recovery_policy_parse() {
        assert_eq!("fail".parse::<RecoveryPolicy>().unwrap(), RecoveryPolicy::Fail);
        assert_eq!(" Requeue ".parse::<RecoveryPolicy>().unwrap(), RecoveryPolicy::Requeue);
        assert!("drop".parse::<RecoveryPolicy>().is_err());
    }
}
