// ── Runtime client configuration ──
//
// These types describe how to reach the backend and how queries behave.
// They never touch disk: `kelmah-config` resolves a profile into a
// `ClientConfig` and hands it in.

use std::time::Duration;

use kelmah_api::{DEFAULT_REFRESH_PATH, RetryPolicy, TransportConfig};
use url::Url;

use crate::error::CoreError;

/// Per-query orchestration settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Logical budget for one fetch, including every retry and backoff.
    pub timeout: Duration,
    /// How long a cached result is served without going to the network.
    pub ttl: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            ttl: Duration::from_secs(60),
        }
    }
}

impl QueryOptions {
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Everything needed to build an `AppContext`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL (e.g. `https://api.kelmah.com/api`).
    pub api_url: Url,
    pub transport: TransportConfig,
    pub retry: RetryPolicy,
    pub query: QueryOptions,
    /// Token refresh endpoint, relative to `api_url`.
    pub refresh_path: String,
    /// Quick-job tracking poll period.
    pub poll_interval: Duration,
}

impl ClientConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            transport: TransportConfig::default(),
            retry: RetryPolicy::default(),
            query: QueryOptions::default(),
            refresh_path: DEFAULT_REFRESH_PATH.to_owned(),
            poll_interval: Duration::from_secs(15),
        }
    }

    /// Reject combinations the query layer cannot honor.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.query.timeout < self.transport.timeout {
            return Err(CoreError::Config {
                message: format!(
                    "query timeout ({}ms) must be at least the transport timeout ({}ms)",
                    self.query.timeout.as_millis(),
                    self.transport.timeout.as_millis()
                ),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(CoreError::Config {
                message: "retry_max_attempts must be at least 1".into(),
            });
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(CoreError::Config {
                message: "retry base delay exceeds the maximum delay".into(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(CoreError::Config {
                message: "poll interval must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
