//! Retry policy for transient failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_status_codes() -> Vec<u16> {
    vec![429, 503]
}

fn default_count() -> u32 {
    3
}

fn default_wait_ms() -> u64 {
    1_000
}

fn default_max_wait_ms() -> u64 {
    30_000
}

/// When and how often a request is retried.
///
/// A request is retried after a transport error or after a response whose
/// status is listed in `status_codes`. The wait between attempts starts at
/// `wait_ms` and doubles up to `max_wait_ms`; a parseable integer
/// `Retry-After` header on the response takes precedence over the computed
/// backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Response status codes that trigger a retry.
    #[serde(default = "default_status_codes")]
    pub status_codes: Vec<u16>,

    /// Retries after the initial attempt.
    #[serde(default = "default_count")]
    pub count: u32,

    /// First wait between attempts, in milliseconds.
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,

    /// Upper bound for the doubling wait, in milliseconds.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            status_codes: default_status_codes(),
            count: default_count(),
            wait_ms: default_wait_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_status_codes(mut self, status_codes: Vec<u16>) -> Self {
        self.status_codes = status_codes;
        self
    }

    #[must_use]
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    #[must_use]
    pub fn with_wait_ms(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }

    #[must_use]
    pub fn with_max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.max_wait_ms = max_wait_ms;
        self
    }

    /// True when a response with this status should be retried.
    #[must_use]
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.status_codes.contains(&status)
    }

    /// Wait before the given zero-based retry attempt.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let wait = self.wait_ms.saturating_mul(factor).min(self.max_wait_ms);
        Duration::from_millis(wait)
    }
}

/// Parses an integer `Retry-After` header value into a wait.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// ============================================================================
// Tests
// ============================================================================
