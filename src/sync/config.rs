//! Retry and conflict-resolution settings for the synchronizer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a synchronize call reacts to transient primary-store failures.
///
/// Only errors the primary store itself classifies as transient
/// ([`PrimaryStore::is_transient`](crate::PrimaryStore::is_transient)) spend
/// a retry. Each retry re-runs the whole sequence: a fresh primary
/// transaction, the projection and both commits. Projection failures, count
/// mismatches and validation errors are returned on the first occurrence;
/// concurrency conflicts go to the resolver and never count as retries.
///
/// ```ignore
/// // up to five re-runs, sleeping 20, 40, 80, 80, 80 ms
/// let retry = RetryConfig::new().with_max_retries(5).with_backoff(20, 80);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Re-runs allowed after the first attempt.
    pub max_retries: u32,
    /// Sleep before the first re-run, doubled for every later one.
    pub backoff_ms: u64,
    /// Upper bound for a single sleep.
    pub backoff_cap_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 5,
            backoff_cap_ms: 250,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every failure is returned to the caller as is.
    pub fn single_attempt() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, first_ms: u64, cap_ms: u64) -> Self {
        self.backoff_ms = first_ms;
        self.backoff_cap_ms = cap_ms;
        self
    }

    /// Whether another re-run is allowed after `retries` of them.
    pub(crate) fn allows(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    /// Sleep before re-run number `retries + 1`.
    pub(crate) fn backoff(&self, retries: u32) -> Duration {
        let factor = 2u64.checked_pow(retries).unwrap_or(u64::MAX);
        let ms = self.backoff_ms.saturating_mul(factor).min(self.backoff_cap_ms);
        Duration::from_millis(ms)
    }
}

/// Top-level synchronizer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub retry: RetryConfig,
    /// Hand optimistic-concurrency conflicts to the resolver and resubmit once.
    pub resolve_conflicts: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            resolve_conflicts: true,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_conflict_resolution(mut self, enabled: bool) -> Self {
        self.resolve_conflicts = enabled;
        self
    }
}
