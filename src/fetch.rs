//! Bounded retries around a single logical fetch unit.
//!
//! A unit is one page, one date chunk or one single-record decode. Retries
//! are local to the call: nothing above this layer retries again.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Default attempt cap observed across every source.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Upper bound for any single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Timeouts, connection resets, 429/5xx, empty results. Worth retrying.
    #[error("Transient fetch error: {reason}")]
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },
    /// Malformed input or a response that will never succeed. Not retried.
    #[error("Terminal fetch error: {0}")]
    Terminal(String),
    /// The attempt cap was reached. The unit is abandoned, the run continues.
    #[error("Exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl FetchError {
    pub fn transient(reason: impl Into<String>) -> Self {
        FetchError::Transient {
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        FetchError::Terminal(reason.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, FetchError::Exhausted { .. })
    }
}

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// `delay * 2^(attempt-1)`, capped at one minute.
    Exponential,
}

/// Retry policy for one fetch unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_millis(100),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff,
        }
    }

    /// Delay to sleep after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(MAX_BACKOFF)
            }
        }
    }

    /// Run `op` until it succeeds, fails terminally or hits the attempt cap.
    ///
    /// `label` identifies the unit in logs (a key and a range, a record id).
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=max_attempts {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{}: succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(FetchError::Terminal(reason)) => {
                    warn!("{}: terminal error, not retrying: {}", label, reason);
                    return Err(FetchError::Terminal(reason));
                }
                Err(FetchError::Exhausted { attempts, last }) => {
                    // An inner exhausted result is final; never layer retries.
                    return Err(FetchError::Exhausted { attempts, last });
                }
                Err(FetchError::Transient {
                    reason,
                    retry_after,
                }) => {
                    warn!(
                        "{}: attempt {}/{} failed: {}",
                        label, attempt, max_attempts, reason
                    );
                    last = reason;
                    if attempt < max_attempts {
                        let wait = retry_after
                            .map(|d| d.min(MAX_BACKOFF))
                            .unwrap_or_else(|| self.delay_after(attempt));
                        if wait > Duration::ZERO {
                            tokio::time::sleep(wait).await;
                        }
                    }
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts: max_attempts,
            last,
        })
    }
}

/// Parse a Retry-After header given in seconds.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    header_value?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(60)))
}
