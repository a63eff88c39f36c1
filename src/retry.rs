//! Retry policy for connect steps and characteristic writes.
//!
//! A [`RetryPolicy`] pairs a maximum attempt count with a [`Backoff`]
//! function and runs any fallible async operation under it:
//!
//! ```
//! use hublink::retry::{Backoff, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Backoff::Linear { step: Duration::from_millis(250) });
//! assert_eq!(policy.backoff.delay(1), Duration::from_millis(250));
//! assert_eq!(policy.backoff.delay(2), Duration::from_millis(500));
//! ```
//!
//! [`HubError::Disconnected`] is never retried: once the link is gone there
//! is nothing left to try again on.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_ms;
use crate::error::{HubError, Result};

/// Default attempts for connect steps.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Default attempts for a single packet write.
pub const DEFAULT_WRITE_ATTEMPTS: u32 = 3;

/// Default linear backoff step.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(500);

/// Delay between attempts, as a function of the attempt that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// `step * attempt`.
    Linear {
        #[serde(with = "duration_ms")]
        step: Duration,
    },
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential {
        #[serde(with = "duration_ms")]
        base: Duration,
        #[serde(with = "duration_ms")]
        max: Duration,
    },
}

impl Backoff {
    /// Delay after the given (1-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Linear { step } => step.saturating_mul(attempt),
            Backoff::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                base.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

/// Bounded retry with backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// A policy that tries exactly once.
    pub fn once() -> Self {
        Self::new(1, Backoff::None)
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    ///
    /// Returns the last error if every attempt fails.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(HubError::Disconnected) => return Err(HubError::Disconnected),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let delay = self.backoff.delay(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "{} failed: {}",
                        what,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONNECT_ATTEMPTS,
            Backoff::Linear {
                step: DEFAULT_BACKOFF_STEP,
            },
        )
    }
}
