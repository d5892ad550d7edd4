//! Bounded retry for filesystem and network operations.
//!
//! Filesystem ops use a fixed (linear) delay: the conditions worth retrying
//! — resource busy, interrupted syscall, momentary locks — clear quickly or
//! not at all. Network-bound ops (remote audit export) use exponential
//! backoff with jitter. Both honor cancellation between attempts.

use std::time::Duration;

use crate::core::cancel::CancelToken;
use crate::core::errors::{CleanerError, Result};

/// Fixed-delay retry for filesystem operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Run `op` up to `max_attempts` times, sleeping `delay` between
    /// transient failures. Permanent errors return immediately.
    pub fn execute<T>(
        &self,
        cancel: &CancelToken,
        mut op: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let attempts = self.max_attempts.max(1);
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(CleanerError::Cancelled);
            }
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    std::thread::sleep(self.delay);
                }
                Err(err) => return Err(err),
            }
        }
        unreachable!("loop always returns on final attempt")
    }
}

/// Exponential backoff with jitter for network-bound operations.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    pub factor: f64,
    /// Fraction (0..=1) of the computed delay shaved off at random.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            factor: 2.0,
            jitter: 0.3,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based), jittered.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let scaled = self.base.as_secs_f64() * self.factor.powi(exponent.min(30) as i32);
        let capped = scaled.min(self.cap.as_secs_f64());
        let jittered = capped * (1.0 - self.jitter * rand::random::<f64>());
        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Run `op` with exponential backoff between transient failures.
    pub fn execute<T>(
        &self,
        cancel: &CancelToken,
        mut op: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let attempts = self.max_attempts.max(1);
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(CleanerError::Cancelled);
            }
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    std::thread::sleep(self.delay_for(attempt));
                }
                Err(err) => return Err(err),
            }
        }
        unreachable!("loop always returns on final attempt")
    }
}
