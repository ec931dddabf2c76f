//! Bounded retry for persistence writes

use std::time::Duration;

use crate::core::config::ArchiveConfig;
use crate::core::error::{Result, WarError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Sleep before retry `n` is `backoff * n`
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self::new(
            config.persistence_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// Single attempt, no retry
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }

    /// Run `op`, retrying retryable failures; validation errors return at once
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    tracing::warn!(attempt, error = %e, "{} failed, retrying", what);
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff * attempt);
                    }
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(attempts = attempt, error = %e, "{} gave up", what);
                    return Err(match e {
                        WarError::Persistence(_) => e,
                        other => WarError::Persistence(format!("{}: {}", what, other)),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ArchiveConfig::default())
    }
}
