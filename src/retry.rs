// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Retry utilities with capped exponential backoff for API calls.
///
/// Only errors that report themselves as transient are retried; anything else
/// is handed back to the caller on the first failure.
use std::{fmt::Display, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Classifies errors for the retry loop.
pub trait Retryable
{
    /// Returns `true` when repeating the operation may succeed.
    fn is_transient(&self,) -> bool;
}

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize,)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig
{
    /// Maximum number of attempts, including the first one (default: 3).
    pub max_attempts:     u32,
    /// Initial delay between retries in milliseconds (default: 1000).
    pub initial_delay_ms: u64,
    /// Multiplier for exponential backoff (default: 2.0).
    pub backoff_factor:   f64,
    /// Upper bound for a single delay in milliseconds (default: 30000).
    pub max_delay_ms:     u64,
}

impl Default for RetryConfig
{
    fn default() -> Self
    {
        Self {
            max_attempts: 3, initial_delay_ms: 1000, backoff_factor: 2.0, max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig
{
    /// Delay applied after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32,) -> Duration
    {
        let exponent = attempt.saturating_sub(1,) as i32;
        let raw = self.initial_delay_ms as f64 * self.backoff_factor.powi(exponent,);
        let capped = raw.min(self.max_delay_ms as f64,).max(0.0,);
        Duration::from_millis(capped as u64,)
    }
}

/// Executes an async operation with exponential backoff retry logic.
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays)
/// * `operation_name` - Name of the operation for logging
/// * `f` - Async function to retry
///
/// # Errors
///
/// Returns the first non-transient error unchanged, or the error of the final
/// attempt once `max_attempts` is exhausted.
///
/// # Example
///
/// ```no_run
/// use statcard::{Error, RetryConfig, retry_with_backoff};
///
/// # async fn example() -> Result<(), Error> {
/// let config = RetryConfig::default();
/// let result = retry_with_backoff(&config, "fetch data", || async {
///     Ok::<_, Error,>(42,)
/// },)
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E,>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, E,>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E,>,>,
    E: Retryable + Display,
{
    let max_attempts = config.max_attempts.max(1,);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(result,) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result,);
            }
            Err(error,) if !error.is_transient() => {
                debug!("{} failed with a permanent error: {}", operation_name, error);
                return Err(error,);
            }
            Err(error,) => {
                if attempt >= max_attempts {
                    warn!(
                        "{} failed after {} attempts: {}",
                        operation_name, max_attempts, error
                    );
                    return Err(error,);
                }

                let delay = config.delay_for(attempt,);
                warn!(
                    "{} failed on attempt {}/{}: {}. Retrying in {}ms...",
                    operation_name,
                    attempt,
                    max_attempts,
                    error,
                    delay.as_millis()
                );

                sleep(delay,).await;
                attempt += 1;
            }
        }
    }
}
