// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry with exponential backoff and jitter.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Backoff policy for [`retry_async`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay randomized in both directions, so synchronized
    /// callers fan out.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt.saturating_sub(1) as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        let spread = capped * self.jitter;
        let jittered = capped + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Run `op` until it succeeds or the retry budget is spent; the final
/// error propagates.
pub async fn retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt > policy.max_retries {
                    error!(label, attempts = attempt, error = %e, "all retries exhausted");
                    return Err(e);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    label,
                    attempt,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
