use std::{future::Future, time::Duration};

use tokio::time::sleep;

use crate::{errors::Error, Result};

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub exponential: bool,
    /// Longest server-imposed flood wait we sleep through before giving up.
    pub max_flood_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            exponential: true,
            max_flood_wait: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1` (attempts are 1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base_delay;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` is exhausted.
///
/// Flood waits sleep for the server-requested time instead of the backoff.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, name: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(policy, name, Error::is_retryable, op).await
}

/// Like [`retry`], but only flood waits are retried.
///
/// For calls that post to a chat: a network error may arrive after the
/// server already accepted the message, and sending again would duplicate it.
pub async fn retry_send<T, F, Fut>(policy: &RetryPolicy, name: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(policy, name, |e| matches!(e, Error::FloodWait { .. }), op).await
}

async fn retry_when<T, F, Fut>(
    policy: &RetryPolicy,
    name: &str,
    should_retry: fn(&Error) -> bool,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        let err = match op().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        if !should_retry(&err) {
            return Err(err);
        }
        if attempt >= max_attempts {
            tracing::error!("{name}: failed after {max_attempts} attempts: {err}");
            return Err(err);
        }

        let delay = match &err {
            Error::FloodWait { seconds } => {
                let wait = Duration::from_secs(u64::from(*seconds));
                if wait > policy.max_flood_wait {
                    tracing::error!(
                        "{name}: flood wait of {seconds}s exceeds the {}s limit",
                        policy.max_flood_wait.as_secs()
                    );
                    return Err(err);
                }
                wait
            }
            _ => policy.delay_after(attempt),
        };

        tracing::warn!(
            "{name}: attempt {attempt}/{max_attempts} failed: {err}. Retrying in {:.1}s...",
            delay.as_secs_f64()
        );
        sleep(delay).await;
        attempt += 1;
    }
}
