use core::{future::Future, iter::successors, time::Duration};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{config::millis, error::Error};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(rename = "initial_delay_ms", with = "millis")]
    pub initial_delay: Duration,
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            backoff: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Sleeps taken between consecutive attempts: `d, d*b, d*b^2, ...`,
    /// one fewer than `max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let backoff = self.backoff;
        successors(Some(self.initial_delay), move |d| {
            Some(Duration::try_from_secs_f64(d.as_secs_f64() * backoff).unwrap_or(Duration::MAX))
        })
        .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

#[derive(Debug)]
pub enum Retried<T> {
    Done(T),
    /// Every attempt failed with a retryable error; `last` is the final one.
    Exhausted { attempts: u32, last: Error },
    /// Failed with an error retrying cannot fix.
    Failed(Error),
    Cancelled,
}

/// Runs `op` until it succeeds, fails permanently, or `policy.max_attempts`
/// is used up, sleeping with exponential backoff in between. Cancellation is
/// honoured before each attempt and while sleeping, never mid-attempt.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut op: F,
) -> Retried<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let max = policy.max_attempts.max(1);
    let mut delays = policy.delays();
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Retried::Cancelled;
        }
        attempt += 1;

        let e = match op().await {
            Ok(r) => return Retried::Done(r),
            Err(e) if !e.is_retryable() => return Retried::Failed(e),
            Err(e) => e,
        };

        if e.is_network() {
            tracing::warn!(target: "retry", "{what}: network error (attempt {attempt}/{max}): {e}");
        } else {
            tracing::warn!(target: "retry", "{what}: error (attempt {attempt}/{max}): {e}");
        }

        let Some(delay) = delays.next() else {
            return Retried::Exhausted {
                attempts: attempt,
                last: e,
            };
        };

        tokio::select! {
            () = cancel.cancelled() => return Retried::Cancelled,
            () = tokio::time::sleep(delay) => {}
        }
    }
}
