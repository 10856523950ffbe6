//! Exponential backoff shared by the fetch and translation boundaries.
//!
//! The delay before retry `n` (1-based) is
//!
//! ```text
//! delay = min(base_delay * 2^(n-1), max_delay) + random_jitter(0..=jitter)
//! ```
//!
//! Whether an error is worth retrying is decided by the caller, so the same
//! policy type serves `SourceError` (retry on timeout/network/rate limit) and
//! `TranslationError` (retry on transient only).

use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` means a single attempt.
    pub max_retries: usize,
    #[serde(with = "millis")]
    pub base_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Upper bound of the random extra delay added to every backoff.
    #[serde(with = "millis")]
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Fetch policy: 2 extra attempts, 2s base.
    pub fn for_fetch() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Translation policy: 3 extra attempts, 1s base.
    pub fn for_translation() -> Self {
        Self::default()
    }

    /// A policy that retries immediately. Used by tests.
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }

    fn jittered(&self, attempt: usize) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=jitter_ms)
        };
        self.backoff(attempt) + Duration::from_millis(extra)
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or the policy
/// is exhausted. The last error is returned unchanged.
pub async fn retry_async<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let total_t0 = Instant::now();
    let mut attempt = 0usize;

    loop {
        let attempt_t0 = Instant::now();
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if !is_retryable(&e) {
                    debug!(label, attempt, error = %e, "not retryable; giving up");
                    return Err(e);
                }
                if attempt > policy.max_retries {
                    warn!(
                        label,
                        attempt,
                        max = policy.max_retries,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        error = %e,
                        "retries exhausted"
                    );
                    return Err(e);
                }

                let delay = policy.jittered(attempt);
                warn!(
                    label,
                    attempt,
                    max = policy.max_retries,
                    elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                    ?delay,
                    error = %e,
                    "attempt failed; backing off"
                );
                sleep(delay).await;
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
