//! Jittered exponential backoff policy plus a cancellation-aware sleep used
//! by the sampler between retries.

use crate::source::reading::ErrorKind;
use anyhow::{anyhow, Result};
use rand::Rng;
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Multiple of the poll interval applied to the first retry after a
/// provider-signaled rate limit.
const RATE_LIMITED_BASE_MULTIPLIER: u32 = 4;
/// Upper bound of the random jitter fraction added to each delay.
const JITTER_RATIO: f64 = 0.25;

/// Exponential backoff parameterized by the normal poll interval.
///
/// The first retry waits one full interval and doubles per consecutive
/// failure, capped at `cap_multiplier` intervals. Rate-limited failures
/// start higher so a single 429 always waits longer than a single timeout,
/// jitter included.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    pub fn new(poll_interval: Duration, cap_multiplier: u32) -> Self {
        let cap_multiplier = cap_multiplier.max(1);
        Self {
            base: poll_interval,
            cap: poll_interval.saturating_mul(cap_multiplier),
        }
    }

    /// Delay before the next retry, given the failure kind and the number of
    /// consecutive failures observed so far (1-based).
    pub fn delay(&self, kind: ErrorKind, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(31);
        let mut multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        if matches!(kind, ErrorKind::RateLimited) {
            multiplier = multiplier.saturating_mul(RATE_LIMITED_BASE_MULTIPLIER);
        }

        let mut delay = self.base.saturating_mul(multiplier);
        if delay > self.cap {
            delay = self.cap;
        }
        self.with_jitter(delay)
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    fn with_jitter(&self, delay: Duration) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..JITTER_RATIO);
        let jittered = delay.saturating_add(delay.mul_f64(jitter));
        if jittered > self.cap {
            self.cap
        } else {
            jittered
        }
    }
}

pub(crate) async fn sleep_with_cancellation(
    delay: Duration,
    cancellation: Option<&CancellationToken>,
) -> Result<()> {
    if delay.is_zero() {
        yield_now().await;
        return Ok(());
    }

    if let Some(token) = cancellation {
        tokio::select! {
            _ = token.cancelled() => Err(anyhow!("backoff interrupted by shutdown")),
            _ = sleep(delay) => Ok(()),
        }
    } else {
        sleep(delay).await;
        Ok(())
    }
}
