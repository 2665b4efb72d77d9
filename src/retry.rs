//! Exponential backoff for transient transfer failures.
//!
//! Only errors that report [`crate::error::RemoteError::is_retryable`] are retried; a
//! rejected login or a permanent 5xx reply fails on the first attempt.

use crate::error::RemoteResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// `min(base * 2^attempt, max)` with ±25% jitter, never below 10ms.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let raw = (base_ms * 2.0_f64.powi(attempt.min(30) as i32)).min(max_ms);
        let jittered = raw * (1.0 + 0.25 * jitter_factor());
        Duration::from_millis(jittered.max(10.0) as u64)
    }
}

/// Run `op`, retrying retryable errors with backoff.
pub fn retry<T, F>(policy: &RetryPolicy, label: &str, mut op: F) -> RemoteResult<T>
where
    F: FnMut() -> RemoteResult<T>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{label}: {e} (retry {}/{} in {}ms)",
                    attempt + 1,
                    policy.max_retries,
                    delay.as_millis()
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Jitter in `[-1.0, 1.0]` from a small LCG seeded by the clock.
fn jitter_factor() -> f64 {
    static SEED: AtomicU64 = AtomicU64::new(0);

    if SEED.load(Ordering::Relaxed) == 0 {
        let init = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64 | 1)
            .unwrap_or(12345);
        SEED.compare_exchange(0, init, Ordering::Relaxed, Ordering::Relaxed)
            .ok();
    }

    let old = SEED
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
            Some(
                x.wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407),
            )
        })
        .unwrap_or(42);
    (old as f64 / u64::MAX as f64) * 2.0 - 1.0
}
