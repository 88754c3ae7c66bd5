//! Exponential-backoff retry combinator.
//!
//! Wraps any fallible async call with the adapter-wide policy: transient
//! transport failures and venue 5xx responses are retried with doubling
//! delays; everything else surfaces immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::client::BinanceError;

/// Backoff policy: `delay(n) = clamp(multiplier * 2^n, min, max)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub multiplier: Duration,
    pub min: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            multiplier: Duration::from_secs(1),
            min: Duration::from_secs(2),
            max: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.saturating_mul(2u32.saturating_pow(attempt - 1));
        exp.clamp(self.min, self.max)
    }
}

/// Run `op` until it succeeds, fails non-retryably, or the attempt budget
/// is exhausted (in which case the last error is returned).
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> Result<T, BinanceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BinanceError>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    op_name, attempt, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
