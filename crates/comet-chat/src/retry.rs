use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use comet_types::error::ChatError;

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f32,
    pub jitter_factor: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Delay before the attempt after `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let pow = self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = ((self.initial_backoff_ms as f32 * pow) as u64).min(self.max_backoff_ms);

        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        if jitter > 0.0 {
            let mut rng = rand::rng();
            let jitter_scale: f32 = rng.random_range(-jitter..=jitter);
            let jitter_ms = (delay_ms as f32 * jitter_scale).round();
            let adjusted = (delay_ms as i64 + jitter_ms as i64).max(0) as u64;
            return Duration::from_millis(adjusted);
        }

        Duration::from_millis(delay_ms)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent. Only [`ChatError::Transient`] is retried.
pub async fn with_retry<T, Op, Fut>(
    config: &RetryConfig,
    op_name: &'static str,
    mut operation: Op,
) -> Result<T, ChatError>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ChatError>>,
{
    let max = config.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt + 1 >= max => {
                warn!(op = op_name, attempts = max, "Giving up after transient failures: {}", e);
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay(attempt);
                debug!(
                    op = op_name,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retry backoff: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn backoff_progression_is_capped() {
        let cfg = RetryConfig {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 250,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        assert_eq!(cfg.delay(0), Duration::from_millis(100));
        assert_eq!(cfg.delay(1), Duration::from_millis(200));
        assert_eq!(cfg.delay(2), Duration::from_millis(250));
        assert_eq!(cfg.delay(9), Duration::from_millis(250));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let cfg = RetryConfig {
            jitter_factor: 0.5,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            ..fast_config()
        };
        for _ in 0..50 {
            let d = cfg.delay(2).as_millis() as f32;
            assert!((199.0..=601.0).contains(&d), "delay out of range: {}", d);
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = with_retry(&fast_config(), "test", move |_| {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ChatError::Transient("busy".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn budget_exhaustion_surfaces_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = with_retry(&fast_config(), "test", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err(ChatError::Transient("down".into())) }
        })
        .await;

        assert_eq!(result, Err(ChatError::Transient("down".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn state_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = with_retry(&fast_config(), "test", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err(ChatError::Validation("empty".into())) }
        })
        .await;

        assert!(matches!(result, Err(ChatError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
