use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::with_retries(1)
    }
}

impl RetryConfig {
    /// One initial attempt plus `retries` more, backing off from 200ms.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries as usize + 1,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            jitter_max: Some(Duration::from_millis(100)),
        }
    }

    /// Single attempt, never sleeps.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_max: None,
        }
    }
}

pub async fn retry_async_with_config<F, Fut, T, E>(
    operation: &str,
    config: RetryConfig,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts_left = config.max_attempts.max(1);
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 {
                    return Err(e);
                }

                tracing::debug!(
                    "{} failed ({}), retrying in {:?} ({} attempts left)",
                    operation,
                    e,
                    backoff,
                    attempts_left
                );

                let jitter = match config.jitter_max {
                    Some(jitter_max) if !jitter_max.is_zero() => {
                        let jitter_ms = jitter_max.as_millis() as u64;
                        Duration::from_millis(rand::random::<u64>() % (jitter_ms + 1))
                    }
                    _ => Duration::ZERO,
                };
                tokio::time::sleep(backoff + jitter).await;

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            jitter_max: None,
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_retries() {
        let counter = AtomicUsize::new(0);

        let res: Result<usize, &'static str> =
            retry_async_with_config("flaky", fast(3), || async {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("fail")
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(res, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_fails_after_max_attempts() {
        let counter = AtomicUsize::new(0);

        let res: Result<(), &'static str> =
            retry_async_with_config("always failing", fast(2), || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("always fail")
            })
            .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn once_makes_a_single_attempt() {
        let counter = AtomicUsize::new(0);

        let res: Result<(), &'static str> =
            retry_async_with_config("single", RetryConfig::once(), || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("nope")
            })
            .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn with_retries_counts_initial_attempt() {
        assert_eq!(RetryConfig::with_retries(0).max_attempts, 1);
        assert_eq!(RetryConfig::with_retries(1).max_attempts, 2);
    }
}
