use crate::error::{HealerError, Result};
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Maximum backoff cap to prevent excessively long waits.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Decide whether a failure is transient.
///
/// Rate limiting, 5xx responses, timeouts and connection trouble are retried.
/// Client errors and anything carrying "invalid" or "unauthorized" are not.
pub fn is_retryable(err: &HealerError) -> bool {
    match err {
        HealerError::Timeout { .. } => return true,
        HealerError::Http(e) if e.is_timeout() || e.is_connect() => return true,
        HealerError::Configuration(_)
        | HealerError::ProviderNotConfigured(_)
        | HealerError::PlanParse(_)
        | HealerError::Authentication(_) => return false,
        _ => {}
    }

    let msg = err.to_string().to_lowercase();

    let non_retryable = ["400", "401", "403", "404", "invalid", "unauthorized"];
    if non_retryable.iter().any(|p| msg.contains(p)) {
        return false;
    }

    let retryable = [
        "429",
        "500",
        "502",
        "503",
        "504",
        "timeout",
        "timed out",
        "connection refused",
        "connection reset",
    ];
    retryable.iter().any(|p| msg.contains(p))
}

/// Retry an async operation with exponential backoff and a little jitter.
///
/// `max_retries` of 0 runs the operation once. Non-retryable errors return
/// immediately.
pub async fn retry_with_backoff<F, Fut, T>(
    max_retries: u32,
    initial_delay: Duration,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt >= max_retries || !is_retryable(&err) {
                    return Err(err);
                }

                debug!(
                    attempt = attempt + 1,
                    total = max_retries + 1,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );

                tokio::time::sleep(with_jitter(delay)).await;
                delay = (delay * 2).min(MAX_DELAY);
                attempt += 1;
            }
        }
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let spread = (delay.as_millis() as u64 / 10).max(1);
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..spread))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let result = retry_with_backoff(3, Duration::from_millis(1), || async {
            Ok::<_, HealerError>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retries_on_retryable_error() {
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(3, Duration::from_millis(1), || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(HealerError::ApiRequest("503 service unavailable".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_on_client_error() {
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(3, Duration::from_millis(1), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(HealerError::ApiRequest("401 unauthorized".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(2, Duration::from_millis(1), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(HealerError::Store("502 bad gateway".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&HealerError::ApiRequest("429 Too Many Requests".into())));
        assert!(is_retryable(&HealerError::ApiRequest("connection reset by peer".into())));
        assert!(is_retryable(&HealerError::timeout("plan generation", 30)));

        assert!(!is_retryable(&HealerError::ApiRequest("404 Not Found".into())));
        assert!(!is_retryable(&HealerError::PlanParse("503 in body".into())));
        assert!(!is_retryable(&HealerError::ApiRequest("something odd".into())));
    }
}
