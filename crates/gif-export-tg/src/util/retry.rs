use crate::prelude::*;
use chrono::prelude::*;
use retry_policies::policies::ExponentialBackoff;
use retry_policies::{RetryDecision, RetryPolicy};
use std::future::Future;
use std::time::Duration;

pub(crate) fn default_retry_policy() -> ExponentialBackoff {
    // Retry exponentially increasing intervals between attempts.
    ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(500), Duration::from_secs(8))
        .build_with_max_retries(3)
}

/// Retries the HTTP operation until it either succeeds, fails with an error
/// that `is_retryable` rejects, or the retry policy gives up.
///
/// Requests with multipart bodies can't be cloned, so [`reqwest`]'s
/// request-level retry machinery doesn't work for them. The closure has to
/// rebuild the request from scratch on every attempt instead.
pub(crate) async fn retry_http<T, E, Fut>(
    f: impl Fn() -> Fut,
    is_retryable: impl Fn(&E) -> bool,
) -> Fut::Output
where
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    let policy = default_retry_policy();
    let mut attempt = 0;
    loop {
        let err = match f().await {
            Ok(output) => {
                if attempt > 0 {
                    warn!(%attempt, "HTTP request succeeded after a retry");
                }
                return Ok(output);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            if attempt > 0 {
                warn!(%attempt, "HTTP request failed with a non-retryable error after a retry");
            }
            return Err(err);
        }

        let execute_after = match policy.should_retry(attempt) {
            RetryDecision::Retry { execute_after } => execute_after,
            RetryDecision::DoNotRetry => {
                warn!(%attempt, err = tracing_err(&err), "Giving up retrying HTTP request");
                return Err(err);
            }
        };

        let duration = (execute_after.signed_duration_since(Utc::now()))
            .to_std()
            .unwrap_or(Duration::ZERO);

        warn!(
            %attempt,
            err = tracing_err(&err),
            duration = tracing_duration(duration),
            "Sleeping before the next attempt",
        );

        tokio::time::sleep(duration).await;

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("transient: {0}")]
    struct TestError(bool);

    #[test_log::test(tokio::test(start_paused = true))]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);

        let result = retry_http(
            || async {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                if call < 2 {
                    return Err(TestError(true));
                }
                Ok(call)
            },
            |err| err.0,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn stops_on_non_retryable_error() {
        let calls = AtomicU32::new(0);

        let result = retry_http(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError(false))
            },
            |err| err.0,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);

        let result = retry_http(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError(true))
            },
            |err| err.0,
        )
        .await;

        assert!(result.is_err());
        // The first attempt plus 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
