//! Retry with exponential back-off and jitter for extraction calls.
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries on
//! transient errors. Everything else is returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::ExtractionError;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:**
/// - Network-level failures: timeout, connection reset.
/// - HTTP 429 and 5xx responses.
/// - Output that fails schema validation; a fresh sample usually conforms.
///
/// **Not retriable:**
/// - Other HTTP statuses (auth, bad request).
/// - An undecodable response envelope.
/// - An explicit refusal.
pub(crate) fn is_retriable(err: &ExtractionError) -> bool {
    match err {
        ExtractionError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        ExtractionError::Status { status, .. } => *status == 429 || (500..600).contains(status),
        ExtractionError::InvalidOutput(_) => true,
        ExtractionError::Deserialize { .. }
        | ExtractionError::Refused(_)
        | ExtractionError::InvalidBaseUrl(_) => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
///
/// The n-th retry sleeps `backoff_base_ms × 2ⁿ⁻¹ ± 25 %`, capped at 30 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ExtractionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExtractionError>>,
{
    const MAX_DELAY_MS: u64 = 30_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "extraction failed, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn rate_limit_and_server_errors_are_retriable() {
        for status in [429, 500, 503] {
            assert!(is_retriable(&ExtractionError::Status {
                status,
                body: String::new()
            }));
        }
    }

    #[test]
    fn auth_errors_and_refusals_are_not_retriable() {
        assert!(!is_retriable(&ExtractionError::Status {
            status: 401,
            body: String::new()
        }));
        assert!(!is_retriable(&ExtractionError::Refused("no".to_owned())));
    }

    #[test]
    fn schema_violations_are_retriable() {
        assert!(is_retriable(&ExtractionError::InvalidOutput(
            "missing field".to_owned()
        )));
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(ExtractionError::InvalidOutput("bad".to_owned()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ExtractionError::Status {
                    status: 503,
                    body: String::new(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(ExtractionError::Status { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "1 attempt + 2 retries");
    }

    #[tokio::test]
    async fn does_not_retry_refusal() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ExtractionError::Refused("policy".to_owned()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
