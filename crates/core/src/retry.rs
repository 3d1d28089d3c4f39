//! Fixed-delay retry for HTTP calls.
//!
//! Only connection-level failures (refused, reset, closed early, TLS
//! handshake) are retried. Anything that produced an HTTP response is returned to the
//! caller on the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Default number of attempts before a backend is declared unavailable.
pub const DEFAULT_ATTEMPTS: u32 = 10;

/// Default pause between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Bounded, linear retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt hit a transient failure; `last` is the final one.
    Exhausted { attempts: u32, last: E },
    /// A non-transient failure; not retried.
    Failed(E),
}

/// Run `op` until it succeeds, fails permanently, or `policy.attempts`
/// transient failures have been seen.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    context: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(context, attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if is_transient(&e) => {
                if attempt >= attempts {
                    warn!(context, attempts, error = %e, "giving up after repeated connection failures");
                    return Err(RetryError::Exhausted { attempts, last: e });
                }
                warn!(context, attempt, error = %e, "connection failure, retrying");
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(RetryError::Failed(e)),
        }
    }
}

/// Refused connections and TLS handshake failures surface from reqwest as
/// connect errors. A connection that is reset or closed before the response
/// arrives surfaces as a request error; the cause is found in the source chain.
pub fn is_transient(err: &reqwest::Error) -> bool {
    if err.is_connect() {
        return true;
    }
    if !err.is_request() || err.status().is_some() {
        return false;
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        if let Some(h) = cause.downcast_ref::<hyper::Error>() {
            if h.is_incomplete_message() || h.is_closed() {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum FakeError {
        Connect,
        Status(u16),
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn transient(e: &FakeError) -> bool {
        *e == FakeError::Connect
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_connection_is_attempted_exactly_ten_times() {
        let calls = Cell::new(0u32);
        let result: Result<(), _> = with_retry(RetryPolicy::default(), "test", transient, || {
            calls.set(calls.get() + 1);
            async { Err(FakeError::Connect) }
        })
        .await;

        assert_eq!(calls.get(), 10);
        assert!(matches!(
            result,
            Err(RetryError::Exhausted {
                attempts: 10,
                last: FakeError::Connect
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_errors_are_not_retried() {
        let calls = Cell::new(0u32);
        let result: Result<(), _> = with_retry(RetryPolicy::default(), "test", transient, || {
            calls.set(calls.get() + 1);
            async { Err(FakeError::Status(500)) }
        })
        .await;

        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(RetryError::Failed(FakeError::Status(500)))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = Cell::new(0u32);
        let result = with_retry(RetryPolicy::default(), "test", transient, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(FakeError::Connect)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_refused_connection_is_transient() {
        let client = reqwest::Client::new();
        let err = client
            .get("http://127.0.0.1:1/unreachable")
            .send()
            .await
            .unwrap_err();
        assert!(is_transient(&err));
    }

    #[tokio::test]
    async fn test_connection_dropped_before_reply_is_retried() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicU32::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });

        let client = reqwest::Client::new();
        let url = format!("http://{}/scripts/", addr);
        let policy = RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
        };
        let result = with_retry(policy, "test", is_transient, || client.get(&url).send()).await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_error_status_is_not_transient() {
        let (base, _log) = crate::test_support::serve(vec![
            crate::test_support::CannedResponse::text(502, "bad gateway"),
        ])
        .await;
        let err = reqwest::get(format!("{}/x", base))
            .await
            .unwrap()
            .error_for_status()
            .unwrap_err();
        assert!(!is_transient(&err));
    }
}
