use crate::{Error, Result, RetryPolicy};
use backon::{BlockingRetryable, ExponentialBuilder};
use std::time::Duration;

/// Runs a store call, retrying [`Error::Unavailable`] with exponential
/// backoff. Other errors are returned on the first occurrence.
///
/// Exhaustion surfaces as `Unavailable` naming the attempt count.
pub(crate) fn with_retry<T, F>(policy: &RetryPolicy, what: &str, op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    // backon counts retries, not attempts.
    let backoff = ExponentialBuilder::default()
        .with_min_delay(policy.initial_backoff)
        .with_max_delay(policy.max_backoff)
        .with_factor(policy.multiplier)
        .with_max_times(policy.max_attempts.saturating_sub(1) as usize);

    let mut retries = 0_u32;
    let result = op
        .retry(backoff)
        .sleep(std::thread::sleep)
        .when(|err: &Error| err.is_retryable())
        .notify(|err: &Error, delay: Duration| {
            retries += 1;
            tracing::warn!(
                operation = what,
                attempt = retries,
                backoff_ms = delay.as_millis() as u64,
                error = %err,
                "retrying store call"
            );
        })
        .call();

    result.map_err(|err| match err {
        Error::Unavailable { reason } if retries > 0 => Error::unavailable(format!(
            "{what} failed after {} attempts: {reason}",
            retries + 1
        )),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    #[test]
    fn recovers_from_transient_failures() {
        let calls = Cell::new(0);
        let value = with_retry(&fast(3), "find", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Error::unavailable("flaky"))
            } else {
                Ok(7)
            }
        })
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let err = with_retry(&fast(3), "put_new", || {
            calls.set(calls.get() + 1);
            Err::<(), _>(Error::unavailable("disk full"))
        })
        .unwrap_err();
        assert_eq!(calls.get(), 3);
        assert_eq!(
            err,
            Error::unavailable("put_new failed after 3 attempts: disk full")
        );
    }

    #[test]
    fn does_not_retry_logical_errors() {
        let calls = Cell::new(0);
        let err = with_retry(&fast(5), "transition", || {
            calls.set(calls.get() + 1);
            Err::<(), _>(Error::conflict("138875005", "modified"))
        })
        .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(matches!(err, Error::Conflict { .. }));
    }
}
