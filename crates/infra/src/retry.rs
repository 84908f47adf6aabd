//! Bounded retry for optimistic-concurrency failures.

use crate::config::RetrySettings;
use crate::error::ServiceResult;

/// Run `op`, retrying only while it fails with `ConcurrentModification`.
///
/// `op` must re-read whatever it depends on; every attempt sees fresh state.
pub fn with_retry<T>(
    settings: &RetrySettings,
    mut op: impl FnMut() -> ServiceResult<T>,
) -> ServiceResult<T> {
    let max = settings.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < max => {
                tracing::debug!(attempt, max, error = %err, "retrying after concurrent modification");
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use boxflow_core::DomainError;

    #[test]
    fn retries_concurrency_until_success() {
        let mut calls = 0;
        let out = with_retry(&RetrySettings { max_attempts: 3 }, || {
            calls += 1;
            if calls < 3 {
                Err(ServiceError::from(DomainError::concurrent("busy")))
            } else {
                Ok(calls)
            }
        })
        .unwrap();
        assert_eq!(out, 3);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let mut calls = 0;
        let err = with_retry(&RetrySettings::default(), || -> ServiceResult<()> {
            calls += 1;
            Err(DomainError::validation("no").into())
        })
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(!err.is_retryable());
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let err = with_retry(&RetrySettings { max_attempts: 2 }, || -> ServiceResult<()> {
            calls += 1;
            Err(DomainError::concurrent("busy").into())
        })
        .unwrap_err();
        assert_eq!(calls, 2);
        assert!(err.is_retryable());
    }
}
