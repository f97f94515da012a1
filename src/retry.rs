//! Bounded retry with an injectable clock

use std::time::Duration;

use log::{debug, warn};

use crate::clock::Clock;

/// How many times to try an operation and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Every attempt failed
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: Option<E>,
}

/// Run `op` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// `op` receives the 1-based attempt number. The clock sleeps `policy.delay`
/// between attempts, never after the last one. The loop cannot be cancelled
/// once started. A policy with zero attempts fails without calling `op`.
pub fn retry<T, E, F>(policy: &RetryPolicy, clock: &dyn Clock, mut op: F) -> Result<T, RetryExhausted<E>>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            clock.sleep(policy.delay);
        }

        debug!("Attempt {} of {}", attempt, policy.max_attempts);
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("Attempt {} failed: {}", attempt, e);
                last_error = Some(e);
            }
        }
    }

    warn!("Max retries exceeded ({} attempts)", policy.max_attempts);
    Err(RetryExhausted {
        attempts: policy.max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_first_success_stops_retrying() {
        let clock = ManualClock::new();
        let policy = RetryPolicy::default();
        let mut calls = 0;

        let result: Result<u32, RetryExhausted<String>> = retry(&policy, &clock, |attempt| {
            calls += 1;
            if attempt < 2 {
                Err("timeout".to_string())
            } else {
                Ok(attempt)
            }
        });

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn test_exhaustion_reports_last_error() {
        let clock = ManualClock::new();
        let policy = RetryPolicy {
            max_attempts: 4,
            delay: Duration::from_millis(250),
        };

        let result: Result<(), _> = retry(&policy, &clock, |attempt| Err(format!("failure {}", attempt)));

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(err.last_error.as_deref(), Some("failure 4"));
        // no wait after the final attempt
        assert_eq!(clock.sleeps().len(), 3);
    }

    #[test]
    fn test_zero_attempts_never_calls_op() {
        let clock = ManualClock::new();
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::from_secs(1),
        };

        let result: Result<(), RetryExhausted<String>> = retry(&policy, &clock, |_| panic!("must not run"));

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 0);
        assert!(err.last_error.is_none());
    }
}
