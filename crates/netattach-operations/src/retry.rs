use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::config::Config;
use crate::error::Result;

/// How often an external call is attempted before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.retry_attempts, config.retry_delay())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

/// Runs `f` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up. Returns the last error on giving up.
///
/// # Errors
///
/// Returns the error of the last attempt.
pub fn retry<T, F>(policy: RetryPolicy, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!(operation, attempt, attempts, error = %err, "transient failure, retrying");
                if !policy.delay.is_zero() {
                    thread::sleep(policy.delay);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationError;

    fn unavailable() -> OperationError {
        OperationError::Unavailable {
            system: "bridge",
            operation: "add_port",
            reason: "timeout".to_string(),
        }
    }

    #[test]
    fn succeeds_after_transient_failures() -> anyhow::Result<()> {
        let mut calls = 0;

        let value = retry(RetryPolicy::new(3, Duration::ZERO), "add_port", || {
            calls += 1;
            if calls < 3 { Err(unavailable()) } else { Ok(calls) }
        })?;

        assert_eq!(value, 3);
        Ok(())
    }

    #[test]
    fn gives_up_after_configured_attempts() {
        let mut calls = 0;

        let result: Result<()> = retry(RetryPolicy::new(4, Duration::ZERO), "add_port", || {
            calls += 1;
            Err(unavailable())
        });

        assert!(matches!(result, Err(OperationError::Unavailable { .. })));
        assert_eq!(calls, 4);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let mut calls = 0;

        let result: Result<()> = retry(RetryPolicy::new(5, Duration::ZERO), "put_port_record", || {
            calls += 1;
            Err(OperationError::AlreadyExists("port record".to_string()))
        });

        assert!(matches!(result, Err(OperationError::AlreadyExists(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_attempts_still_calls_once() {
        let mut calls = 0;

        let _ = retry(RetryPolicy::new(0, Duration::ZERO), "noop", || {
            calls += 1;
            Ok::<_, OperationError>(())
        });

        assert_eq!(calls, 1);
    }

    #[test]
    fn policy_follows_config() {
        let config = Config {
            retry_attempts: 7,
            retry_delay_ms: 25,
            ..Config::default()
        };

        let policy = RetryPolicy::from_config(&config);

        assert_eq!(policy, RetryPolicy::new(7, Duration::from_millis(25)));
    }
}
