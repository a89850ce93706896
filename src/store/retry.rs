use std::time::Duration;

/// Linear backoff: after failed attempt `n` the helper sleeps
/// `base_delay * n` before trying again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Run `operation` until it succeeds or `max_retries + 1` attempts have
/// failed, returning the last error in the latter case.
pub fn with_retry<T, E, F>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    with_retry_sleeping(policy, &mut operation, std::thread::sleep)
}

fn with_retry_sleeping<T, E, F, S>(
    policy: &RetryPolicy,
    operation: &mut F,
    mut sleep: S,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
    S: FnMut(Duration),
{
    let total = policy.total_attempts();
    let mut attempt = 1;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= total => return Err(err),
            Err(err) => {
                tracing::debug!(
                    "analytics store operation failed (attempt {}/{}), retrying: {}",
                    attempt,
                    total,
                    err
                );
                sleep(policy.delay_after(attempt));
                attempt += 1;
            }
        }
    }
}
