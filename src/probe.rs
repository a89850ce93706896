//! One-shot reachability check for the analytics store.
//!
//! The verdict is computed at most once per service context and never
//! re-evaluated, whether it came out healthy or not: a store that was
//! unreachable at session start stays disabled for the rest of the session.

use crate::store::AnalyticsStore;
use std::sync::OnceLock;
use std::time::Duration;

/// Attempt budget and backoff for the one-shot reachability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub max_attempts: u32,
    /// Wait after failed attempt `n` is `2^n * backoff_base`.
    pub backoff_base: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl ProbePolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base: Duration::ZERO,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

/// Memoized probe outcome; `Untested` until the first delivery needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Untested,
    Healthy,
    Unhealthy,
}

#[derive(Debug)]
pub struct ConnectionProbe {
    policy: ProbePolicy,
    table: String,
    verdict: OnceLock<bool>,
}

impl ConnectionProbe {
    pub fn new(table: impl Into<String>, policy: ProbePolicy) -> Self {
        Self {
            policy,
            table: table.into(),
            verdict: OnceLock::new(),
        }
    }

    /// Concurrent first callers block on the single in-flight probe rather
    /// than starting their own.
    pub fn ensure_healthy(&self, store: &dyn AnalyticsStore) -> bool {
        *self
            .verdict
            .get_or_init(|| self.run(store, std::thread::sleep))
    }

    pub fn state(&self) -> HealthState {
        match self.verdict.get() {
            None => HealthState::Untested,
            Some(true) => HealthState::Healthy,
            Some(false) => HealthState::Unhealthy,
        }
    }

    pub fn is_tested(&self) -> bool {
        self.verdict.get().is_some()
    }

    fn run<S: FnMut(Duration)>(&self, store: &dyn AnalyticsStore, mut sleep: S) -> bool {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match store.health_check(&self.table) {
                Ok(()) => return true,
                Err(err) => {
                    tracing::debug!(
                        "analytics store connection test failed (attempt {}/{}): {}",
                        attempt,
                        attempts,
                        err
                    );
                    if attempt < attempts {
                        sleep(self.policy.delay_after(attempt));
                    }
                }
            }
        }

        tracing::warn!(
            "Analytics database connection failed. Analytics will be disabled for this session."
        );
        false
    }
}
