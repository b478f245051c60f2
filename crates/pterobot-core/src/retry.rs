//! Retry classification and exponential backoff for panel calls.
//!
//! Every panel HTTP attempt is classified into an [`Attempt`] before any
//! retry decision is made:
//!
//! | Attempt | Cause | Policy |
//! |---------|-------|--------|
//! | `Response` | 2xx, or 4xx other than 429 | returned to the caller, never retried |
//! | `RateLimited` | 429 | backoff, give up after `max_rate_limit_attempts` |
//! | `Transient` | 5xx, timeout, connection failure | backoff, give up after `max_transient_attempts` |
//!
//! The two budgets are counted independently per logical operation.

use std::time::Duration;

use pterobot_types::PanelApiError;
use rand::Rng;

use crate::config::RetryConfig;
use crate::panel::PanelResponse;

/// Outcome of one classified HTTP attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    /// A final answer: success, or a client error that must not be retried.
    Response(PanelResponse),
    /// The panel asked us to slow down.
    RateLimited {
        /// Server-suggested wait from the `Retry-After` header.
        retry_after: Option<Duration>,
    },
    /// The panel could not be reached or failed internally.
    Transient {
        /// What went wrong, for logs and the terminal error.
        detail: String,
    },
}

impl Attempt {
    /// Classify a received response by status code.
    pub fn classify(response: PanelResponse) -> Self {
        match response.status {
            429 => Self::RateLimited {
                retry_after: response.retry_after,
            },
            500..=599 => Self::Transient {
                detail: format!("HTTP {}: {}", response.status, response.error_detail()),
            },
            _ => Self::Response(response),
        }
    }
}

/// Bounds and delays for retrying panel calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Rate-limit answers tolerated; the last one is terminal.
    pub max_rate_limit_attempts: u32,
    /// Transient failures tolerated; the last one is terminal.
    pub max_transient_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy from configuration.
    pub const fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_rate_limit_attempts: config.max_rate_limit_attempts,
            max_transient_attempts: config.max_transient_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before retry number `retry` (1-based).
    ///
    /// Exponential (`base * 2^(retry-1)`, capped at `max_delay`) with equal
    /// jitter: the result is uniformly drawn from the upper half of the
    /// exponential step. A server-provided `Retry-After` replaces the
    /// computed value, still capped.
    pub fn backoff(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
        let step = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let step_ms = u64::try_from(step.as_millis()).unwrap_or(u64::MAX);
        let half = step_ms.checked_div(2).unwrap_or(0);
        let jitter = rand::rng().random_range(0..=step_ms.saturating_sub(half));
        Duration::from_millis(half.saturating_add(jitter))
    }

    /// Start a fresh budget for one logical operation.
    pub const fn budget(&self) -> RetryBudget<'_> {
        RetryBudget {
            policy: self,
            rate_limited: 0,
            transient: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Per-operation retry counters.
#[derive(Debug)]
pub struct RetryBudget<'a> {
    policy: &'a RetryPolicy,
    rate_limited: u32,
    transient: u32,
}

impl RetryBudget<'_> {
    /// Record a rate-limit answer.
    ///
    /// Returns the delay before the next attempt, or
    /// [`PanelApiError::RateLimited`] once the bound is reached.
    pub fn on_rate_limited(
        &mut self,
        retry_after: Option<Duration>,
    ) -> Result<Duration, PanelApiError> {
        self.rate_limited = self.rate_limited.saturating_add(1);
        if self.rate_limited >= self.policy.max_rate_limit_attempts {
            return Err(PanelApiError::RateLimited {
                attempts: self.rate_limited,
            });
        }
        Ok(self.policy.backoff(self.rate_limited, retry_after))
    }

    /// Record a transient failure.
    ///
    /// Returns the delay before the next attempt, or
    /// [`PanelApiError::Unavailable`] once the bound is reached.
    pub fn on_transient(&mut self, detail: &str) -> Result<Duration, PanelApiError> {
        self.transient = self.transient.saturating_add(1);
        if self.transient >= self.policy.max_transient_attempts {
            return Err(PanelApiError::Unavailable {
                attempts: self.transient,
                detail: detail.to_owned(),
            });
        }
        Ok(self.policy.backoff(self.transient, None))
    }

    /// Total failed attempts recorded so far.
    pub const fn failures(&self) -> u32 {
        self.rate_limited.saturating_add(self.transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_rate_limit_attempts: 3,
            max_transient_attempts: 2,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        }
    }

    #[test]
    fn backoff_grows_within_jitter_band() {
        let policy = policy(100, 10_000);
        for retry in 1..=5_u32 {
            let step = 100_u64 * 2_u64.pow(retry - 1);
            let delay = u64::try_from(policy.backoff(retry, None).as_millis()).unwrap_or(0);
            assert!(delay >= step / 2, "retry {retry}: {delay} < {}", step / 2);
            assert!(delay <= step, "retry {retry}: {delay} > {step}");
        }
    }

    #[test]
    fn backoff_is_capped() {
        let policy = policy(1_000, 1_500);
        for _ in 0..20 {
            assert!(policy.backoff(10, None) <= Duration::from_millis(1_500));
        }
        assert!(policy.backoff(u32::MAX, None) <= Duration::from_millis(1_500));
    }

    #[test]
    fn retry_after_hint_wins_but_is_capped() {
        let policy = policy(100, 2_000);
        assert_eq!(
            policy.backoff(1, Some(Duration::from_millis(750))),
            Duration::from_millis(750)
        );
        assert_eq!(
            policy.backoff(1, Some(Duration::from_secs(60))),
            Duration::from_millis(2_000)
        );
    }

    #[test]
    fn rate_limit_budget_exhausts_at_bound() {
        let policy = policy(0, 0);
        let mut budget = policy.budget();
        assert!(budget.on_rate_limited(None).is_ok());
        assert!(budget.on_rate_limited(None).is_ok());
        assert_eq!(
            budget.on_rate_limited(None),
            Err(PanelApiError::RateLimited { attempts: 3 })
        );
    }

    #[test]
    fn transient_budget_is_independent() {
        let policy = policy(0, 0);
        let mut budget = policy.budget();
        assert!(budget.on_rate_limited(None).is_ok());
        assert!(budget.on_transient("HTTP 502").is_ok());
        assert!(matches!(
            budget.on_transient("HTTP 503"),
            Err(PanelApiError::Unavailable { attempts: 2, .. })
        ));
        assert_eq!(budget.failures(), 3);
    }

    #[test]
    fn classify_by_status() {
        let response = |status| PanelResponse {
            status,
            body: serde_json::Value::Null,
            retry_after: None,
        };
        assert!(matches!(Attempt::classify(response(200)), Attempt::Response(_)));
        assert!(matches!(Attempt::classify(response(404)), Attempt::Response(_)));
        assert!(matches!(Attempt::classify(response(429)), Attempt::RateLimited { .. }));
        assert!(matches!(Attempt::classify(response(503)), Attempt::Transient { .. }));
    }
}
