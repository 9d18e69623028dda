//! Retry/backoff state machine (C10).
//!
//! Grounded on the teacher's `execute_step_with_loop` exponential
//! backoff (`multiplier`/`max_interval` over a `LoopConfig`) and
//! `TachyonOpsClient::submit_report`'s `500ms * 2^attempt` retry
//! loop in the original `api_client.rs`. This generalizes both into
//! an explicit state machine with fixed/linear/exponential
//! strategies, an interval ceiling, and `U[0.5, 1.5]` jitter.

use crate::clock::Clock;
use crate::model::RetryPolicy;

pub struct RetryState<'a> {
    policy: &'a RetryPolicy,
    attempt: u32,
}

#[derive(Debug, PartialEq)]
pub enum RetryDecision {
    /// Wait this many milliseconds, then retry.
    RetryAfter(u64),
    /// Exhausted attempts, or the error kind is not retryable.
    GiveUp,
}

impl<'a> RetryState<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Decide whether to retry after a failed attempt whose error
    /// taxonomy code is `error_code`. Advances internal attempt
    /// count as a side effect when it decides to retry.
    pub fn next(&mut self, error_code: &str, clock: &dyn Clock) -> RetryDecision {
        self.attempt += 1;

        if self.policy.stop_on.iter().any(|c| c == error_code) {
            return RetryDecision::GiveUp;
        }
        if !self.policy.retry_on.is_empty() && !self.policy.retry_on.iter().any(|c| c == error_code) {
            return RetryDecision::GiveUp;
        }
        if self.attempt >= self.policy.max_attempts {
            return RetryDecision::GiveUp;
        }

        let base = match self.policy.strategy.as_str() {
            "linear" => self.policy.interval * self.attempt as f64,
            "exponential" => self.policy.interval * self.policy.multiplier.powi(self.attempt as i32 - 1),
            _ => self.policy.interval,
        };

        let mut seconds = base;
        if let Some(max) = self.policy.max_interval {
            seconds = seconds.min(max);
        }
        if self.policy.jitter {
            seconds *= clock.jitter();
            if let Some(max) = self.policy.max_interval {
                seconds = seconds.min(max);
            }
            seconds = seconds.max(0.0);
        }

        RetryDecision::RetryAfter((seconds * 1000.0).max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FixedClock;

    fn policy(strategy: &str, max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            strategy: strategy.to_string(),
            interval: 1.0,
            multiplier: 2.0,
            max_interval: None,
            jitter: false,
            retry_on: Vec::new(),
            stop_on: Vec::new(),
        }
    }

    #[test]
    fn fixed_strategy_uses_constant_interval() {
        let p = policy("fixed", 3);
        let clock = FixedClock::new(0);
        let mut state = RetryState::new(&p);
        assert_eq!(state.next("TIMEOUT_ERROR", &clock), RetryDecision::RetryAfter(1000));
        assert_eq!(state.next("TIMEOUT_ERROR", &clock), RetryDecision::GiveUp);
    }

    #[test]
    fn exponential_strategy_doubles_each_attempt() {
        let p = policy("exponential", 4);
        let clock = FixedClock::new(0);
        let mut state = RetryState::new(&p);
        assert_eq!(state.next("E", &clock), RetryDecision::RetryAfter(1000));
        assert_eq!(state.next("E", &clock), RetryDecision::RetryAfter(2000));
        assert_eq!(state.next("E", &clock), RetryDecision::RetryAfter(4000));
        assert_eq!(state.next("E", &clock), RetryDecision::GiveUp);
    }

    #[test]
    fn max_interval_caps_the_computed_wait() {
        let mut p = policy("exponential", 5);
        p.max_interval = Some(3.0);
        let clock = FixedClock::new(0);
        let mut state = RetryState::new(&p);
        state.next("E", &clock);
        state.next("E", &clock);
        let decision = state.next("E", &clock);
        assert_eq!(decision, RetryDecision::RetryAfter(3000));
    }

    #[test]
    fn stop_on_overrides_retry_on() {
        let mut p = policy("fixed", 5);
        p.retry_on = vec!["TIMEOUT_ERROR".to_string()];
        p.stop_on = vec!["TIMEOUT_ERROR".to_string()];
        let clock = FixedClock::new(0);
        let mut state = RetryState::new(&p);
        assert_eq!(state.next("TIMEOUT_ERROR", &clock), RetryDecision::GiveUp);
    }

    #[test]
    fn non_matching_retry_on_gives_up_immediately() {
        let mut p = policy("fixed", 5);
        p.retry_on = vec!["CONNECTION_ERROR".to_string()];
        let clock = FixedClock::new(0);
        let mut state = RetryState::new(&p);
        assert_eq!(state.next("TIMEOUT_ERROR", &clock), RetryDecision::GiveUp);
    }
}
