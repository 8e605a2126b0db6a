//! Reconnection backoff policy.
//!
//! Pure: given how many attempts have failed and the current conditions,
//! decide whether to try again and how long to wait.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

/// Outcome of consulting the policy after a failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectDecision {
    /// Schedule retry number `attempt` (1-based) after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Stop; a manual connect is required.
    GiveUp,
}

/// Conditions the policy depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkConditions {
    pub background: bool,
    /// Metered network (cellular, hotspot).
    pub expensive: bool,
}

/// Exponential backoff with jitter and per-condition attempt caps.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    /// Delay before retry number `attempt` (0-based), before jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32, background: bool) -> Duration {
        let cap = if background {
            self.config.max_delay_background_secs
        } else {
            self.config.max_delay_foreground_secs
        };
        let exp = 2f64.powi(attempt.min(30) as i32);
        Duration::from_secs_f64((self.config.base_delay_secs * exp).min(cap))
    }

    /// Maximum number of failures tolerated under `conditions`.
    #[must_use]
    pub fn attempt_limit(&self, conditions: NetworkConditions) -> u32 {
        let mut limit = self.config.max_attempts;
        if conditions.background {
            limit = limit.min(self.config.max_background_attempts);
        }
        if conditions.expensive {
            limit = limit.min(self.config.max_expensive_failures);
        }
        limit
    }

    /// Decides what to do after `failures` consecutive failures.
    ///
    /// The loss of an established connection counts as the first failure.
    #[must_use]
    pub fn decide(&self, failures: u32, conditions: NetworkConditions) -> ReconnectDecision {
        let jitter = rand::thread_rng().gen_range(self.config.jitter_min..=self.config.jitter_max);
        self.decide_with_jitter(failures, conditions, jitter)
    }

    /// [`decide`](Self::decide) with an explicit jitter factor.
    #[must_use]
    pub fn decide_with_jitter(
        &self,
        failures: u32,
        conditions: NetworkConditions,
        jitter: f64,
    ) -> ReconnectDecision {
        if failures >= self.attempt_limit(conditions) {
            return ReconnectDecision::GiveUp;
        }
        let base = self.base_delay(failures.saturating_sub(1), conditions.background);
        ReconnectDecision::Retry {
            attempt: failures,
            delay: base.mul_f64(jitter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig::default())
    }

    #[test]
    fn delays_double_and_are_capped() {
        let p = policy();
        let delays: Vec<f64> = (1..=4)
            .map(|n| p.base_delay(n, false).as_secs_f64())
            .collect();
        assert_eq!(delays, vec![4.0, 8.0, 16.0, 30.0]);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(p.base_delay(0, false), Duration::from_secs(2));
        assert_eq!(p.base_delay(10, false), Duration::from_secs(30));
        assert_eq!(p.base_delay(10, true), Duration::from_secs(60));
    }

    #[test]
    fn jitter_scales_delay() {
        let p = policy();
        let fg = NetworkConditions::default();
        assert_eq!(
            p.decide_with_jitter(1, fg, 0.8),
            ReconnectDecision::Retry {
                attempt: 1,
                delay: Duration::from_secs_f64(1.6)
            }
        );

        for _ in 0..50 {
            match p.decide(3, fg) {
                ReconnectDecision::Retry { delay, .. } => {
                    let secs = delay.as_secs_f64();
                    assert!((6.4..=9.6).contains(&secs), "delay {}", secs);
                }
                ReconnectDecision::GiveUp => panic!("should retry"),
            }
        }
    }

    #[test]
    fn gives_up_after_eight_failures() {
        let p = policy();
        let fg = NetworkConditions::default();
        assert!(matches!(p.decide(7, fg), ReconnectDecision::Retry { .. }));
        assert_eq!(p.decide(8, fg), ReconnectDecision::GiveUp);
    }

    #[test]
    fn background_caps_attempts_at_three() {
        let p = policy();
        let bg = NetworkConditions {
            background: true,
            expensive: false,
        };
        assert!(matches!(p.decide(2, bg), ReconnectDecision::Retry { .. }));
        assert_eq!(p.decide(3, bg), ReconnectDecision::GiveUp);
    }

    #[test]
    fn expensive_network_stops_after_two_failures() {
        let p = policy();
        let metered = NetworkConditions {
            background: false,
            expensive: true,
        };
        assert!(matches!(p.decide(1, metered), ReconnectDecision::Retry { .. }));
        assert_eq!(p.decide(2, metered), ReconnectDecision::GiveUp);
    }
}
