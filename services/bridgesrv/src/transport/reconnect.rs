//! Reconnection backoff policy
//!
//! The poll task drives reconnection: at the top of a cycle with the link
//! down it consults a [`ReconnectTracker`] to decide whether this tick may
//! attempt a connect, so failed devices are retried on an exponential
//! ladder instead of once per poll interval.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::ReconnectConfig;

/// Exponential backoff parameters
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Full jitter: each delay is drawn uniformly from 0..computed
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&ReconnectConfig> for BackoffPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        BackoffPolicy {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            jitter: config.jitter,
        }
    }
}

impl BackoffPolicy {
    /// Deterministic delay for the given failure count (jitter excluded):
    /// initial * multiplier^(failures-1), capped at max_delay.
    pub fn base_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exp = (failures - 1).min(31);
        let delay = self.initial_delay.mul_f64(self.multiplier.powi(exp as i32));
        delay.min(self.max_delay)
    }

    /// Delay with full jitter applied
    fn next_delay(&self, failures: u32) -> Duration {
        let base = self.base_delay(failures);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let millis = base.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }
}

/// Tracks consecutive connect failures and gates reattempt timing
#[derive(Debug)]
pub struct ReconnectTracker {
    policy: BackoffPolicy,
    failures: u32,
    not_before: Option<Instant>,
}

impl ReconnectTracker {
    pub fn new(policy: BackoffPolicy) -> Self {
        ReconnectTracker {
            policy,
            failures: 0,
            not_before: None,
        }
    }

    /// Whether a connect attempt is allowed right now
    pub fn should_attempt(&self, now: Instant) -> bool {
        match self.not_before {
            Some(at) => now >= at,
            None => true,
        }
    }

    /// Record a failed attempt and schedule the next window
    pub fn note_failure(&mut self, now: Instant) {
        self.failures = self.failures.saturating_add(1);
        let delay = self.policy.next_delay(self.failures);
        self.not_before = Some(now + delay);
    }

    /// Record a successful connect; the ladder resets
    pub fn note_success(&mut self) {
        self.failures = 0;
        self.not_before = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}
