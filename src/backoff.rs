//! Bounded exponential backoff for automatic reconnection.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Attempt counter plus the doubling schedule.
///
/// The delay for the retry scheduled while the counter is `k` is
/// `min(base * 2^k, cap)`. The counter never exceeds `max_attempts`; once it
/// gets there [`next_delay`](Self::next_delay) returns `None` until
/// [`reset`](Self::reset) is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    base_ms: u64,
    cap_ms: u64,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        ReconnectPolicy {
            base_ms: base.as_millis() as u64,
            cap_ms: cap.as_millis() as u64,
            max_attempts,
            attempts: 0,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay(), config.max_attempts)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// `min(base * 2^attempt, cap)`, saturating instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.cap_ms))
    }

    /// Consume one attempt and return the delay to wait before it, or `None`
    /// when the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.delay_for(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}
