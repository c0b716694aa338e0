use std::time::Duration;

use parley_shared::constants::{RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS};

/// Reconnect backoff schedule.
///
/// Attempt 0 waits the base delay; every further failed attempt doubles the
/// wait, capped at the maximum.  The attempt counter belongs to the caller
/// and resets whenever a connection is established, so a long-lived session
/// that drops again starts over at the base delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let bounded = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(bounded)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS)
    }
}
