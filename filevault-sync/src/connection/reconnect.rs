//! Reconnection policy for the push-event link
//!
//! Fixed spacing between attempts with a bounded attempt budget. The budget
//! counts consecutive failed connection attempts; a successful connect
//! resets it.

use std::time::Duration;

/// Maximum number of consecutive failed attempts before giving up
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay between attempts
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Reconnection strategy with fixed spacing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectionStrategy {
    /// Consecutive failed attempts so far
    pub attempt: u32,
    /// Attempt budget
    pub max_attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl Default for ReconnectionStrategy {
    fn default() -> Self {
        Self::new(MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY)
    }
}

impl ReconnectionStrategy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            delay,
        }
    }

    /// Reset after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn has_attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Record a failed attempt
    ///
    /// Returns the delay before the next attempt, or `None` once the budget
    /// is spent.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        if self.has_attempts_remaining() {
            Some(self.delay)
        } else {
            None
        }
    }

    /// Human-readable status
    pub fn status(&self) -> String {
        format!(
            "Attempt {}/{}, retry delay: {:?}",
            self.attempt, self.max_attempts, self.delay
        )
    }
}
