//! Exponential backoff between reconnect attempts.

use std::time::Duration;

pub const INITIAL_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Doubling delay, starting at one second and capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(max: Duration) -> Self {
        Self {
            current: INITIAL_RECONNECT_INTERVAL.min(max),
            max,
        }
    }

    /// Return the delay to wait now and double the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = INITIAL_RECONNECT_INTERVAL.min(self.max);
    }
}
