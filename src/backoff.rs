//! Bounded exponential backoff for polling loops.

use std::time::Duration;

/// Delays between polls, doubling up to `max`, for at most `attempts` polls.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max: Duration,
    current: Duration,
    attempts: u32,
    used: u32,
}

impl ExponentialBackoff {
    /// Creates a backoff allowing `attempts` polls, starting at `initial` and capping at `max`.
    pub fn new(initial: Duration, max: Duration, attempts: u32) -> Self {
        Self {
            max,
            current: initial.min(max),
            attempts,
            used: 0,
        }
    }

    /// Number of polls recorded so far.
    pub fn used(&self) -> u32 {
        self.used
    }

    /// Returns true once the attempt budget is spent.
    pub fn is_exhausted(&self) -> bool {
        self.used >= self.attempts
    }

    /// Records a poll. Returns the delay to wait before the next one, or
    /// `None` when the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.used += 1;
        if self.is_exhausted() {
            return None;
        }

        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        Some(delay)
    }
}
