use std::time::Duration;

use tokio::time::Instant;

/// Result of one `attempt_reconnect` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// Session is not in `Reconnecting`
    NotReconnecting,
    /// Backoff interval has not elapsed
    Wait,
    /// Attempt `n` ran; `succeeded` tells whether the handshake completed
    Attempted {
        /// Attempt number, starting at 1
        attempt: u32,
        /// Handshake outcome
        succeeded: bool,
    },
    /// Budget used up; session moved to `Error`
    Exhausted,
}

/// Bounded exponential backoff
///
/// Attempt `n` (0-based) may run once `base * 2^n` has passed since the
/// previous attempt, or since the policy was armed for the first one.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    base_delay: Duration,
    attempts: u32,
    last_attempt: Option<Instant>,
}

/// What the policy allows right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Too early
    Wait,
    /// Run attempt with this 1-based number
    Attempt(u32),
    /// No attempts left
    Exhausted,
}

impl ReconnectPolicy {
    /// Create a policy
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            attempts: 0,
            last_attempt: None,
        }
    }

    /// Attempts made since the last reset
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured attempt budget
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay required before the next attempt
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        let factor = 1u32.checked_shl(self.attempts).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Start the clock for a fresh reconnect cycle
    pub fn arm(&mut self, now: Instant) {
        self.attempts = 0;
        self.last_attempt = Some(now);
    }

    /// Forget all attempts
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_attempt = None;
    }

    /// Decide, recording the attempt when one is allowed
    pub fn poll(&mut self, now: Instant) -> ReconnectDecision {
        if self.attempts >= self.max_attempts {
            return ReconnectDecision::Exhausted;
        }
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < self.current_delay() {
                return ReconnectDecision::Wait;
            }
        }
        self.attempts += 1;
        self.last_attempt = Some(now);
        ReconnectDecision::Attempt(self.attempts)
    }
}
