use std::time::Duration;

/// Exponential reconnect schedule: `base × 2^(attempt−1)`, bounded only by
/// the number of attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            attempt: 0,
        }
    }

    /// Attempts consumed since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Consume one attempt and return its delay, or `None` once every
    /// attempt has been used.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt += 1;
        Some(Self::delay_for(self.base, self.attempt))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay of the given 1-based attempt. Saturates instead of overflowing.
    pub fn delay_for(base: Duration, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        base.saturating_mul(1u32 << exponent)
    }
}
