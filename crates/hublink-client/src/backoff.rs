//! Reconnection backoff with jitter

use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Delay before the retry that follows a first failure
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Jitter adds up to this fraction of the current delay
pub const MAX_JITTER: f64 = 0.5;

/// Exponential backoff state for the retry loop
///
/// The delay doubles after every wait up to `max`. A successful open resets it
/// to [`BASE_DELAY`], and the wait right after that session does not count
/// towards growth, so only consecutive failures compound.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    max: Duration,
    current: Duration,
    reset_pending: bool,
}

impl RetryBackoff {
    pub fn new(max: Duration) -> Self {
        Self {
            max,
            current: BASE_DELAY.min(max),
            reset_pending: false,
        }
    }

    /// Delay before jitter
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Current delay plus a random `[0, 50%]` jitter
    pub fn jittered(&self) -> Duration {
        let fraction = rand::thread_rng().gen_range(0.0..=MAX_JITTER);
        self.with_jitter(fraction)
    }

    /// Current delay scaled by `1 + fraction`, with `fraction` clamped to `[0, 0.5]`
    pub fn with_jitter(&self, fraction: f64) -> Duration {
        self.current.mul_f64(1.0 + fraction.clamp(0.0, MAX_JITTER))
    }

    /// Grow the delay after a wait
    pub fn advance(&mut self) {
        if self.reset_pending {
            self.reset_pending = false;
            return;
        }
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    /// Reset backoff (call after successful connection)
    pub fn reset(&mut self) {
        debug!("Resetting reconnection backoff");
        self.current = BASE_DELAY.min(self.max);
        self.reset_pending = true;
    }
}
