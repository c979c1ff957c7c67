use std::time::Duration;

use rand::Rng;

/// Floor for any reconnect delay.
pub const MIN_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential reconnect backoff with jitter: min * 2^(attempt - 1),
/// capped at `max`, never below one second.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.max(MIN_BACKOFF);
        Self {
            min,
            max: max.max(min),
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);

        let base = self.min.as_millis() as f64;
        let max = self.max.as_millis() as f64;
        let raw = base * 2_f64.powi(self.attempt.min(31) as i32 - 1);
        let capped = raw.min(max);

        // Jitter: up to 20% on top, still bounded by max
        let jitter_range = (capped * 0.2) as u64;
        let jitter = rand::thread_rng().gen_range(0..=jitter_range);

        Duration::from_millis(((capped as u64) + jitter).min(max as u64))
    }

    /// Call after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(MIN_BACKOFF, DEFAULT_MAX_BACKOFF)
    }
}
