//! Reconnection backoff policy.

use std::time::Duration;

/// Backoff policy parameters.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// First delay.
    pub min: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Growth factor per attempt; clamped to at least 1.
    pub factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
        }
    }
}

/// Geometric delay schedule between reconnection attempts.
///
/// Successive [`Backoff::next`] calls return non-decreasing durations,
/// starting at `min` and growing by `factor` until capped at `max`.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// Creates a backoff at its initial delay.
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Returns the next delay and advances the schedule.
    pub fn next(&mut self) -> Duration {
        let factor = self.config.factor.max(1.0);
        let scaled = self.config.min.as_secs_f64() * factor.powi(self.attempt as i32);
        self.attempt = self.attempt.saturating_add(1);

        let delay = Duration::try_from_secs_f64(scaled).unwrap_or(self.config.max);
        delay.min(self.config.max)
    }

    /// Restarts the schedule from `min`.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometric_growth() {
        let mut backoff = Backoff::new(BackoffConfig {
            min: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
        });
        assert_eq!(backoff.next(), Duration::from_millis(100));
        assert_eq!(backoff.next(), Duration::from_millis(200));
        assert_eq!(backoff.next(), Duration::from_millis(400));
    }

    #[test]
    fn test_non_decreasing_and_capped() {
        let mut backoff = Backoff::default();
        let mut last = Duration::ZERO;
        for _ in 0..32 {
            let delay = backoff.next();
            assert!(delay >= last);
            assert!(delay <= BackoffConfig::default().max);
            last = delay;
        }
        assert_eq!(last, BackoffConfig::default().max);
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut backoff = Backoff::default();
        let first = backoff.next();
        backoff.next();
        backoff.reset();
        assert_eq!(backoff.next(), first);
    }

    #[test]
    fn test_factor_below_one_is_clamped() {
        let mut backoff = Backoff::new(BackoffConfig {
            min: Duration::from_millis(50),
            max: Duration::from_secs(1),
            factor: 0.5,
        });
        assert_eq!(backoff.next(), Duration::from_millis(50));
        assert_eq!(backoff.next(), Duration::from_millis(50));
    }
}
