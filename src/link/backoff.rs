//! Reconnect delay computation
//!
//! The first attempt after a disconnect waits a random jitter; every further
//! attempt doubles the delay until the cap.

use rand::Rng;
use std::time::Duration;

/// Reconnection timing
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Upper bound of the random first-attempt delay
    pub max_jitter: Duration,
    /// Floor of the doubling base once the first attempt has failed
    pub min_base: Duration,
    /// Cap applied to every delay
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_jitter: Duration::from_secs(2),
            min_base: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

/// Delay before reconnect attempt `attempt` for a given jitter draw (pure function)
pub fn delay_for_attempt(jitter: Duration, attempt: u32, config: &ReconnectConfig) -> Duration {
    if attempt == 0 {
        return jitter.min(config.max_delay);
    }

    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    jitter
        .max(config.min_base)
        .saturating_mul(factor)
        .min(config.max_delay)
}

/// Backoff state for one disconnect episode
///
/// The jitter is drawn once, so successive delays of an episode double cleanly.
/// Create a new `Backoff` for every unexpected disconnect.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    jitter: Duration,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        let max_ms = u64::try_from(config.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms));
        Self::with_jitter(config, jitter)
    }

    /// Backoff with a fixed jitter
    pub fn with_jitter(config: ReconnectConfig, jitter: Duration) -> Self {
        Self { config, jitter }
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Delay to wait before reconnect attempt `attempt` (0-based)
    pub fn next_delay(&self, attempt: u32) -> Duration {
        delay_for_attempt(self.jitter, attempt, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn delays_never_decrease_after_first_attempt(jitter_ms in 0u64..=2000, n in 1u32..64) {
            let backoff = Backoff::with_jitter(ReconnectConfig::default(), Duration::from_millis(jitter_ms));
            prop_assert!(backoff.next_delay(n) <= backoff.next_delay(n + 1));
        }

        #[test]
        fn delays_never_exceed_cap(jitter_ms in 0u64..=2000, n in 0u32..=u32::MAX) {
            let config = ReconnectConfig::default();
            let backoff = Backoff::with_jitter(config.clone(), Duration::from_millis(jitter_ms));
            prop_assert!(backoff.next_delay(n) <= config.max_delay);
        }

        #[test]
        fn first_delay_is_within_jitter_range(_seed in 0u8..32) {
            let config = ReconnectConfig::default();
            let backoff = Backoff::new(config.clone());
            prop_assert!(backoff.next_delay(0) <= config.max_jitter);
            prop_assert_eq!(backoff.next_delay(0), backoff.jitter());
        }
    }

    #[test]
    fn test_delays_double() {
        let backoff =
            Backoff::with_jitter(ReconnectConfig::default(), Duration::from_millis(1500));
        assert_eq!(backoff.next_delay(0), Duration::from_millis(1500));
        assert_eq!(backoff.next_delay(1), Duration::from_millis(3000));
        assert_eq!(backoff.next_delay(2), Duration::from_millis(6000));
        assert_eq!(backoff.next_delay(3), Duration::from_millis(12000));
    }

    #[test]
    fn test_zero_jitter_still_backs_off() {
        let backoff = Backoff::with_jitter(ReconnectConfig::default(), Duration::ZERO);
        assert_eq!(backoff.next_delay(0), Duration::ZERO);
        assert_eq!(backoff.next_delay(1), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_reaches_cap() {
        let backoff = Backoff::with_jitter(ReconnectConfig::default(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(7), Duration::from_secs(256));
        assert_eq!(backoff.next_delay(8), Duration::from_secs(300));
        assert_eq!(backoff.next_delay(40), Duration::from_secs(300));
    }

    #[test]
    fn test_custom_cap() {
        let config = ReconnectConfig {
            max_jitter: Duration::from_millis(100),
            min_base: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        };
        assert_eq!(
            delay_for_attempt(Duration::from_millis(80), 0, &config),
            Duration::from_millis(50)
        );
        assert_eq!(
            delay_for_attempt(Duration::from_millis(20), 1, &config),
            Duration::from_millis(40)
        );
        assert_eq!(
            delay_for_attempt(Duration::from_millis(20), 2, &config),
            Duration::from_millis(50)
        );
    }
}
