//! Delay strategies for waiting on the engine.
//!
//! Both the readiness probe and the history poll loop sleep between
//! attempts. [`Backoff`] decides how long; the worker uses a fixed
//! interval for both.

use std::time::Duration;

/// How the delay between attempts evolves.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay every time.
    Fixed(Duration),
    /// Delay grows by `multiplier` after each attempt, clamped to `max`.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

impl Backoff {
    /// Delay before the second attempt.
    pub fn initial_delay(&self) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial, .. } => *initial,
        }
    }

    /// Calculate the next delay from the current one.
    pub fn next_delay(&self, current: Duration) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential {
                max, multiplier, ..
            } => {
                let next_ms = (current.as_millis() as f64 * multiplier) as u64;
                Duration::from_millis(next_ms).min(*max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling() -> Backoff {
        Backoff::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    #[test]
    fn fixed_never_changes() {
        let backoff = Backoff::Fixed(Duration::from_secs(3));
        assert_eq!(backoff.initial_delay(), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(Duration::from_secs(3)), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(Duration::from_secs(99)), Duration::from_secs(3));
    }

    #[test]
    fn exponential_doubles() {
        let backoff = doubling();
        assert_eq!(backoff.next_delay(Duration::from_secs(1)), Duration::from_secs(2));
    }

    #[test]
    fn exponential_clamps_at_max() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            multiplier: 2.0,
        };
        assert_eq!(backoff.next_delay(Duration::from_secs(8)), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(Duration::from_secs(10)), Duration::from_secs(10));
    }

    #[test]
    fn custom_multiplier() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(60),
            multiplier: 3.0,
        };
        assert_eq!(backoff.next_delay(Duration::from_secs(2)), Duration::from_secs(6));
    }

    #[test]
    fn full_exponential_sequence() {
        let backoff = doubling();
        let mut delay = backoff.initial_delay();
        let expected = [1, 2, 4, 8, 16, 30, 30, 30];

        for &expected_secs in &expected {
            assert_eq!(delay.as_secs(), expected_secs);
            delay = backoff.next_delay(delay);
        }
    }
}
