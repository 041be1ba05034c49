//! # Fibonacci Backoff
//!
//! Requeue delays for failed reconciliations. The delay grows along the
//! Fibonacci sequence, which is slower than exponential backoff and keeps
//! a broken instance from being hammered while still retrying transient
//! failures quickly.
//!
//! Default sequence: 5s, 5s, 10s, 15s, 25s, 40s, 65s, ... capped at 5m.

use std::time::Duration;

/// Shortest requeue delay in seconds
pub const DEFAULT_MIN_SECONDS: u64 = 5;

/// Longest requeue delay in seconds
pub const DEFAULT_MAX_SECONDS: u64 = 300;

/// Fibonacci backoff calculator
///
/// Stateless: the controller glue keeps the consecutive error count per
/// instance and asks for the delay belonging to that count.
#[derive(Debug, Clone, Copy)]
pub struct FibonacciBackoff {
    min_seconds: u64,
    max_seconds: u64,
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SECONDS, DEFAULT_MAX_SECONDS)
    }
}

impl FibonacciBackoff {
    /// Create a backoff with the given bounds in seconds
    ///
    /// # Arguments
    ///
    /// * `min_seconds` - Delay for the first two errors
    /// * `max_seconds` - Cap of the sequence
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            min_seconds,
            max_seconds: max_seconds.max(min_seconds),
        }
    }

    /// Delay for the given number of consecutive errors
    #[must_use]
    pub fn delay(&self, error_count: u32) -> Duration {
        Self::calculate_for_error_count(error_count, self.min_seconds, self.max_seconds)
    }

    /// Calculate the backoff for a given error count
    ///
    /// The sequence starts at `min_seconds` for error counts 0 and 1, then
    /// follows min, min, min*2, min*3, min*5, min*8, ... capped at `max_seconds`.
    #[must_use]
    pub fn calculate_for_error_count(error_count: u32, min_seconds: u64, max_seconds: u64) -> Duration {
        if error_count <= 1 {
            return Duration::from_secs(min_seconds.min(max_seconds));
        }

        let mut prev_seconds = min_seconds;
        let mut current_seconds = min_seconds;

        for _ in 2..=error_count {
            let next_seconds = prev_seconds.saturating_add(current_seconds);
            prev_seconds = current_seconds;
            current_seconds = next_seconds.min(max_seconds);

            if current_seconds >= max_seconds {
                break;
            }
        }

        Duration::from_secs(current_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let backoff = FibonacciBackoff::default();

        let delays: Vec<u64> = (0..=7).map(|count| backoff.delay(count).as_secs()).collect();
        assert_eq!(delays, vec![5, 5, 10, 15, 25, 40, 65, 105]);
    }

    #[test]
    fn test_fibonacci_backoff_max_cap() {
        let backoff = FibonacciBackoff::new(1, 10);

        assert_eq!(backoff.delay(5).as_secs(), 8);
        assert_eq!(backoff.delay(6).as_secs(), 10);
        assert_eq!(backoff.delay(50).as_secs(), 10);
        assert_eq!(backoff.delay(u32::MAX).as_secs(), 10);
    }

    #[test]
    fn test_max_below_min_is_raised() {
        let backoff = FibonacciBackoff::new(30, 10);
        assert_eq!(backoff.delay(0).as_secs(), 30);
        assert_eq!(backoff.delay(9).as_secs(), 30);
    }
}
