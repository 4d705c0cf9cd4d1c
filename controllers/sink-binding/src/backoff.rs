//! # Fibonacci Backoff
//!
//! Requeue delays for bindings whose sink is not resolvable yet. The delay
//! grows along the Fibonacci sequence, in seconds, with the number of
//! consecutive failures: 2s, 2s, 4s, 6s, 10s, 16s, ... capped at the maximum.
//!
//! The tracker re-enqueues a binding as soon as the object it references
//! changes, so this schedule only bounds how long a missed change can go
//! unnoticed.

use std::time::Duration;

/// Smallest requeue delay, in seconds
pub const MIN_BACKOFF_SECONDS: u64 = 2;

/// Largest requeue delay, in seconds
pub const MAX_BACKOFF_SECONDS: u64 = 300;

/// Fibonacci backoff calculator
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_seconds: u64,
    max_seconds: u64,
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(MIN_BACKOFF_SECONDS, MAX_BACKOFF_SECONDS)
    }
}

impl FibonacciBackoff {
    /// Create a backoff between `min_seconds` and `max_seconds`
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            min_seconds,
            max_seconds: max_seconds.max(min_seconds),
        }
    }

    /// Delay after `failures` consecutive failures (1-indexed; 0 is treated as 1)
    ///
    /// The sequence is min, min, 2*min, 3*min, 5*min, ... capped at the maximum.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let mut prev = self.min_seconds;
        let mut current = self.min_seconds;

        for _ in 2..failures {
            let next = prev.saturating_add(current);
            prev = current;
            current = next.min(self.max_seconds);

            if current >= self.max_seconds {
                break;
            }
        }

        Duration::from_secs(current.min(self.max_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fibonacci_sequence() {
        let backoff = FibonacciBackoff::new(2, 300);
        let delays: Vec<u64> = (1..=8).map(|n| backoff.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 2, 4, 6, 10, 16, 26, 42]);
    }

    #[test]
    fn test_zero_failures_uses_minimum() {
        assert_eq!(FibonacciBackoff::default().delay_for(0), Duration::from_secs(2));
    }

    #[test]
    fn test_max_cap() {
        let backoff = FibonacciBackoff::new(1, 10);
        assert_eq!(backoff.delay_for(6).as_secs(), 8);
        assert_eq!(backoff.delay_for(7).as_secs(), 10);
        assert_eq!(backoff.delay_for(50).as_secs(), 10);
        assert_eq!(backoff.delay_for(u32::MAX).as_secs(), 10);
    }

    #[test]
    fn test_max_below_min() {
        assert_eq!(FibonacciBackoff::new(30, 5).delay_for(3).as_secs(), 30);
    }
}
