//! Retry delay strategies for webhook delivery.
//!
//! The dispatch loop only asks a [`RetryPolicy`] how long to wait after a
//! failed attempt; swapping the policy never touches the loop itself.

use std::fmt;
use std::time::Duration;

/// Upper bound applied by [`ExponentialBackoff::default`].
pub const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// Decides the pause between two delivery attempts.
pub trait RetryPolicy: fmt::Debug + Send + Sync {
    /// Delay after failed attempt number `attempt` (1-based).
    ///
    /// `base_delay` is the per-subscription `retry_delay_seconds`.
    fn delay_after(&self, attempt: u32, base_delay: Duration) -> Duration;
}

/// Always waits the configured `retry_delay_seconds`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDelay;

impl RetryPolicy for FixedDelay {
    fn delay_after(&self, _attempt: u32, base_delay: Duration) -> Duration {
        base_delay
    }
}

/// Doubles the base delay after every attempt: `base * 2^(attempt - 1)`,
/// capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub max_delay: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_delay: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay_after(&self, attempt: u32, base_delay: Duration) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_ignores_attempt_number() {
        let base = Duration::from_secs(2);
        assert_eq!(FixedDelay.delay_after(1, base), base);
        assert_eq!(FixedDelay.delay_after(9, base), base);
    }

    #[test]
    fn exponential_doubles_per_attempt() {
        let policy = ExponentialBackoff::default();
        let base = Duration::from_secs(1);
        assert_eq!(policy.delay_after(1, base), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2, base), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3, base), Duration::from_secs(4));
    }

    #[test]
    fn exponential_is_capped() {
        let policy = ExponentialBackoff {
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(
            policy.delay_after(40, Duration::from_secs(3)),
            Duration::from_secs(10)
        );
    }
}
