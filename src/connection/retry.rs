//! Bounded reconnect with exponential back-off.

use std::time::Duration;

/// Default number of automatic reconnects after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Exponential back-off timing between connect attempts.
///
/// The delay starts at `initial_delay` and doubles on each failure, capped at
/// `max_delay`.
///
/// # Default Values
/// - `initial_delay`: 100 milliseconds
/// - `max_delay`: 2 seconds
///
/// # Invariants
/// - `initial_delay` must not exceed `max_delay`
/// - `initial_delay` must be at least 1 millisecond
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Upper bound for the delay once it has grown exponentially.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl BackoffConfig {
    /// Clamp delays to sane bounds and ensure `initial_delay <= max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use pmix_link::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::ZERO,
    /// };
    ///
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.initial_delay, Duration::from_millis(1));
    /// assert_eq!(normalized.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Delay before reconnect number `retry` (starting at 1).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let doublings = retry.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(1_u32 << doublings)
            .min(self.max_delay)
    }
}

/// What to do after a failed connect attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Arm the retry timer for this delay, then connect again.
    RetryAfter(Duration),
    /// Give up; `attempts` connects failed in total.
    Exhausted { attempts: u32 },
}

/// Counts connect failures since the last explicit `connect()`.
#[derive(Debug)]
pub(crate) struct RetryController {
    max_retries: u32,
    retries: u32,
    backoff: BackoffConfig,
}

impl RetryController {
    pub(crate) fn new(max_retries: u32, backoff: BackoffConfig) -> Self {
        Self {
            max_retries,
            retries: 0,
            backoff: backoff.normalized(),
        }
    }

    /// Start counting afresh. Only an explicit `connect()` calls this.
    pub(crate) fn reset(&mut self) { self.retries = 0; }

    pub(crate) fn retries(&self) -> u32 { self.retries }

    pub(crate) fn on_failure(&mut self) -> RetryDecision {
        if self.retries < self.max_retries {
            self.retries += 1;
            RetryDecision::RetryAfter(self.backoff.delay_for(self.retries))
        } else {
            RetryDecision::Exhausted {
                attempts: self.retries.saturating_add(1),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, 100)]
    #[case(2, 200)]
    #[case(3, 400)]
    #[case(5, 1600)]
    #[case(6, 2000)]
    #[case(40, 2000)]
    fn delay_doubles_up_to_cap(#[case] retry: u32, #[case] millis: u64) {
        assert_eq!(
            BackoffConfig::default().delay_for(retry),
            Duration::from_millis(millis)
        );
    }

    #[rstest]
    #[case(0, 1)]
    #[case(2, 3)]
    #[case(3, 4)]
    fn exhausted_after_max_retries_plus_one_failures(
        #[case] max_retries: u32,
        #[case] failures: u32,
    ) {
        let mut retry = RetryController::new(max_retries, BackoffConfig::default());
        for _ in 1..failures {
            assert!(matches!(retry.on_failure(), RetryDecision::RetryAfter(_)));
        }
        assert_eq!(
            retry.on_failure(),
            RetryDecision::Exhausted { attempts: failures }
        );
    }

    #[test]
    fn reset_restores_the_full_budget() {
        let mut retry = RetryController::new(1, BackoffConfig::default());
        assert!(matches!(retry.on_failure(), RetryDecision::RetryAfter(_)));
        assert!(matches!(retry.on_failure(), RetryDecision::Exhausted { .. }));
        retry.reset();
        assert_eq!(retry.retries(), 0);
        assert_eq!(
            retry.on_failure(),
            RetryDecision::RetryAfter(Duration::from_millis(100))
        );
    }
}
