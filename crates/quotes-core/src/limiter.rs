//! Sliding-window rate limiter.
//!
//! One [`SlidingWindowLimiter`] guards one provider. It keeps the instants of
//! recent dispatches and admits a new call while fewer than `max_calls` of them
//! fall inside the trailing `period`.
//!
//! Time is read from [`tokio::time::Instant`], which is monotonic and can be
//! paused and advanced in tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{trace, warn};

/// Default call budget per window.
pub const DEFAULT_MAX_CALLS: usize = 5;

/// Default window length.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

/// Sliding-window admission control for a single provider.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_calls: usize,
    period: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter admitting `max_calls` per trailing `period`.
    #[must_use]
    pub const fn new(max_calls: usize, period: Duration) -> Self {
        Self {
            max_calls,
            period,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the call budget per window.
    #[must_use]
    pub const fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Returns the window length.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Lock the call log, recovering from poison.
    ///
    /// A poisoned log only holds instants, so the worst case after recovery is
    /// a slightly stale window.
    fn lock_calls(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.calls.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter call log mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Drop entries that are more than `period` old.
    fn purge(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = calls.front() {
            if now.saturating_duration_since(oldest) > self.period {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Returns true if a call dispatched now would stay within budget.
    ///
    /// Only purges expired entries; never records anything.
    pub fn is_allowed(&self) -> bool {
        let mut calls = self.lock_calls();
        self.purge(&mut calls, Instant::now());
        calls.len() < self.max_calls
    }

    /// Record a dispatched call at the current instant.
    pub fn record_call(&self) {
        let mut calls = self.lock_calls();
        calls.push_back(Instant::now());
        trace!(in_window = calls.len(), "Recorded call");
    }

    /// Check and record under one lock.
    ///
    /// Returns true and records the call if it is admitted. Concurrent callers
    /// can never push the window past `max_calls` through this method.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut calls = self.lock_calls();
        self.purge(&mut calls, now);
        if calls.len() < self.max_calls {
            calls.push_back(now);
            true
        } else {
            false
        }
    }

    /// Time until the oldest call in the window expires.
    ///
    /// Returns `None` when a call is allowed right now. With `max_calls == 0`
    /// no call is ever allowed and this returns `Some(Duration::MAX)`.
    pub fn time_until_next_call(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut calls = self.lock_calls();
        self.purge(&mut calls, now);

        if calls.len() < self.max_calls {
            return None;
        }

        match calls.front() {
            Some(&oldest) => Some((oldest + self.period).saturating_duration_since(now)),
            None => Some(Duration::MAX),
        }
    }

    /// Number of calls currently inside the window.
    pub fn calls_in_window(&self) -> usize {
        let mut calls = self.lock_calls();
        self.purge(&mut calls, Instant::now());
        calls.len()
    }

    /// Clear the call log.
    pub fn reset(&self) {
        self.lock_calls().clear();
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLS, DEFAULT_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted_then_frees_up() {
        let limiter = SlidingWindowLimiter::new(5, Duration::from_secs(60));

        for _ in 0..5 {
            assert!(limiter.is_allowed());
            limiter.record_call();
        }

        advance(Duration::from_secs(10)).await;
        assert!(!limiter.is_allowed());
        assert_eq!(
            limiter.time_until_next_call(),
            Some(Duration::from_secs(50))
        );

        advance(Duration::from_secs(51)).await;
        assert!(limiter.is_allowed());
        assert_eq!(limiter.time_until_next_call(), None);
        assert_eq!(limiter.calls_in_window(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_exactly_period_old_still_counts() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        limiter.record_call();

        advance(Duration::from_secs(60)).await;
        assert!(!limiter.is_allowed());
        assert_eq!(limiter.time_until_next_call(), Some(Duration::ZERO));

        advance(Duration::from_millis(1)).await;
        assert!(limiter.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_non_increasing() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(30));
        limiter.record_call();
        advance(Duration::from_secs(5)).await;
        limiter.record_call();

        let mut previous = limiter.time_until_next_call();
        assert!(previous.is_some());
        loop {
            advance(Duration::from_secs(3)).await;
            let current = limiter.time_until_next_call();
            match (previous, current) {
                (Some(p), Some(c)) => assert!(c <= p),
                (Some(_), None) => {
                    assert!(limiter.is_allowed());
                    break;
                }
                _ => unreachable!("wait can not reappear without new calls"),
            }
            previous = current;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_allowed_does_not_record() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(10));
        for _ in 0..10 {
            assert!(limiter.is_allowed());
        }
        assert_eq!(limiter.calls_in_window(), 0);
    }

    #[test]
    fn test_zero_budget_always_denied() {
        let limiter = SlidingWindowLimiter::new(0, Duration::from_secs(10));
        assert!(!limiter.is_allowed());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.time_until_next_call(), Some(Duration::MAX));
    }

    #[test]
    fn test_reset() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        limiter.reset();
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_budget() {
        let limiter = Arc::new(SlidingWindowLimiter::new(7, Duration::from_secs(3600)));
        let admitted = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..16 {
                let limiter = Arc::clone(&limiter);
                let admitted = Arc::clone(&admitted);
                scope.spawn(move || {
                    for _ in 0..10 {
                        if limiter.try_acquire() {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 7);
        assert_eq!(limiter.calls_in_window(), 7);
    }
}
