//! Process-wide sliding-window rate limiting
//!
//! Every delivery client call, across every job, must first take a permit
//! here. The limiter remembers when each permit in the trailing window was
//! granted, so the number of calls inside any `window`-long interval never
//! exceeds `limit`.
//!
//! ```text
//! limit: 3, window: 60s
//!
//!   t=0   t=1   t=2   t=30        t=60  t=61
//!   ok    ok    ok    denied,     ok    ok
//!                     wait 30s    (t=0 expired)
//! ```
//!
//! Unlike a token bucket there is no refill rate to tune and no burst above
//! `limit`: a denied caller sleeps exactly until the oldest permit leaves the
//! window.

use std::{collections::VecDeque, time::Duration};

use outreach_common::ConfigError;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

/// Point-in-time view of the limiter, for health and status surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    /// Permits granted within the current window
    pub in_window: usize,
    pub limit: usize,
    pub window_secs: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    /// Grant times inside the window, oldest first
    granted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// # Errors
    ///
    /// Returns an error if `limit` is zero or `window` is empty.
    pub fn new(limit: u32, window: Duration) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::invalid("mps_limit", "must be greater than 0"));
        }
        if window.is_zero() {
            return Err(ConfigError::invalid("window_secs", "must be greater than 0"));
        }

        let limit = limit as usize;
        Ok(Self {
            limit,
            window,
            granted: Mutex::new(VecDeque::with_capacity(limit)),
        })
    }

    /// Grant a permit if fewer than `limit` were granted in the trailing
    /// window.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut granted = self.granted.lock();
        self.prune(&mut granted, now);

        if granted.len() < self.limit {
            granted.push_back(now);
            true
        } else {
            false
        }
    }

    /// How long until [`RateLimiter::try_acquire`] would succeed.
    ///
    /// Zero when a permit is available now; otherwise the time until the
    /// oldest grant leaves the window.
    pub fn time_until_available(&self) -> Duration {
        let now = Instant::now();
        let mut granted = self.granted.lock();
        self.prune(&mut granted, now);

        if granted.len() < self.limit {
            return Duration::ZERO;
        }

        granted.front().map_or(Duration::ZERO, |oldest| {
            (*oldest + self.window).saturating_duration_since(now)
        })
    }

    /// Wait for a permit, returning how long the caller was held back.
    ///
    /// Sleeps for exactly [`RateLimiter::time_until_available`] between
    /// attempts rather than polling.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();

        loop {
            if self.try_acquire() {
                return started.elapsed();
            }

            let wait = self.time_until_available();
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
    }

    pub fn stats(&self) -> RateLimitStats {
        let now = Instant::now();
        let mut granted = self.granted.lock();
        self.prune(&mut granted, now);

        RateLimitStats {
            in_window: granted.len(),
            limit: self.limit,
            window_secs: self.window.as_secs(),
        }
    }

    /// Drop grants that are a full window or more in the past
    fn prune(&self, granted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = granted.front()
            && now.saturating_duration_since(*oldest) >= self.window
        {
            granted.pop_front();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limits_are_rejected() {
        assert!(RateLimiter::new(0, Duration::from_secs(60)).is_err());
        assert!(RateLimiter::new(10, Duration::ZERO).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denies_once_window_is_full() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60)).unwrap();

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        let stats = limiter.stats();
        assert_eq!(stats.in_window, 3);
        assert_eq!(stats.limit, 3);
        assert_eq!(stats.window_secs, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_until_available_tracks_oldest_grant() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60)).unwrap();

        assert_eq!(limiter.time_until_available(), Duration::ZERO);
        assert!(limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.try_acquire());

        // The first grant expires 60s after it was taken
        assert_eq!(limiter.time_until_available(), Duration::from_secs(50));

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(limiter.time_until_available(), Duration::ZERO);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_sleeps_exactly_until_a_permit_frees() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60)).unwrap();

        assert_eq!(limiter.acquire().await, Duration::ZERO);

        let started = Instant::now();
        let waited = limiter.acquire().await;

        assert!(waited >= Duration::from_secs(60));
        assert!(started.elapsed() < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_count_never_exceeds_limit() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10)).unwrap();
        let mut grants = Vec::new();

        for _ in 0..23 {
            limiter.acquire().await;
            grants.push(Instant::now());
            tokio::time::advance(Duration::from_millis(700)).await;
        }

        for (i, start) in grants.iter().enumerate() {
            let in_window = grants[i..]
                .iter()
                .filter(|t| t.duration_since(*start) < Duration::from_secs(10))
                .count();
            assert!(in_window <= 5, "{in_window} grants within one window");
        }
    }
}
