//! Per-route rate limiting.
//!
//! Each registered route owns one [`RateLimiter`]: a map from client
//! identifier to bucket. A bucket starts with `points` tokens, each admitted
//! request takes one, and the whole bucket refills once `duration` seconds
//! have passed since its window opened.
//!
//! State is process-local. Two processes behind a load balancer each allow
//! the full rate; restarting the process forgets every bucket.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Buckets are swept for expired windows once the map reaches this size,
/// at most once per window.
const PRUNE_THRESHOLD: usize = 4096;

/// `points` requests per `duration` seconds, per client.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    pub enabled: bool,
    pub points: u32,
    /// Window length in seconds.
    pub duration: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self { enabled: true, points: 10, duration: 1 }
    }
}

impl RateLimitPolicy {
    pub fn per_second(points: u32) -> Self {
        Self { enabled: true, points, duration: 1 }
    }

    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.duration)
    }

    /// A disabled policy is always valid; an enabled one needs a non-empty
    /// bucket and a non-zero window.
    pub fn is_valid(&self) -> bool {
        !self.enabled || (self.points > 0 && self.duration > 0)
    }
}

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Time source for bucket windows.
pub trait Clock: fmt::Debug + Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Wall-clock [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Mutex::new(Instant::now()) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── RateLimiter ───────────────────────────────────────────────────────────────

/// Outcome of an admission check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Admission {
    Allowed,
    Rejected { retry_after: Duration },
}

#[derive(Debug)]
struct Bucket {
    remaining: u32,
    window_start: Instant,
}

#[derive(Debug, Default)]
struct Buckets {
    by_client: HashMap<String, Bucket>,
    last_sweep: Option<Instant>,
}

impl Buckets {
    /// Drops expired buckets if the map is large and no sweep ran this window.
    fn sweep(&mut self, now: Instant, window: Duration) {
        if self.by_client.len() < PRUNE_THRESHOLD
            || self.last_sweep.is_some_and(|at| now.duration_since(at) < window)
        {
            return;
        }
        self.by_client.retain(|_, b| now.duration_since(b.window_start) < window);
        self.last_sweep = Some(now);
    }
}

/// Keyed token buckets for one route.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock, buckets: Mutex::new(Buckets::default()) }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Takes one token from `identifier`'s bucket.
    ///
    /// The check and the decrement happen under one lock, so concurrent
    /// requests from the same client can never overdraw the bucket.
    pub fn admit(&self, identifier: &str) -> Admission {
        let now = self.clock.now();
        let window = self.policy.window();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);

        buckets.sweep(now, window);

        let bucket = buckets
            .by_client
            .entry(identifier.to_owned())
            .or_insert_with(|| Bucket { remaining: self.policy.points, window_start: now });

        if now.duration_since(bucket.window_start) >= window {
            bucket.remaining = self.policy.points;
            bucket.window_start = now;
        }

        if bucket.remaining > 0 {
            bucket.remaining -= 1;
            Admission::Allowed
        } else {
            let retry_after = (bucket.window_start + window).saturating_duration_since(now);
            Admission::Rejected { retry_after }
        }
    }

    /// Number of clients currently tracked.
    pub fn tracked(&self) -> usize {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).by_client.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(points: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (RateLimiter::new(RateLimitPolicy::per_second(points), clock.clone()), clock)
    }

    #[test]
    fn exactly_n_admitted_per_window() {
        let (rl, _clock) = limiter(3);
        let outcomes: Vec<_> = (0..4).map(|_| rl.admit("10.0.0.1")).collect();
        assert_eq!(&outcomes[..3], &[Admission::Allowed; 3]);
        assert!(matches!(outcomes[3], Admission::Rejected { .. }));
    }

    #[test]
    fn refills_after_the_window() {
        let (rl, clock) = limiter(1);
        assert_eq!(rl.admit("a"), Admission::Allowed);
        clock.advance(Duration::from_millis(400));
        assert_eq!(
            rl.admit("a"),
            Admission::Rejected { retry_after: Duration::from_millis(600) }
        );
        clock.advance(Duration::from_millis(600));
        assert_eq!(rl.admit("a"), Admission::Allowed);
    }

    #[test]
    fn identifiers_are_independent() {
        let (rl, _clock) = limiter(1);
        assert_eq!(rl.admit("a"), Admission::Allowed);
        assert_eq!(rl.admit("b"), Admission::Allowed);
        assert!(matches!(rl.admit("a"), Admission::Rejected { .. }));
        assert_eq!(rl.tracked(), 2);
    }

    #[test]
    fn large_maps_are_swept_once_per_window() {
        let (rl, clock) = limiter(1);
        let start = clock.now();
        let flood = PRUNE_THRESHOLD + 100;
        for i in 0..flood {
            rl.admit(&format!("10.0.{}.{}", i / 256, i % 256));
        }
        assert_eq!(rl.buckets.lock().unwrap().last_sweep, Some(start));
        assert_eq!(rl.tracked(), flood);

        clock.advance(Duration::from_millis(500));
        rl.admit("late");
        assert_eq!(rl.buckets.lock().unwrap().last_sweep, Some(start));
        assert_eq!(rl.tracked(), flood + 1);

        clock.advance(Duration::from_millis(500));
        rl.admit("fresh");
        assert_eq!(rl.buckets.lock().unwrap().last_sweep, Some(clock.now()));
        // Only "late" is still inside its window.
        assert_eq!(rl.tracked(), 2);
    }

    #[test]
    fn policy_validation() {
        assert!(RateLimitPolicy::default().is_valid());
        assert!(RateLimitPolicy { points: 0, ..RateLimitPolicy::disabled() }.is_valid());
        assert!(!RateLimitPolicy::per_second(0).is_valid());
        assert!(!RateLimitPolicy { duration: 0, ..RateLimitPolicy::default() }.is_valid());
    }
}
