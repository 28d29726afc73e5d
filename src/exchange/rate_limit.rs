// src/exchange/rate_limit.rs
//
// Request throttle with per-second, per-minute and per-hour caps over
// bucketed sliding windows. One mutex guards all three windows so a
// check-and-record is atomic across them.
use crate::domain::errors::{ExchangeError, ExchangeResult};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Time source, injectable so the window arithmetic is testable.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> f64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateCaps {
    pub per_second: u32,
    pub per_minute: u32,
    pub per_hour: u32,
}

impl Default for RateCaps {
    fn default() -> Self {
        Self {
            per_second: 30,
            per_minute: 1_800,
            per_hour: 10_000,
        }
    }
}

#[derive(Default)]
struct Windows {
    second: HashMap<i64, u32>,
    minute: HashMap<i64, u32>,
    hour: HashMap<i64, u32>,
}

pub struct RateLimiter {
    caps: RateCaps,
    windows: Mutex<Windows>,
    clock: Box<dyn Clock>,
}

impl RateLimiter {
    pub fn new(caps: RateCaps) -> Self {
        Self::with_clock(caps, Box::new(SystemClock))
    }

    pub fn with_clock(caps: RateCaps, clock: Box<dyn Clock>) -> Self {
        Self {
            caps,
            windows: Mutex::new(Windows::default()),
            clock,
        }
    }

    /// Record one request if every window has headroom. Returns false
    /// without recording anything when any cap is saturated.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now_secs();
        let second = now as i64;
        let minute = second / 60;
        let hour = second / 3600;

        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::prune(&mut windows, second, minute, hour);

        let second_count = windows.second.get(&second).copied().unwrap_or(0);
        let minute_count: u32 = windows.minute.values().sum();
        let hour_count: u32 = windows.hour.values().sum();

        if second_count >= self.caps.per_second
            || minute_count >= self.caps.per_minute
            || hour_count >= self.caps.per_hour
        {
            return false;
        }

        *windows.second.entry(second).or_insert(0) += 1;
        *windows.minute.entry(minute).or_insert(0) += 1;
        *windows.hour.entry(hour).or_insert(0) += 1;
        true
    }

    /// Seconds until the most constrained saturated window rolls over.
    /// Zero when nothing is saturated.
    pub fn wait_hint(&self) -> f64 {
        let now = self.clock.now_secs();
        let second = now as i64;
        let minute = second / 60;
        let hour = second / 3600;

        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::prune(&mut windows, second, minute, hour);

        let mut hint = f64::INFINITY;
        if windows.second.get(&second).copied().unwrap_or(0) >= self.caps.per_second {
            hint = hint.min(1.0 - now.fract());
        }
        if windows.minute.values().sum::<u32>() >= self.caps.per_minute {
            hint = hint.min(60.0 - (now % 60.0));
        }
        if windows.hour.values().sum::<u32>() >= self.caps.per_hour {
            hint = hint.min(3600.0 - (now % 3600.0));
        }

        if hint.is_finite() {
            hint
        } else {
            0.0
        }
    }

    /// Poll until a slot opens, sleeping in short increments, or fail
    /// with RateLimitExceeded once the timeout elapses.
    pub async fn acquire(&self, timeout: Duration) -> ExchangeResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.try_acquire() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ExchangeError::RateLimitExceeded(format!(
                    "no request slot within {timeout:?}"
                )));
            }
            let nap = self.wait_hint().min(0.1).max(0.001);
            tokio::time::sleep(Duration::from_secs_f64(nap)).await;
        }
    }

    // Keep current and previous second, the last two minutes and the last
    // two hours; older buckets can never influence a check again.
    fn prune(windows: &mut Windows, second: i64, minute: i64, hour: i64) {
        windows.second.retain(|k, _| *k >= second - 1);
        windows.minute.retain(|k, _| *k >= minute - 1);
        windows.hour.retain(|k, _| *k >= hour - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// Deterministic clock holding time in milliseconds.
    struct FakeClock(AtomicU64);

    impl FakeClock {
        fn at(secs: f64) -> Arc<Self> {
            Arc::new(FakeClock(AtomicU64::new((secs * 1000.0) as u64)))
        }

        fn advance(&self, secs: f64) {
            self.0.fetch_add((secs * 1000.0) as u64, Ordering::SeqCst);
        }
    }

    impl Clock for Arc<FakeClock> {
        fn now_secs(&self) -> f64 {
            self.0.load(Ordering::SeqCst) as f64 / 1000.0
        }
    }

    fn limiter(caps: RateCaps, clock: Arc<FakeClock>) -> RateLimiter {
        RateLimiter::with_clock(caps, Box::new(clock))
    }

    #[test]
    fn per_second_cap_is_enforced() {
        let clock = FakeClock::at(1_000.0);
        let limiter = limiter(
            RateCaps {
                per_second: 3,
                per_minute: 100,
                per_hour: 1_000,
            },
            clock.clone(),
        );

        for _ in 0..3 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        clock.advance(1.0);
        assert!(limiter.try_acquire());
    }

    #[test]
    fn minute_window_spans_buckets() {
        let clock = FakeClock::at(1_000.0);
        let limiter = limiter(
            RateCaps {
                per_second: 100,
                per_minute: 5,
                per_hour: 1_000,
            },
            clock.clone(),
        );

        for _ in 0..5 {
            assert!(limiter.try_acquire());
            clock.advance(2.0);
        }
        assert!(!limiter.try_acquire());

        // Two minutes later the old buckets are pruned away.
        clock.advance(120.0);
        assert!(limiter.try_acquire());
    }

    #[test]
    fn wait_hint_points_at_the_next_rollover() {
        let clock = FakeClock::at(1_000.25);
        let limiter = limiter(
            RateCaps {
                per_second: 1,
                per_minute: 100,
                per_hour: 1_000,
            },
            clock.clone(),
        );

        assert_eq!(limiter.wait_hint(), 0.0);
        assert!(limiter.try_acquire());
        let hint = limiter.wait_hint();
        assert!((hint - 0.75).abs() < 1e-9, "hint was {hint}");
    }

    #[test]
    fn concurrent_callers_never_exceed_the_second_cap() {
        let clock = FakeClock::at(1_000.0);
        let limiter = Arc::new(limiter(
            RateCaps {
                per_second: 10,
                per_minute: 1_000,
                per_hour: 10_000,
            },
            clock,
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(std::thread::spawn(move || {
                (0..5).filter(|_| limiter.try_acquire()).count()
            }));
        }
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out_when_saturated() {
        let clock = FakeClock::at(1_000.0);
        let limiter = limiter(
            RateCaps {
                per_second: 1,
                per_minute: 100,
                per_hour: 1_000,
            },
            clock,
        );

        assert!(limiter.acquire(Duration::from_millis(50)).await.is_ok());
        let err = limiter.acquire(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ExchangeError::RateLimitExceeded(_)));
    }
}
