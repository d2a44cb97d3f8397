//! Time sources for the limiter.
//!
//! Every operation reads the clock exactly once, so the clock is the one
//! external dependency that decides what "elapsed" means. It is injected at
//! construction rather than read from a process-global, which keeps the core
//! deterministic under test: production code never notices the indirection,
//! and tests drive a [`ManualClock`] forward nanosecond by nanosecond.
//!
//! ```text
//!     TokenBucketLimiter ──► Clock::now_nanos()
//!                              │
//!                 ┌────────────┴────────────┐
//!           SystemClock                ManualClock
//!           (production)               (tests, simulations)
//! ```
//!
//! The contract is "monotonic enough": a brief regression between two reads
//! degrades to a refill that credits nothing, never to corrupted state.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A source of "now" in nanoseconds since a fixed reference.
///
/// Implementations must be cheap (called once per `check`/`take_token`) and
/// safe to share across threads. The reference point is arbitrary as long as
/// it never changes for the lifetime of a limiter; all arithmetic is done on
/// differences.
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds since this clock's fixed reference.
    fn now_nanos(&self) -> i64;
}

// Wall-clock epoch captured once at first use, advanced by a monotonic
// Instant afterwards. This keeps readings strictly non-decreasing even if
// the system clock is stepped while the process runs.
static START_TIME_BASE: OnceLock<(Instant, i64)> = OnceLock::new();

/// The production clock: Unix-epoch nanoseconds with a monotonic backbone.
///
/// The wall-clock offset is sampled once per process; afterwards readings
/// advance with [`Instant`], so NTP steps and daylight adjustments cannot
/// make time appear to run backwards between two limiter calls.
///
/// # Example
///
/// ```rust
/// use shardrate::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let a = clock.now_nanos();
/// let b = clock.now_nanos();
/// assert!(b >= a);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline(always)]
    fn now_nanos(&self) -> i64 {
        let (start, base_nanos) = START_TIME_BASE.get_or_init(|| {
            let epoch_nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as i64;
            (Instant::now(), epoch_nanos)
        });
        base_nanos.saturating_add(start.elapsed().as_nanos() as i64)
    }
}

/// A hand-cranked clock for deterministic tests.
///
/// Starts at an arbitrary origin and only moves when told to. Shared freely
/// across threads, so a single `ManualClock` can drive a limiter that is
/// being hammered from a thread pool while the test holds time perfectly
/// still.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use shardrate::{Clock, ManualClock};
///
/// let clock = ManualClock::new(0);
/// assert_eq!(clock.now_nanos(), 0);
/// clock.advance(Duration::from_secs(1));
/// assert_eq!(clock.now_nanos(), 1_000_000_000);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    /// Creates a manual clock reading `origin_nanos`.
    pub fn new(origin_nanos: i64) -> Self {
        Self {
            nanos: AtomicI64::new(origin_nanos),
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.nanos
            .fetch_add(delta.as_nanos() as i64, Ordering::AcqRel);
    }

    /// Moves the clock forward by a raw nanosecond count.
    ///
    /// Negative values are allowed: tests use them to simulate the small
    /// regressions a real clock source can exhibit.
    pub fn advance_nanos(&self, delta_nanos: i64) {
        self.nanos.fetch_add(delta_nanos, Ordering::AcqRel);
    }

    /// Sets the clock to an absolute reading.
    pub fn set(&self, nanos: i64) {
        self.nanos.store(nanos, Ordering::Release);
    }
}

impl Clock for ManualClock {
    #[inline(always)]
    fn now_nanos(&self) -> i64 {
        self.nanos.load(Ordering::Acquire)
    }
}

impl fmt::Display for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManualClock({}ns)", self.now_nanos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let mut last = clock.now_nanos();
        for _ in 0..1_000 {
            let now = clock.now_nanos();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let before = clock.now_nanos();
        std::thread::sleep(Duration::from_millis(5));
        let after = clock.now_nanos();
        assert!(after - before >= 5_000_000);
    }

    #[test]
    fn test_manual_clock_basics() {
        let clock = ManualClock::new(42);
        assert_eq!(clock.now_nanos(), 42);

        clock.advance(Duration::from_micros(3));
        assert_eq!(clock.now_nanos(), 3_042);

        clock.set(7);
        assert_eq!(clock.now_nanos(), 7);

        clock.advance_nanos(-7);
        assert_eq!(clock.now_nanos(), 0);
    }

    #[test]
    fn test_manual_clock_shared_across_threads() {
        let clock = Arc::new(ManualClock::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        clock.advance_nanos(2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(clock.now_nanos(), 2_000);
    }

    #[test]
    fn test_clock_trait_objects() {
        let clocks: Vec<Arc<dyn Clock>> =
            vec![Arc::new(SystemClock), Arc::new(ManualClock::new(1))];
        for clock in clocks {
            let _ = clock.now_nanos();
        }
    }
}
