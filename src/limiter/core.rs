//! The sharded token bucket limiter.
//!
//! This module ties the pieces together: identifiers hash onto a power-of-two
//! array of packed bucket words, and every admission decision is a short
//! sequence of one clock read, one atomic load, pure refill/take arithmetic,
//! and at most one compare-and-swap per retry.
//!
//! ```text
//!     take_token(id) flow:
//!
//!     id ──FNV-1a──► bucket index
//!                        │
//!                        ▼
//!                  load packed word ◄────────────┐
//!                        │                       │
//!                 unpack → refill → take         │ lost the race:
//!                        │                       │ another writer
//!            unchanged? ─┴─ changed?             │ updated this word
//!                │             │                 │
//!                ▼             ▼                 │
//!          return flag   compare-and-swap ──fail─┘
//!                              │ok
//!                              ▼
//!                         return flag
//! ```
//!
//! ## Concurrency model
//!
//! There are no locks and no suspension points. Operations on different
//! buckets are fully independent; operations on the same bucket are
//! linearized by the compare-and-swap, so racing callers never consume the
//! same token twice and the token population never drifts from elapsed time.
//! The loop retries until its swap lands or no write is needed: bounding it
//! could deny a token that is provably available. Under a pathological pileup
//! on a single bucket this is lock-free rather than wait-free; sharding is
//! what keeps per-bucket contention low in practice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::atomic_array::AtomicWordArray;
use super::bucket::TokenBucket;
use super::clock::{Clock, SystemClock};
use super::config::{LimiterConfig, LimiterError, MemoryOrdering};
use super::metrics::LimiterMetrics;
use super::time56::Time56;
use super::utils::{cpu_relax, fnv1a_64, CacheAligned};

/// A sharded, lock-free token bucket rate limiter.
///
/// Each of the `num_buckets` buckets holds up to `burst_capacity` tokens and
/// refills one token every `refill_interval_nanos`. Identifiers are hashed
/// onto buckets, so one limiter serves an open-ended population of client
/// keys with a fixed memory footprint and no allocation per call.
///
/// All configuration is immutable after construction; the bucket words are
/// the only mutable state and are updated exclusively through atomic
/// compare-and-swap.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use shardrate::TokenBucketLimiter;
///
/// // 64 shards, bursts of 3, one token per second per identifier
/// let limiter = TokenBucketLimiter::new(64, 3, 1.0, Duration::from_secs(1)).unwrap();
///
/// assert!(limiter.take_token(b"alice"));
/// assert!(limiter.take_token(b"alice"));
/// assert!(limiter.take_token(b"alice"));
/// assert!(!limiter.take_token(b"alice")); // burst spent
/// ```
///
/// # Sharing
///
/// The limiter is `Send + Sync`; wrap it in an [`Arc`] and call it from as
/// many threads as you like:
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use shardrate::TokenBucketLimiter;
///
/// let limiter = Arc::new(
///     TokenBucketLimiter::new(256, 100, 0.01, Duration::from_secs(1)).unwrap(),
/// );
/// let worker = Arc::clone(&limiter);
/// std::thread::spawn(move || {
///     worker.take_token(b"client-7");
/// });
/// ```
pub struct TokenBucketLimiter {
    /// One packed bucket word per shard.
    buckets: AtomicWordArray,

    /// `num_buckets - 1`; valid because the count is a power of two.
    bucket_mask: u64,

    /// Maximum tokens per bucket.
    burst_capacity: u8,

    /// Nanosecond cost of one token; drives all refill arithmetic.
    refill_interval_nanos: i64,

    /// Number of buckets (power of two).
    num_buckets: usize,

    /// Memory ordering strategy for bucket word operations.
    ordering: MemoryOrdering,

    /// Injected time source, read once per operation.
    clock: Arc<dyn Clock>,

    // Advisory counters, cache-aligned so they never share a line with the
    // bucket words or each other.
    total_taken: CacheAligned<AtomicU64>,
    total_limited: CacheAligned<AtomicU64>,
    cas_retries: CacheAligned<AtomicU64>,
}

impl TokenBucketLimiter {
    /// Creates a limiter from the four core parameters, using the real
    /// system clock.
    ///
    /// - `num_buckets`: bucket count, must be a nonzero power of two
    /// - `burst_capacity`: maximum tokens per bucket
    /// - `refill_rate` with `refill_rate_unit`: one token accrues every
    ///   `refill_rate × refill_rate_unit`
    ///
    /// Every bucket starts full, stamped with the construction time.
    ///
    /// # Errors
    ///
    /// [`LimiterError::InvalidConfiguration`] if the bucket count is not a
    /// nonzero power of two, or the refill interval derivation produces a
    /// zero or overflowing nanosecond cost.
    pub fn new(
        num_buckets: usize,
        burst_capacity: u8,
        refill_rate: f64,
        refill_rate_unit: Duration,
    ) -> Result<Self, LimiterError> {
        Self::with_config(LimiterConfig::new(
            num_buckets,
            burst_capacity,
            refill_rate,
            refill_rate_unit,
        ))
    }

    /// Creates a limiter from a [`LimiterConfig`], using the real system
    /// clock.
    ///
    /// # Errors
    ///
    /// Whatever [`LimiterConfig::validate`] reports.
    pub fn with_config(config: LimiterConfig) -> Result<Self, LimiterError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a limiter with an explicit time source.
    ///
    /// Production callers never need this; tests inject a
    /// [`ManualClock`](super::clock::ManualClock) to make every refill
    /// deterministic.
    ///
    /// # Errors
    ///
    /// Whatever [`LimiterConfig::validate`] reports.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use shardrate::{LimiterConfig, ManualClock, TokenBucketLimiter};
    ///
    /// let clock = Arc::new(ManualClock::new(0));
    /// let config = LimiterConfig::new(1, 1, 1.0, Duration::from_secs(1));
    /// let limiter = TokenBucketLimiter::with_clock(config, clock.clone()).unwrap();
    ///
    /// assert!(limiter.take_token(b"x"));
    /// assert!(!limiter.take_token(b"x"));
    /// clock.advance(Duration::from_secs(1));
    /// assert!(limiter.take_token(b"x"));
    /// ```
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self, LimiterError> {
        config.validate()?;
        let refill_interval_nanos = config.refill_interval_nanos()?;

        let now = clock.now_nanos();
        let seed = TokenBucket::new(config.burst_capacity, Time56::from_nanos(now)).packed();

        let buckets = AtomicWordArray::new(config.num_buckets);
        for index in 0..config.num_buckets {
            buckets.store(index, seed, config.ordering.store());
        }

        debug!(
            num_buckets = config.num_buckets,
            burst_capacity = config.burst_capacity,
            refill_interval_nanos,
            "created token bucket limiter"
        );

        Ok(Self {
            buckets,
            bucket_mask: (config.num_buckets - 1) as u64,
            burst_capacity: config.burst_capacity,
            refill_interval_nanos,
            num_buckets: config.num_buckets,
            ordering: config.ordering,
            clock,
            total_taken: CacheAligned::new(AtomicU64::new(0)),
            total_limited: CacheAligned::new(AtomicU64::new(0)),
            cas_retries: CacheAligned::new(AtomicU64::new(0)),
        })
    }

    /// Reports whether a token is currently available for `id` without
    /// consuming anything.
    ///
    /// The refilled state is computed locally and discarded, never written
    /// back, so repeated checks neither grant nor lose tokens. Right after a
    /// burst of takes a check may under-report compared to a world where the
    /// refill had been published, but it never over-reports beyond what
    /// [`TokenBucketLimiter::take_token`] would allow.
    #[inline]
    pub fn check(&self, id: &[u8]) -> bool {
        let index = self.bucket_index(id);
        self.check_at(index, self.refill_interval_nanos)
    }

    /// Attempts to consume one token for `id`.
    ///
    /// Returns `true` iff a token was available and is now consumed. Safe
    /// under arbitrary concurrency: two callers racing on the same
    /// identifier can never both consume the last token.
    #[inline]
    pub fn take_token(&self, id: &[u8]) -> bool {
        let index = self.bucket_index(id);
        self.take_at(index, self.refill_interval_nanos)
    }

    /// [`check`](Self::check) against an explicit bucket index and per-token
    /// nanosecond rate.
    ///
    /// This is the composition hook: a wrapping limiter that computes its
    /// rate dynamically (per tier, per route) can reuse this limiter's
    /// bucket storage and sharding without re-deriving either. Pass an index
    /// obtained from [`TokenBucketLimiter::bucket_index`].
    ///
    /// # Panics
    ///
    /// Panics if `index >= num_buckets`.
    #[inline]
    pub fn check_at(&self, index: usize, rate_nanos: i64) -> bool {
        let now = self.clock.now_nanos();
        let existing = self.buckets.load(index, self.ordering.load());
        let refilled = TokenBucket::unpack(existing).refill(now, rate_nanos, self.burst_capacity);
        refilled.level > 0
    }

    /// [`take_token`](Self::take_token) against an explicit bucket index and
    /// per-token nanosecond rate.
    ///
    /// The compare-and-swap protocol: load the word, refill and take on the
    /// decoded copy, then install the result only if no other writer touched
    /// the word since the load. A lost race re-reads and retries; an attempt
    /// that changes nothing (denied take, no refill due) returns without
    /// writing at all. The clock is read once up front, so retries reuse the
    /// same "now" and a call's admission decision is a function of the state
    /// it finally swaps against.
    ///
    /// # Panics
    ///
    /// Panics if `index >= num_buckets`.
    pub fn take_at(&self, index: usize, rate_nanos: i64) -> bool {
        let now = self.clock.now_nanos();

        loop {
            let existing = self.buckets.load(index, self.ordering.load());
            let current = TokenBucket::unpack(existing);
            let refilled = current.refill(now, rate_nanos, self.burst_capacity);
            let (updated, taken) = refilled.take();

            if updated != current
                && !self.buckets.compare_and_swap(
                    index,
                    existing,
                    updated.packed(),
                    self.ordering.rmw(),
                    self.ordering.cas_failure(),
                )
            {
                self.cas_retries.0.fetch_add(1, Ordering::Relaxed);
                cpu_relax();
                continue;
            }

            if taken {
                self.total_taken.0.fetch_add(1, Ordering::Relaxed);
            } else {
                self.total_limited.0.fetch_add(1, Ordering::Relaxed);
                trace!(index, "rate limited");
            }
            return taken;
        }
    }

    /// The bucket index `id` maps to, stable for the limiter's lifetime.
    ///
    /// FNV-1a over the identifier bytes, masked down to the bucket count.
    #[inline(always)]
    pub fn bucket_index(&self, id: &[u8]) -> usize {
        (fnv1a_64(id) & self.bucket_mask) as usize
    }

    /// Number of buckets identifiers are sharded across.
    #[inline]
    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    /// Maximum tokens a bucket can hold.
    #[inline]
    pub fn burst_capacity(&self) -> u8 {
        self.burst_capacity
    }

    /// Nanosecond cost of one token at the configured rate.
    #[inline]
    pub fn refill_interval_nanos(&self) -> i64 {
        self.refill_interval_nanos
    }

    /// A snapshot of the limiter's activity counters.
    pub fn metrics(&self) -> LimiterMetrics {
        LimiterMetrics {
            total_taken: self.total_taken.0.load(Ordering::Relaxed),
            total_limited: self.total_limited.0.load(Ordering::Relaxed),
            cas_retries: self.cas_retries.0.load(Ordering::Relaxed),
            num_buckets: self.num_buckets,
            burst_capacity: self.burst_capacity,
        }
    }
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("num_buckets", &self.num_buckets)
            .field("burst_capacity", &self.burst_capacity)
            .field("refill_interval_nanos", &self.refill_interval_nanos)
            .field("ordering", &self.ordering)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::clock::ManualClock;
    use std::thread;

    const SECOND: i64 = 1_000_000_000;

    fn manual_limiter(
        num_buckets: usize,
        burst: u8,
        refill_rate: f64,
    ) -> (TokenBucketLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let config = LimiterConfig::new(num_buckets, burst, refill_rate, Duration::from_secs(1));
        let limiter = TokenBucketLimiter::with_clock(config, clock.clone()).unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_construction_rejects_bad_bucket_counts() {
        for buckets in [0usize, 3, 5, 6] {
            let result = TokenBucketLimiter::new(buckets, 5, 1.0, Duration::from_secs(1));
            assert!(matches!(
                result,
                Err(LimiterError::InvalidConfiguration { .. })
            ));
        }
        for buckets in [1usize, 2, 4, 64] {
            assert!(TokenBucketLimiter::new(buckets, 5, 1.0, Duration::from_secs(1)).is_ok());
        }
    }

    #[test]
    fn test_buckets_start_full() {
        let (limiter, _clock) = manual_limiter(1, 4, 1.0);
        for _ in 0..4 {
            assert!(limiter.take_token(b"k"));
        }
        assert!(!limiter.take_token(b"k"));
    }

    #[test]
    fn test_check_has_no_side_effect() {
        let (limiter, _clock) = manual_limiter(1, 2, 1.0);
        for _ in 0..100 {
            assert!(limiter.check(b"k"));
        }
        // All the checks left both tokens in place
        assert!(limiter.take_token(b"k"));
        assert!(limiter.take_token(b"k"));
        assert!(!limiter.take_token(b"k"));
        assert!(!limiter.check(b"k"));
    }

    #[test]
    fn test_refill_after_exact_interval() {
        let (limiter, clock) = manual_limiter(1, 5, 1.0);
        for _ in 0..5 {
            assert!(limiter.take_token(b"x"));
        }
        assert!(!limiter.take_token(b"x"));

        clock.advance_nanos(SECOND);
        assert!(limiter.take_token(b"x"));
        assert!(!limiter.take_token(b"x"));
    }

    #[test]
    fn test_refill_caps_at_burst_capacity() {
        let (limiter, clock) = manual_limiter(1, 3, 1.0);
        clock.advance_nanos(100 * SECOND);
        for _ in 0..3 {
            assert!(limiter.take_token(b"x"));
        }
        assert!(!limiter.take_token(b"x"));
    }

    #[test]
    fn test_clock_regression_credits_nothing() {
        let (limiter, clock) = manual_limiter(1, 2, 1.0);
        assert!(limiter.take_token(b"x"));

        clock.advance_nanos(-10 * SECOND);
        assert!(limiter.take_token(b"x"));
        assert!(!limiter.take_token(b"x"));

        // Time recovers past the stamp and refill resumes
        clock.advance_nanos(11 * SECOND);
        assert!(limiter.take_token(b"x"));
    }

    #[test]
    fn test_bucket_index_is_stable_and_masked() {
        let (limiter, _clock) = manual_limiter(64, 5, 1.0);
        let index = limiter.bucket_index(b"some-client");
        for _ in 0..10 {
            assert_eq!(limiter.bucket_index(b"some-client"), index);
        }
        assert!(index < limiter.num_buckets());

        let (single, _clock) = manual_limiter(1, 5, 1.0);
        assert_eq!(single.bucket_index(b"anything"), 0);
        assert_eq!(single.bucket_index(b""), 0);
    }

    #[test]
    fn test_different_ids_are_independent() {
        let (limiter, _clock) = manual_limiter(1024, 1, 1.0);
        // With 1024 buckets these two ids land apart (verified by index)
        let a = b"alpha".as_slice();
        let b = b"omega".as_slice();
        assert_ne!(limiter.bucket_index(a), limiter.bucket_index(b));

        assert!(limiter.take_token(a));
        assert!(!limiter.take_token(a));
        assert!(limiter.take_token(b));
    }

    #[test]
    fn test_extension_hook_custom_rate() {
        let (limiter, clock) = manual_limiter(4, 1, 1.0);
        let index = limiter.bucket_index(b"tier-x");
        assert!(limiter.take_at(index, SECOND));
        assert!(!limiter.take_at(index, SECOND));

        // A composing caller refills this bucket at 4x the configured rate
        clock.advance_nanos(SECOND / 4);
        assert!(!limiter.check_at(index, SECOND));
        assert!(limiter.check_at(index, SECOND / 4));
        assert!(limiter.take_at(index, SECOND / 4));
    }

    #[test]
    fn test_hook_tolerates_degenerate_rate() {
        let (limiter, clock) = manual_limiter(4, 1, 1.0);
        let index = limiter.bucket_index(b"x");
        assert!(limiter.take_at(index, 0));
        clock.advance_nanos(100 * SECOND);
        // Zero and negative rates refill nothing instead of panicking
        assert!(!limiter.check_at(index, 0));
        assert!(!limiter.take_at(index, -1));
    }

    #[test]
    fn test_metrics_counters() {
        let (limiter, _clock) = manual_limiter(1, 2, 1.0);
        assert!(limiter.take_token(b"m"));
        assert!(limiter.take_token(b"m"));
        assert!(!limiter.take_token(b"m"));
        assert!(!limiter.take_token(b"m"));

        let metrics = limiter.metrics();
        assert_eq!(metrics.total_taken, 2);
        assert_eq!(metrics.total_limited, 2);
        assert_eq!(metrics.num_buckets, 1);
        assert_eq!(metrics.burst_capacity, 2);
    }

    #[test]
    fn test_concurrent_takes_admit_exactly_capacity() {
        let capacity = 48u8;
        let (limiter, _clock) = manual_limiter(1, capacity, 1.0);
        let limiter = Arc::new(limiter);

        let threads = 8;
        let attempts_per_thread = 25; // 200 attempts against 48 tokens

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || {
                    let mut admitted = 0u32;
                    for _ in 0..attempts_per_thread {
                        if limiter.take_token(b"contended") {
                            admitted += 1;
                        }
                    }
                    admitted
                })
            })
            .collect();

        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, u32::from(capacity));
        assert!(!limiter.take_token(b"contended"));
    }

    #[test]
    fn test_accessors_and_debug() {
        let limiter = TokenBucketLimiter::new(16, 9, 0.5, Duration::from_secs(1)).unwrap();
        assert_eq!(limiter.num_buckets(), 16);
        assert_eq!(limiter.burst_capacity(), 9);
        assert_eq!(limiter.refill_interval_nanos(), 500_000_000);

        let debug = format!("{:?}", limiter);
        assert!(debug.contains("TokenBucketLimiter"));
        assert!(debug.contains("num_buckets: 16"));
    }

    #[test]
    fn test_sequential_ordering_variant() {
        let config = LimiterConfig::new(4, 2, 1.0, Duration::from_secs(1))
            .with_ordering(MemoryOrdering::Sequential);
        let clock = Arc::new(ManualClock::new(0));
        let limiter = TokenBucketLimiter::with_clock(config, clock).unwrap();
        assert!(limiter.take_token(b"s"));
        assert!(limiter.take_token(b"s"));
        assert!(!limiter.take_token(b"s"));
    }
}
