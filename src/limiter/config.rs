//! Configuration and validation for the sharded limiter.
//!
//! All configuration is fixed at construction; only bucket contents mutate
//! afterwards. The quantity everything downstream actually consumes is the
//! *refill interval*: the nanosecond cost of one token, derived as
//! `refill_rate × refill_rate_unit`.
//!
//! ```text
//!     Configuration Example:
//!     ┌──────────────────────────────────────────┐
//!     │ num_buckets: 64        (power of two)    │
//!     │ burst_capacity: 50     (per bucket)      │
//!     │ refill_rate: 0.1                          │
//!     │ refill_rate_unit: 1s                      │
//!     │                                          │
//!     │ Result: one token per 100ms per bucket,  │
//!     │         bursts up to 50                  │
//!     └──────────────────────────────────────────┘
//! ```
//!
//! Invalid configurations are rejected up front with
//! [`LimiterError::InvalidConfiguration`]; once a limiter exists, its
//! steady-state operations never fail.

use std::sync::atomic::Ordering;
use std::time::Duration;

use thiserror::Error;

/// Errors produced by this crate.
///
/// The taxonomy is deliberately minimal: configuration is the only thing
/// that can be wrong, and only at construction. `check` and `take_token`
/// are total over their inputs; an unknown or hostile identifier simply
/// hashes into some valid bucket and gets a normal boolean answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimiterError {
    /// The configuration cannot produce a working limiter. No partial state
    /// exists after this error.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Human-readable description of the rejected parameter.
        reason: &'static str,
    },
}

impl LimiterError {
    #[inline]
    pub(crate) fn invalid(reason: &'static str) -> Self {
        Self::InvalidConfiguration { reason }
    }
}

/// Memory ordering strategy for operations on the bucket words.
///
/// A successful compare-and-swap on a bucket word must be visible to every
/// thread that subsequently loads it; otherwise two callers could both
/// consume the same token. Acquire/release pairing is therefore the floor,
/// not an option, which is why there is no relaxed variant here.
///
/// ## Quick Guide
///
/// - `AcquireRelease` (default): the pairing the algorithm requires, at the
///   lowest cost that provides it.
/// - `Sequential`: adds a global total order over all bucket operations.
///   Useful when debugging cross-bucket interleavings; measurably slower on
///   weakly-ordered hardware.
///
/// # Example
///
/// ```rust
/// use shardrate::{LimiterConfig, MemoryOrdering};
///
/// let config = LimiterConfig::default().with_ordering(MemoryOrdering::Sequential);
/// assert_eq!(config.ordering, MemoryOrdering::Sequential);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOrdering {
    /// Acquire loads, release stores, AcqRel read-modify-writes. The
    /// default, and sufficient for every guarantee this crate makes.
    AcquireRelease,

    /// Sequentially consistent everything. Strongest guarantees, slower.
    Sequential,
}

impl MemoryOrdering {
    /// Ordering for plain loads of a bucket word.
    #[inline(always)]
    pub(crate) fn load(&self) -> Ordering {
        match self {
            Self::AcquireRelease => Ordering::Acquire,
            Self::Sequential => Ordering::SeqCst,
        }
    }

    /// Ordering for plain stores (initialization only).
    #[inline(always)]
    pub(crate) fn store(&self) -> Ordering {
        match self {
            Self::AcquireRelease => Ordering::Release,
            Self::Sequential => Ordering::SeqCst,
        }
    }

    /// Ordering for the success side of a compare-and-swap.
    #[inline(always)]
    pub(crate) fn rmw(&self) -> Ordering {
        match self {
            Self::AcquireRelease => Ordering::AcqRel,
            Self::Sequential => Ordering::SeqCst,
        }
    }

    /// Ordering for the failure side of a compare-and-swap.
    #[inline(always)]
    pub(crate) fn cas_failure(&self) -> Ordering {
        match self {
            Self::AcquireRelease => Ordering::Acquire,
            Self::Sequential => Ordering::SeqCst,
        }
    }
}

impl Default for MemoryOrdering {
    fn default() -> Self {
        Self::AcquireRelease
    }
}

/// Configuration for a [`TokenBucketLimiter`].
///
/// `refill_rate` and `refill_rate_unit` together define the cost of one
/// token: `refill_rate` is how many `refill_rate_unit` periods a token takes
/// to accrue. `refill_rate = 1.0` with a unit of one second is one token per
/// second; `refill_rate = 0.01` with the same unit is a hundred per second.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use shardrate::LimiterConfig;
///
/// // 100 tokens/second per identifier, bursts of 20, 256 shards
/// let config = LimiterConfig::per_second(100)
///     .with_burst_capacity(20)
///     .with_num_buckets(256);
/// assert_eq!(config.refill_interval_nanos().unwrap(), 10_000_000);
///
/// // Fully explicit
/// let config = LimiterConfig::new(64, 10, 2.5, Duration::from_millis(100));
/// assert_eq!(config.refill_interval_nanos().unwrap(), 250_000_000);
/// ```
///
/// [`TokenBucketLimiter`]: super::core::TokenBucketLimiter
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Number of independent buckets. Must be a nonzero power of two so the
    /// bucket index is a bitmask over the hash and contention scales
    /// predictably with the count.
    pub num_buckets: usize,

    /// Maximum tokens a bucket can hold, `0..=255`. Bounds how much traffic
    /// one identifier can push through instantaneously after idling.
    pub burst_capacity: u8,

    /// Number of `refill_rate_unit` periods needed to accrue one token.
    /// Must be finite and strictly positive.
    pub refill_rate: f64,

    /// The time unit `refill_rate` is expressed in.
    pub refill_rate_unit: Duration,

    /// Memory ordering strategy for bucket word operations.
    pub ordering: MemoryOrdering,
}

impl Default for LimiterConfig {
    /// 64 buckets, bursts of 50, ten tokens per second per bucket.
    fn default() -> Self {
        Self {
            num_buckets: 64,
            burst_capacity: 50,
            refill_rate: 0.1,
            refill_rate_unit: Duration::from_secs(1),
            ordering: MemoryOrdering::default(),
        }
    }
}

impl LimiterConfig {
    /// Creates a configuration from the four core parameters.
    pub fn new(
        num_buckets: usize,
        burst_capacity: u8,
        refill_rate: f64,
        refill_rate_unit: Duration,
    ) -> Self {
        Self {
            num_buckets,
            burst_capacity,
            refill_rate,
            refill_rate_unit,
            ordering: MemoryOrdering::default(),
        }
    }

    /// Configuration for `tokens_per_second` tokens per second, with burst
    /// capacity set to one second's worth (capped at 255).
    ///
    /// # Example
    ///
    /// ```rust
    /// use shardrate::LimiterConfig;
    ///
    /// let config = LimiterConfig::per_second(50);
    /// assert_eq!(config.refill_interval_nanos().unwrap(), 20_000_000);
    /// assert_eq!(config.burst_capacity, 50);
    /// ```
    pub fn per_second(tokens_per_second: u32) -> Self {
        Self {
            burst_capacity: tokens_per_second.min(u32::from(u8::MAX)) as u8,
            refill_rate: 1.0 / f64::from(tokens_per_second.max(1)),
            refill_rate_unit: Duration::from_secs(1),
            ..Self::default()
        }
    }

    /// Configuration for `tokens_per_minute` tokens per minute, with burst
    /// capacity set to one minute's worth (capped at 255).
    pub fn per_minute(tokens_per_minute: u32) -> Self {
        Self {
            burst_capacity: tokens_per_minute.min(u32::from(u8::MAX)) as u8,
            refill_rate: 1.0 / f64::from(tokens_per_minute.max(1)),
            refill_rate_unit: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Sets the number of buckets.
    pub fn with_num_buckets(mut self, num_buckets: usize) -> Self {
        self.num_buckets = num_buckets;
        self
    }

    /// Sets the per-bucket burst capacity.
    pub fn with_burst_capacity(mut self, burst_capacity: u8) -> Self {
        self.burst_capacity = burst_capacity;
        self
    }

    /// Sets the memory ordering strategy.
    pub fn with_ordering(mut self, ordering: MemoryOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Derives the nanosecond cost of one token.
    ///
    /// This value, not `refill_rate` itself, drives all refill arithmetic.
    /// The derivation can go wrong in two directions: a tiny rate truncates
    /// to zero nanoseconds (an infinite effective rate), a huge one
    /// overflows `i64`. Both are rejected here rather than clamped, so a
    /// limiter never silently runs at a rate orders of magnitude away from
    /// the one configured.
    ///
    /// # Errors
    ///
    /// [`LimiterError::InvalidConfiguration`] if `refill_rate` is not finite
    /// and positive, or the product falls outside `[1, i64::MAX]`.
    pub fn refill_interval_nanos(&self) -> Result<i64, LimiterError> {
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(LimiterError::invalid(
                "refill_rate must be finite and greater than zero",
            ));
        }

        let interval = self.refill_rate_unit.as_nanos() as f64 * self.refill_rate;
        if interval < 1.0 {
            return Err(LimiterError::invalid(
                "refill interval truncates to zero nanoseconds per token",
            ));
        }
        if interval >= i64::MAX as f64 {
            return Err(LimiterError::invalid(
                "refill interval overflows nanoseconds per token",
            ));
        }

        Ok(interval as i64)
    }

    /// Validates the whole configuration.
    ///
    /// Called by every constructor; exposed so callers can vet configs
    /// loaded from external sources before building anything.
    ///
    /// # Errors
    ///
    /// [`LimiterError::InvalidConfiguration`] if `num_buckets` is zero or
    /// not a power of two, or the refill interval derivation fails.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use shardrate::LimiterConfig;
    ///
    /// let bad = LimiterConfig::new(3, 5, 1.0, Duration::from_secs(1));
    /// assert!(bad.validate().is_err());
    ///
    /// let good = LimiterConfig::new(4, 5, 1.0, Duration::from_secs(1));
    /// assert!(good.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), LimiterError> {
        if self.num_buckets == 0 || !self.num_buckets.is_power_of_two() {
            return Err(LimiterError::invalid(
                "num_buckets must be a nonzero power of two",
            ));
        }

        self.refill_interval_nanos()?;

        Ok(())
    }

    /// The effective sustained rate in tokens per second, for display.
    ///
    /// # Example
    ///
    /// ```rust
    /// use shardrate::LimiterConfig;
    ///
    /// let config = LimiterConfig::per_second(200);
    /// assert_eq!(config.effective_tokens_per_second(), 200.0);
    /// ```
    pub fn effective_tokens_per_second(&self) -> f64 {
        match self.refill_interval_nanos() {
            Ok(nanos) => 1e9 / nanos as f64,
            Err(_) => 0.0,
        }
    }
}
