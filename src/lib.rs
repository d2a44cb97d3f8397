//! # Shardrate - Sharded Lock-Free Token Bucket Rate Limiter
//!
//! A rate limiter built to sit on the hot path of a high-throughput service:
//! given an opaque identifier (a client key, an IP, an API token), it decides
//! in constant time, without locks and without allocating, whether a unit of
//! work may proceed.
//!
//! ## The Token Bucket Algorithm
//!
//! Each identifier draws from a bucket that holds up to `burst_capacity`
//! tokens and refills at a steady configured rate:
//!
//! ```text
//!     Token Bucket Visualization:
//!
//!     Time 0:    [🪙🪙🪙🪙🪙] (5 tokens available)
//!     Request 1: [🪙🪙🪙🪙] ✅ (takes 1 token)
//!     Request 2: [🪙🪙🪙] ✅ (takes 1 token)
//!     Time +1s:  [🪙🪙🪙🪙] (one token refilled)
//! ```
//!
//! ## What Makes This One Different
//!
//! The whole bucket - token level *and* last-refill timestamp - is packed
//! into a single 64-bit word:
//!
//! ```text
//!     bit 63        bit 56 bit 55                              bit 0
//!     ┌──────────────────┬──────────────────────────────────────────┐
//!     │  level (8 bits)  │     wrapping timestamp (56 bits)         │
//!     └──────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! One atomic load observes a self-consistent bucket; one compare-and-swap
//! replaces it. No mutex, no per-key allocation, no unbounded map of
//! clients: identifiers are hashed (FNV-1a) onto a fixed, power-of-two array
//! of these words, so memory is constant and contention spreads across
//! independent slots.
//!
//! ## Features
//!
//! - 🔒 **Lock-free** - refill and take are a single CAS; racing callers
//!   never double-spend a token
//! - ⚡ **Allocation-free hot path** - hash, load, arithmetic, swap
//! - 🎯 **Sharded** - per-identifier limiting with a fixed memory footprint
//! - ⏱️ **No drift** - fractional refill progress is banked in the
//!   timestamp, never lost to polling
//! - 🧪 **Deterministic tests** - the clock is injected; [`ManualClock`]
//!   makes every refill reproducible
//! - 📊 **Metrics** - admit/deny/contention counters off the hot path
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use shardrate::TokenBucketLimiter;
//!
//! // 256 buckets, bursts of 10, one token per second per identifier
//! let limiter = TokenBucketLimiter::new(256, 10, 1.0, Duration::from_secs(1)).unwrap();
//!
//! if limiter.take_token(b"client-42") {
//!     // ✅ admitted - do the work
//! } else {
//!     // ⛔ rate limited - return 429
//! }
//! ```
//!
//! ### Builder
//!
//! ```rust
//! use std::time::Duration;
//! use shardrate::{LimiterBuilder, MemoryOrdering};
//!
//! let limiter = LimiterBuilder::new()
//!     .num_buckets(1024)
//!     .burst_capacity(20)
//!     .refill_rate(1.0)
//!     .refill_rate_unit(Duration::from_millis(50)) // 20 tokens/second
//!     .memory_ordering(MemoryOrdering::AcquireRelease)
//!     .try_build()
//!     .unwrap();
//!
//! assert!(limiter.take_token(b"k"));
//! ```
//!
//! ### Scoped limits
//!
//! ```rust
//! use shardrate::{KeyedLimiterRegistry, LimiterConfig};
//!
//! let registry = KeyedLimiterRegistry::new(LimiterConfig::per_second(100)).unwrap();
//!
//! // "login" and "search" budgets are fully independent
//! registry.take_token("login", b"203.0.113.9");
//! registry.take_token("search", b"203.0.113.9");
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   Your Application      │
//!                    └──────────┬──────────────┘
//!                               │
//!                    ┌──────────▼──────────────┐
//!                    │   TokenBucketLimiter    │
//!                    ├─────────────────────────┤
//!                    │  • check(id)            │
//!                    │  • take_token(id)       │
//!                    │  • metrics()            │
//!                    └──────────┬──────────────┘
//!                               │ FNV-1a & mask
//!                    ┌──────────▼──────────────┐
//!                    │    AtomicWordArray      │
//!                    │  [u64][u64][u64][u64]…  │  one packed bucket per slot
//!                    └─────────────────────────┘
//! ```
//!
//! ## Semantics Worth Knowing
//!
//! - `check` is a pure peek: the refilled state it computes is discarded,
//!   so checks never grant or consume tokens.
//! - Refill credits whole tokens only, and the unspent remainder of elapsed
//!   time stays banked: polling a bucket a thousand times credits exactly
//!   as much as waiting the same period once.
//! - A clock reading that appears to run backwards (skew between cores, a
//!   stepped wall clock) degrades to "no refill this call", never to
//!   corrupted state.
//! - The packed timestamp wraps every ≈ 833 days; elapsed-time arithmetic
//!   is exact for gaps up to ≈ 416 days between observations of one bucket.
//! - FNV-1a is not collision-resistant against adversarial identifiers; a
//!   client that controls its own keys can concentrate load on one bucket.
//!   That is the accepted price of a non-cryptographic hot path.
//!
//! ## Thread Safety
//!
//! Everything is `Send + Sync`. Share a limiter with [`Arc`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use shardrate::{SharedLimiter, TokenBucketLimiter};
//!
//! let limiter: SharedLimiter = Arc::new(
//!     TokenBucketLimiter::new(64, 5, 1.0, Duration::from_secs(1)).unwrap(),
//! );
//! let worker = limiter.clone();
//! std::thread::spawn(move || {
//!     worker.take_token(b"job");
//! });
//! ```
//!
//! ## Examples
//!
//! See the `demos/` directory for complete examples:
//! - `basic.rs` - single limiter, bursts and refill
//! - `keyed_scopes.rs` - per-scope limits through the registry
//!
//! ## Safety
//!
//! This crate uses `unsafe` code only for the platform-specific CPU pause
//! instruction in the CAS retry loop.
//!
//! [`Arc`]: std::sync::Arc

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_op_in_unsafe_fn)]

// Internal module
mod limiter;

// Public re-exports
pub use limiter::{
    cpu_relax, AtomicWordArray, Clock, HealthStatus, KeyedLimiterRegistry, LimiterConfig,
    LimiterError, LimiterMetrics, ManualClock, MemoryOrdering, RegistryStats, SystemClock, Time56,
    TokenBucketLimiter,
};

use std::sync::Arc;
use std::time::Duration;

/// A limiter wrapped in `Arc` for convenient thread-safe sharing.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use shardrate::{SharedLimiter, TokenBucketLimiter};
///
/// let limiter = TokenBucketLimiter::new(64, 10, 1.0, Duration::from_secs(1)).unwrap();
/// let shared: SharedLimiter = Arc::new(limiter);
///
/// let clone = shared.clone();
/// std::thread::spawn(move || {
///     clone.take_token(b"id");
/// });
/// ```
pub type SharedLimiter = Arc<TokenBucketLimiter>;

/// A registry wrapped in `Arc` for convenient thread-safe sharing.
///
/// [`KeyedLimiterRegistry`] is itself cheaply cloneable; this alias exists
/// for APIs that want a single handle shape for limiters and registries.
pub type SharedRegistry = Arc<KeyedLimiterRegistry>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
///
/// This crate requires at least Rust 1.70.0 due to:
/// - `OnceLock` in the system clock
/// - Stable 64-bit atomic operations
pub const MSRV: &str = "1.70.0";

/// Prelude module for convenient imports.
///
/// Import everything you need with a single line:
/// ```rust
/// use shardrate::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for typical rate limiting use cases.
    //!
    //! # Example
    //! ```rust
    //! use std::time::Duration;
    //! use shardrate::prelude::*;
    //!
    //! let limiter = TokenBucketLimiter::new(64, 10, 1.0, Duration::from_secs(1)).unwrap();
    //! let config = LimiterConfig::per_second(50);
    //! let status = HealthStatus::Healthy;
    //! ```

    pub use crate::{
        Clock, HealthStatus, KeyedLimiterRegistry, LimiterConfig, LimiterError, LimiterMetrics,
        ManualClock, MemoryOrdering, SharedLimiter, SharedRegistry, SystemClock,
        TokenBucketLimiter,
    };
}

/// Builder pattern for creating limiters with custom configuration.
///
/// The builder provides a fluent API over [`LimiterConfig`], plus injection
/// of a custom [`Clock`]. This is the recommended way to create limiters
/// with non-default settings.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use shardrate::LimiterBuilder;
///
/// let limiter = LimiterBuilder::new()
///     .num_buckets(128)
///     .burst_capacity(5)
///     .refill_rate(1.0)
///     .refill_rate_unit(Duration::from_secs(1))
///     .build();
///
/// assert_eq!(limiter.num_buckets(), 128);
///
/// // Or use try_build() for error handling
/// let result = LimiterBuilder::new()
///     .num_buckets(3)  // Invalid!
///     .try_build();
///
/// assert!(result.is_err());
/// ```
#[derive(Clone)]
pub struct LimiterBuilder {
    config: LimiterConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl LimiterBuilder {
    /// Creates a new builder with the default configuration.
    ///
    /// Defaults: 64 buckets, bursts of 50, ten tokens per second,
    /// acquire/release ordering, system clock.
    pub fn new() -> Self {
        Self {
            config: LimiterConfig::default(),
            clock: None,
        }
    }

    /// Sets the number of buckets (must be a nonzero power of two).
    ///
    /// More buckets means fewer identifiers sharing a bucket and less CAS
    /// contention, at eight bytes per bucket.
    pub fn num_buckets(mut self, num_buckets: usize) -> Self {
        self.config.num_buckets = num_buckets;
        self
    }

    /// Sets the per-bucket burst capacity (`0..=255`).
    pub fn burst_capacity(mut self, burst_capacity: u8) -> Self {
        self.config.burst_capacity = burst_capacity;
        self
    }

    /// Sets the refill rate: one token accrues every
    /// `refill_rate × refill_rate_unit`.
    pub fn refill_rate(mut self, refill_rate: f64) -> Self {
        self.config.refill_rate = refill_rate;
        self
    }

    /// Sets the time unit the refill rate is expressed in.
    pub fn refill_rate_unit(mut self, unit: Duration) -> Self {
        self.config.refill_rate_unit = unit;
        self
    }

    /// Sets the memory ordering strategy for bucket word operations.
    pub fn memory_ordering(mut self, ordering: MemoryOrdering) -> Self {
        self.config.ordering = ordering;
        self
    }

    /// Injects a custom time source.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use shardrate::{LimiterBuilder, ManualClock};
    ///
    /// let clock = Arc::new(ManualClock::new(0));
    /// let limiter = LimiterBuilder::new()
    ///     .num_buckets(1)
    ///     .burst_capacity(1)
    ///     .clock(clock.clone())
    ///     .build();
    ///
    /// assert!(limiter.take_token(b"x"));
    /// assert!(!limiter.take_token(b"x"));
    /// clock.advance(Duration::from_millis(100)); // default rate: 10/sec
    /// assert!(limiter.take_token(b"x"));
    /// ```
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the limiter with the configured settings.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid (see
    /// [`LimiterConfig::validate`]). Use
    /// [`try_build`](LimiterBuilder::try_build) to handle errors instead.
    pub fn build(self) -> TokenBucketLimiter {
        self.try_build().expect("invalid limiter configuration")
    }

    /// Attempts to build the limiter, returning an error if the
    /// configuration is invalid.
    ///
    /// # Errors
    ///
    /// Whatever [`LimiterConfig::validate`] reports.
    pub fn try_build(self) -> Result<TokenBucketLimiter, LimiterError> {
        match self.clock {
            Some(clock) => TokenBucketLimiter::with_clock(self.config, clock),
            None => TokenBucketLimiter::with_config(self.config),
        }
    }
}

impl Default for LimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LimiterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterBuilder")
            .field("config", &self.config)
            .field("custom_clock", &self.clock.is_some())
            .finish()
    }
}
