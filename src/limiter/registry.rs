//! A registry of independent limiters keyed by scope name.
//!
//! One [`TokenBucketLimiter`] already serves an open-ended population of
//! identifiers, but real services usually carry several distinct limits at
//! once: one per endpoint, per tenant class, per background job type. The
//! registry manages that collection, creating each scope's sharded limiter
//! on first use from a shared configuration template.
//!
//! ```text
//!     Scoped Limiting:
//!
//!     ("login",  client_ip) ──┐
//!     ("search", api_key)  ───┼──► Registry ──► per-scope limiters
//!     ("export", tenant_id) ──┘        │
//!                                      ▼
//!                               ┌──────────────┐
//!                               │  DashMap     │
//!                               │  ┌─────────┐ │
//!                               │  │scope→TBL│ │  TBL = TokenBucketLimiter
//!                               │  │scope→TBL│ │
//!                               │  └─────────┘ │
//!                               └──────────────┘
//! ```
//!
//! Scope cardinality is application-defined and expected to be small; a hard
//! bound caps it anyway so a bug that generates scope names from request
//! data cannot allocate without limit. Scopes at the bound are denied
//! outright, which fails closed for admission control.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::config::{LimiterConfig, LimiterError};
use super::core::TokenBucketLimiter;

/// Maximum number of scopes a registry will track.
///
/// Scope names are supposed to come from code, not requests; this bound
/// turns an accidental unbounded namespace into denied admissions and a
/// warning log instead of unbounded memory growth.
const MAX_TRACKED_SCOPES: usize = 1_024;

/// A collection of sharded limiters, one per named scope.
///
/// Cloning the registry is cheap and shares all state, the same way the
/// underlying limiters are shared.
///
/// # Example
///
/// ```rust
/// use shardrate::{KeyedLimiterRegistry, LimiterConfig};
///
/// let registry = KeyedLimiterRegistry::new(LimiterConfig::per_second(100)).unwrap();
///
/// // Each scope gets its own independent bucket array
/// if registry.take_token("login", b"203.0.113.9") {
///     // handle the login attempt
/// }
/// if registry.take_token("search", b"203.0.113.9") {
///     // same client, separate budget
/// }
/// ```
#[derive(Clone)]
pub struct KeyedLimiterRegistry {
    /// Scope name to limiter. DashMap gives lock-free-ish concurrent access
    /// with internal sharding of its own.
    limiters: Arc<DashMap<String, Arc<TokenBucketLimiter>, ahash::RandomState>>,

    /// Active scope count, kept beside the map for cheap capacity checks.
    active_count: Arc<AtomicUsize>,

    /// Template used for every scope's limiter. Validated at registry
    /// construction, so later limiter creation cannot fail.
    config: LimiterConfig,

    /// Time source handed to every limiter this registry creates.
    clock: Arc<dyn Clock>,

    /// Limiters created since construction.
    total_created: Arc<AtomicU64>,

    /// Limiters removed since construction.
    total_removed: Arc<AtomicU64>,
}

impl KeyedLimiterRegistry {
    /// Creates a registry whose scopes use the given configuration and the
    /// real system clock.
    ///
    /// # Errors
    ///
    /// Whatever [`LimiterConfig::validate`] reports; a registry is never
    /// created with a template that could fail later.
    pub fn new(config: LimiterConfig) -> Result<Self, LimiterError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a registry with an explicit time source shared by every
    /// scope's limiter.
    ///
    /// # Errors
    ///
    /// Whatever [`LimiterConfig::validate`] reports.
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self, LimiterError> {
        config.validate()?;

        Ok(Self {
            limiters: Arc::new(DashMap::with_hasher(ahash::RandomState::new())),
            active_count: Arc::new(AtomicUsize::new(0)),
            config,
            clock,
            total_created: Arc::new(AtomicU64::new(0)),
            total_removed: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Gets the limiter for `scope`, creating it on first use.
    ///
    /// Returns `None` only when the registry is at its scope bound and
    /// `scope` is new.
    pub fn get_limiter(&self, scope: &str) -> Option<Arc<TokenBucketLimiter>> {
        // Fast path: the common case after warmup, no allocation
        if let Some(limiter) = self.limiters.get(scope) {
            return Some(limiter.clone());
        }

        if self.active_count.load(Ordering::Acquire) >= MAX_TRACKED_SCOPES {
            warn!(scope, "scope limit reached, refusing new limiter");
            return None;
        }

        // Entry API makes insert-or-get atomic across racing creators
        match self.limiters.entry(scope.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => Some(occupied.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let prev = self.active_count.fetch_add(1, Ordering::AcqRel);
                if prev >= MAX_TRACKED_SCOPES {
                    // Lost a race past the bound; roll back our reservation
                    self.active_count.fetch_sub(1, Ordering::AcqRel);
                    warn!(scope, "scope limit race detected, refusing new limiter");
                    return None;
                }

                let limiter = match TokenBucketLimiter::with_clock(
                    self.config.clone(),
                    Arc::clone(&self.clock),
                ) {
                    Ok(limiter) => Arc::new(limiter),
                    Err(error) => {
                        // Template was validated at construction; this arm
                        // exists so a future invariant break fails closed.
                        self.active_count.fetch_sub(1, Ordering::AcqRel);
                        warn!(scope, %error, "failed to create scope limiter");
                        return None;
                    }
                };

                vacant.insert(limiter.clone());
                self.total_created.fetch_add(1, Ordering::Relaxed);
                debug!(scope, total = prev + 1, "created scope limiter");
                Some(limiter)
            }
        }
    }

    /// Attempts to take a token for `id` within `scope`.
    ///
    /// Denies when the registry is at its scope bound and `scope` is new:
    /// admission control fails closed.
    #[inline]
    pub fn take_token(&self, scope: &str, id: &[u8]) -> bool {
        match self.get_limiter(scope) {
            Some(limiter) => limiter.take_token(id),
            None => false,
        }
    }

    /// Reports whether a token is available for `id` within `scope`,
    /// without consuming it.
    ///
    /// Like [`KeyedLimiterRegistry::take_token`], fails closed at the scope
    /// bound.
    #[inline]
    pub fn check(&self, scope: &str, id: &[u8]) -> bool {
        match self.get_limiter(scope) {
            Some(limiter) => limiter.check(id),
            None => false,
        }
    }

    /// Removes `scope` and its limiter. Returns whether it existed.
    ///
    /// Outstanding `Arc` handles keep working; the next use of the name
    /// creates a fresh, fully-charged limiter.
    pub fn remove(&self, scope: &str) -> bool {
        if self.limiters.remove(scope).is_some() {
            self.active_count.fetch_sub(1, Ordering::AcqRel);
            self.total_removed.fetch_add(1, Ordering::Relaxed);
            debug!(scope, "removed scope limiter");
            true
        } else {
            false
        }
    }

    /// Number of active scopes.
    pub fn len(&self) -> usize {
        self.active_count.load(Ordering::Acquire)
    }

    /// Whether no scopes are active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `scope` currently has a limiter.
    pub fn contains(&self, scope: &str) -> bool {
        self.limiters.contains_key(scope)
    }

    /// A snapshot of the registry's lifecycle counters.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_scopes: self.len(),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_removed: self.total_removed.load(Ordering::Relaxed),
            max_scopes: MAX_TRACKED_SCOPES,
        }
    }
}

impl std::fmt::Debug for KeyedLimiterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedLimiterRegistry")
            .field("active_scopes", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Lifecycle counters for a [`KeyedLimiterRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Scopes currently tracked.
    pub active_scopes: usize,
    /// Limiters created since construction.
    pub total_created: u64,
    /// Limiters removed since construction.
    pub total_removed: u64,
    /// Hard bound on tracked scopes.
    pub max_scopes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::clock::ManualClock;
    use std::time::Duration;

    fn manual_registry(burst: u8) -> (KeyedLimiterRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let config = LimiterConfig::new(4, burst, 1.0, Duration::from_secs(1));
        let registry = KeyedLimiterRegistry::with_clock(config, clock.clone()).unwrap();
        (registry, clock)
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let config = LimiterConfig::new(3, 5, 1.0, Duration::from_secs(1));
        assert!(KeyedLimiterRegistry::new(config).is_err());
    }

    #[test]
    fn test_get_limiter_is_get_or_create() {
        let (registry, _clock) = manual_registry(5);
        assert!(registry.is_empty());

        let first = registry.get_limiter("login").unwrap();
        let second = registry.get_limiter("login").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("login"));
        assert!(!registry.contains("search"));
    }

    #[test]
    fn test_scopes_have_independent_budgets() {
        let (registry, _clock) = manual_registry(1);
        assert!(registry.take_token("login", b"client"));
        assert!(!registry.take_token("login", b"client"));
        // Same identifier, different scope, fresh budget
        assert!(registry.take_token("search", b"client"));
    }

    #[test]
    fn test_check_does_not_consume() {
        let (registry, _clock) = manual_registry(1);
        for _ in 0..10 {
            assert!(registry.check("api", b"k"));
        }
        assert!(registry.take_token("api", b"k"));
        assert!(!registry.check("api", b"k"));
    }

    #[test]
    fn test_refill_through_shared_clock() {
        let (registry, clock) = manual_registry(1);
        assert!(registry.take_token("jobs", b"worker-1"));
        assert!(!registry.take_token("jobs", b"worker-1"));
        clock.advance(Duration::from_secs(1));
        assert!(registry.take_token("jobs", b"worker-1"));
    }

    #[test]
    fn test_remove_and_recreate() {
        let (registry, _clock) = manual_registry(1);
        assert!(registry.take_token("tmp", b"x"));
        assert!(!registry.take_token("tmp", b"x"));

        assert!(registry.remove("tmp"));
        assert!(!registry.remove("tmp"));
        assert!(registry.is_empty());

        // Recreated scope starts fully charged
        assert!(registry.take_token("tmp", b"x"));
    }

    #[test]
    fn test_scope_bound_fails_closed() {
        let clock = Arc::new(ManualClock::new(0));
        let config = LimiterConfig::new(1, 1, 1.0, Duration::from_secs(1));
        let registry = KeyedLimiterRegistry::with_clock(config, clock).unwrap();

        for i in 0..MAX_TRACKED_SCOPES {
            assert!(registry.get_limiter(&format!("scope-{i}")).is_some());
        }
        assert_eq!(registry.len(), MAX_TRACKED_SCOPES);

        // New scope past the bound: denied, existing scopes unaffected
        assert!(registry.get_limiter("one-too-many").is_none());
        assert!(!registry.take_token("one-too-many", b"id"));
        assert!(!registry.check("one-too-many", b"id"));
        assert!(registry.take_token("scope-0", b"id"));

        // Removal frees a slot
        assert!(registry.remove("scope-1"));
        assert!(registry.get_limiter("one-too-many").is_some());
    }

    #[test]
    fn test_stats() {
        let (registry, _clock) = manual_registry(1);
        registry.get_limiter("a").unwrap();
        registry.get_limiter("b").unwrap();
        registry.remove("a");

        let stats = registry.stats();
        assert_eq!(stats.active_scopes, 1);
        assert_eq!(stats.total_created, 2);
        assert_eq!(stats.total_removed, 1);
        assert_eq!(stats.max_scopes, MAX_TRACKED_SCOPES);
    }

    #[test]
    fn test_clone_shares_state() {
        let (registry, _clock) = manual_registry(1);
        let clone = registry.clone();
        assert!(registry.take_token("shared", b"x"));
        assert!(!clone.take_token("shared", b"x"));
        assert_eq!(clone.len(), 1);
    }

    #[test]
    fn test_debug_impl() {
        let (registry, _clock) = manual_registry(1);
        let debug = format!("{:?}", registry);
        assert!(debug.contains("KeyedLimiterRegistry"));
    }
}
