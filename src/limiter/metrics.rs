//! Monitoring snapshots for the limiter.
//!
//! The limiter keeps three relaxed counters off the hot path (admitted,
//! limited, CAS retries) and [`LimiterMetrics`] is a point-in-time copy of
//! them plus the fixed configuration. Everything else here is derived
//! arithmetic: rates, contention ratios, and a coarse health classification
//! for wiring into alerting.
//!
//! ```text
//!     Metrics Snapshot:
//!     ┌─────────────────────────────────────┐
//!     │  Admit Rate: 85%                    │
//!     │  ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓░░░  (85/100)      │
//!     │                                     │
//!     │  CAS Retries/Op: 0.02               │
//!     │  Health: Healthy                    │
//!     └─────────────────────────────────────┘
//! ```
//!
//! Counters are advisory: they are updated with relaxed ordering and never
//! participate in the bucket CAS protocol, so reading metrics cannot perturb
//! admission decisions.

use std::fmt;

/// A point-in-time snapshot of limiter activity.
///
/// # Example
///
/// ```rust
/// use shardrate::TokenBucketLimiter;
/// use std::time::Duration;
///
/// let limiter = TokenBucketLimiter::new(16, 5, 1.0, Duration::from_secs(1)).unwrap();
/// limiter.take_token(b"client-a");
///
/// let metrics = limiter.metrics();
/// assert_eq!(metrics.total_taken, 1);
/// println!("{}", metrics.summary());
/// ```
#[derive(Debug, Clone)]
pub struct LimiterMetrics {
    /// Tokens successfully taken (admitted requests).
    pub total_taken: u64,

    /// Take attempts denied because the bucket was empty.
    pub total_limited: u64,

    /// Compare-and-swap retries across all takes. Each retry means another
    /// writer updated the same bucket between our load and our swap.
    pub cas_retries: u64,

    /// Number of buckets the limiter shards identifiers across.
    pub num_buckets: usize,

    /// Configured per-bucket burst capacity.
    pub burst_capacity: u8,
}

impl LimiterMetrics {
    /// Fraction of take attempts that were admitted, in `[0, 1]`.
    ///
    /// Reads as `1.0` before any traffic.
    #[inline]
    pub fn admit_rate(&self) -> f64 {
        let total = self.total_taken + self.total_limited;
        if total == 0 {
            1.0
        } else {
            self.total_taken as f64 / total as f64
        }
    }

    /// Fraction of take attempts that were rate limited.
    #[inline]
    pub fn limited_rate(&self) -> f64 {
        1.0 - self.admit_rate()
    }

    /// Total take attempts, admitted or not.
    #[inline]
    pub fn total_requests(&self) -> u64 {
        self.total_taken + self.total_limited
    }

    /// Average CAS retries per take attempt.
    ///
    /// Near zero on a well-sharded limiter. Values creeping toward `1.0`
    /// mean many callers are racing on the same bucket, which usually means
    /// identifiers are concentrating (hot key, or hash collisions on a small
    /// bucket count).
    #[inline]
    pub fn contention_ratio(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.cas_retries as f64 / total as f64
        }
    }

    /// Whether more traffic is being denied than admitted.
    #[inline]
    pub fn is_under_pressure(&self) -> bool {
        self.admit_rate() < 0.5
    }

    /// Whether bucket contention is high enough to matter.
    ///
    /// Threshold: more than one retry per four take attempts.
    #[inline]
    pub fn is_contended(&self) -> bool {
        self.contention_ratio() > 0.25
    }

    /// Coarse health classification for alerting.
    ///
    /// - [`HealthStatus::Critical`]: most traffic is being denied.
    /// - [`HealthStatus::Degraded`]: meaningful denial rate (>10%) or high
    ///   bucket contention.
    /// - [`HealthStatus::Healthy`]: everything else.
    ///
    /// # Example
    ///
    /// ```rust
    /// use shardrate::{HealthStatus, TokenBucketLimiter};
    /// use std::time::Duration;
    ///
    /// let limiter = TokenBucketLimiter::new(4, 10, 1.0, Duration::from_secs(1)).unwrap();
    /// assert_eq!(limiter.metrics().health_status(), HealthStatus::Healthy);
    /// ```
    pub fn health_status(&self) -> HealthStatus {
        if self.is_under_pressure() {
            HealthStatus::Critical
        } else if self.limited_rate() > 0.1 || self.is_contended() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Human-readable multi-line report, suitable for logs.
    ///
    /// # Example Output
    ///
    /// ```text
    /// Limiter Metrics:
    /// ├─ Traffic:
    /// │  ├─ Admit Rate: 85.00%
    /// │  ├─ Limited Rate: 15.00%
    /// │  └─ Total Requests: 1000
    /// ├─ Contention:
    /// │  └─ CAS Retries/Request: 0.020
    /// └─ Health: Degraded
    /// ```
    pub fn summary(&self) -> String {
        format!(
            "Limiter Metrics:\n\
             ├─ Traffic:\n\
             │  ├─ Admit Rate: {:.2}%\n\
             │  ├─ Limited Rate: {:.2}%\n\
             │  ├─ Total Taken: {}\n\
             │  ├─ Total Limited: {}\n\
             │  └─ Total Requests: {}\n\
             ├─ Contention:\n\
             │  ├─ CAS Retries: {}\n\
             │  └─ CAS Retries/Request: {:.3}\n\
             ├─ Shape:\n\
             │  ├─ Buckets: {}\n\
             │  └─ Burst Capacity: {}\n\
             └─ Health: {:?}",
            self.admit_rate() * 100.0,
            self.limited_rate() * 100.0,
            self.total_taken,
            self.total_limited,
            self.total_requests(),
            self.cas_retries,
            self.contention_ratio(),
            self.num_buckets,
            self.burst_capacity,
            self.health_status(),
        )
    }
}

impl fmt::Display for LimiterMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Three-level health assessment derived from a metrics snapshot.
///
/// ```text
///     Healthy ──────► Normal operation
///        │
///     Degraded ─────► Meaningful denial rate or contention; watch it
///        │
///     Critical ─────► Most traffic denied; capacity or abuse problem
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Admitting nearly everything, negligible contention.
    Healthy,

    /// More than 10% of traffic denied, or heavy CAS contention. The
    /// limiter is doing its job; whether that is good news depends on why.
    Degraded,

    /// Most traffic denied. Either capacity is configured far below demand
    /// or a client is hammering one identifier.
    Critical,
}

impl HealthStatus {
    /// Whether this status warrants attention.
    pub fn is_unhealthy(&self) -> bool {
        !matches!(self, Self::Healthy)
    }

    /// Operator guidance for this status.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::Healthy => "No action needed",
            Self::Degraded => "Check which identifiers are being limited; consider raising capacity",
            Self::Critical => "Demand far exceeds configured rate: raise limits or investigate abuse",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "Healthy"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(taken: u64, limited: u64, retries: u64) -> LimiterMetrics {
        LimiterMetrics {
            total_taken: taken,
            total_limited: limited,
            cas_retries: retries,
            num_buckets: 64,
            burst_capacity: 10,
        }
    }

    #[test]
    fn test_rates() {
        let m = snapshot(80, 20, 2);
        assert_eq!(m.admit_rate(), 0.8);
        assert!((m.limited_rate() - 0.2).abs() < 1e-12);
        assert_eq!(m.total_requests(), 100);
        assert_eq!(m.contention_ratio(), 0.02);
    }

    #[test]
    fn test_empty_snapshot_defaults() {
        let m = snapshot(0, 0, 0);
        assert_eq!(m.admit_rate(), 1.0);
        assert_eq!(m.contention_ratio(), 0.0);
        assert!(!m.is_under_pressure());
        assert_eq!(m.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_health_thresholds() {
        assert_eq!(snapshot(100, 0, 0).health_status(), HealthStatus::Healthy);
        assert_eq!(snapshot(95, 5, 0).health_status(), HealthStatus::Healthy);
        assert_eq!(snapshot(80, 20, 0).health_status(), HealthStatus::Degraded);
        assert_eq!(snapshot(100, 0, 50).health_status(), HealthStatus::Degraded);
        assert_eq!(snapshot(20, 80, 0).health_status(), HealthStatus::Critical);
    }

    #[test]
    fn test_pressure_and_contention_predicates() {
        assert!(snapshot(10, 90, 0).is_under_pressure());
        assert!(!snapshot(90, 10, 0).is_under_pressure());
        assert!(snapshot(100, 0, 30).is_contended());
        assert!(!snapshot(100, 0, 10).is_contended());
    }

    #[test]
    fn test_health_status_methods() {
        assert!(!HealthStatus::Healthy.is_unhealthy());
        assert!(HealthStatus::Degraded.is_unhealthy());
        assert!(HealthStatus::Critical.is_unhealthy());

        assert_eq!(HealthStatus::Healthy.suggested_action(), "No action needed");
        assert!(HealthStatus::Degraded.suggested_action().contains("capacity"));
        assert!(HealthStatus::Critical.suggested_action().contains("abuse"));
    }

    #[test]
    fn test_display() {
        let m = snapshot(100, 20, 5);
        let text = format!("{}", m);
        assert!(text.contains("Limiter Metrics"));
        assert!(text.contains("Admit Rate"));
        assert!(text.contains("Buckets: 64"));

        assert_eq!(format!("{}", HealthStatus::Degraded), "Degraded");
    }
}
