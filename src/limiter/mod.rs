//! Internal implementation of the sharded token bucket limiter.
//!
//! ## Module Structure
//!
//! ```text
//!     limiter/
//!     ├── mod.rs          (You are here - module organization)
//!     ├── config.rs       (Configuration, validation, error type)
//!     ├── time56.rs       (56-bit wrapping timestamp)
//!     ├── bucket.rs       (Packed bucket value + refill/take transitions)
//!     ├── atomic_array.rs (Atomic u64 slot array)
//!     ├── clock.rs        (Injectable time sources)
//!     ├── core.rs         (Limiter façade, sharding, CAS protocol)
//!     ├── metrics.rs      (Activity snapshots and health)
//!     ├── registry.rs     (Per-scope limiter collection)
//!     └── utils.rs        (Cache alignment, spin hints, FNV-1a)
//! ```
//!
//! ## Layering
//!
//! ```text
//!     Caller
//!        │
//!        ▼
//!     ┌──────────┐      ┌──────────┐
//!     │ Registry │ ──►  │   Core   │ ◄── hashing, CAS retry loop
//!     └──────────┘      └────┬─────┘
//!                            │
//!              ┌─────────────┼──────────────┐
//!              ▼             ▼              ▼
//!         ┌────────┐   ┌──────────┐   ┌─────────┐
//!         │ bucket │   │  atomic  │   │  clock  │
//!         │ time56 │   │  array   │   │         │
//!         └────────┘   └──────────┘   └─────────┘
//! ```
//!
//! `bucket` and `time56` are pure value arithmetic; `atomic_array` is the
//! only shared mutable state; `core` is the only module that combines them.

// Declare submodules (internal organization)
mod atomic_array;
mod bucket;
mod clock;
mod config;
mod core;
mod metrics;
mod registry;
mod time56;
mod utils;

// Re-export public types for external use

/// The atomic word array backing the bucket state
pub use atomic_array::AtomicWordArray;

/// Time sources: the production clock and the deterministic test double
pub use clock::{Clock, ManualClock, SystemClock};

/// Configuration, validation and the construction-time error type
pub use config::{LimiterConfig, LimiterError, MemoryOrdering};

/// The sharded limiter itself
pub use self::core::TokenBucketLimiter;

/// Metrics and health monitoring for observability
pub use metrics::{HealthStatus, LimiterMetrics};

/// Per-scope limiter collection
pub use registry::{KeyedLimiterRegistry, RegistryStats};

/// The 56-bit wrapping timestamp used inside packed bucket words
pub use time56::Time56;

/// CPU relaxation hint, exposed for callers writing their own spin loops
pub use utils::cpu_relax;
