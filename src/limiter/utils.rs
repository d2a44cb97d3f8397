//! Platform-specific helpers shared by the hot path.
//!
//! Three small things live here: a cache-line-aligned wrapper to keep the
//! limiter's counters from false-sharing with the bucket words, a CPU
//! relaxation hint for the compare-and-swap retry loop, and the FNV-1a hash
//! that spreads identifiers across buckets.
//!
//! ## Platform Notes
//!
//! ```text
//!     x86_64 (Intel/AMD):
//!     ├─ Cache line: 64 bytes
//!     └─ PAUSE instruction for spin loops
//!
//!     AArch64 (ARM):
//!     ├─ Cache line: 128 bytes
//!     └─ YIELD via spin_loop hint
//!
//!     Generic (Fallback):
//!     └─ 64-byte lines, standard spin loop hint
//! ```

// Architecture-specific cache line sizes. These matter for the counter
// fields that sit next to the bucket array in `TokenBucketLimiter`.

/// Cache line size for x86_64 processors (Intel/AMD).
#[cfg(target_arch = "x86_64")]
pub(crate) const CACHE_LINE_SIZE: usize = 64;

/// Cache line size for ARM64 processors.
///
/// Many ARM designs fetch 128-byte lines, so alignment is doubled there.
#[cfg(target_arch = "aarch64")]
pub(crate) const CACHE_LINE_SIZE: usize = 128;

/// Default cache line size for other architectures.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(crate) const CACHE_LINE_SIZE: usize = 64;

/// CPU-specific relaxation hint for spin loops.
///
/// Called between compare-and-swap attempts when another writer got to the
/// bucket word first. Tells the CPU we are spinning so it can reduce power
/// and give resources to the winning thread.
///
/// - **x86_64**: PAUSE instruction
/// - **ARM64**: spin loop hint (YIELD)
/// - **Others**: standard spin loop hint
#[inline(always)]
pub fn cpu_relax() {
    #[cfg(target_arch = "x86_64")]
    {
        #[cfg(any(target_feature = "sse2", target_feature = "sse"))]
        unsafe {
            std::arch::x86_64::_mm_pause();
        }
        #[cfg(not(any(target_feature = "sse2", target_feature = "sse")))]
        {
            std::hint::spin_loop();
        }
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        std::hint::spin_loop();
    }
}

/// FNV-1a 64-bit hash over a byte slice.
///
/// Chosen for speed and good avalanche behavior on short keys, not for
/// collision resistance against adversarial input: a client that can choose
/// identifiers freely can manufacture collisions and concentrate load on one
/// bucket. That tradeoff is accepted for a non-cryptographic hot path.
#[inline(always)]
pub(crate) fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 14_695_981_039_346_656_037;
    const PRIME: u64 = 1_099_511_628_211;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Cache-aligned wrapper to prevent false sharing.
///
/// Without alignment, a counter bumped by one core and a bucket word CASed by
/// another can land on the same cache line and invalidate each other on every
/// write. Each wrapped value gets its own line instead.
#[cfg(target_arch = "x86_64")]
#[repr(C, align(64))]
pub(crate) struct CacheAligned<T>(pub T);
#[cfg(target_arch = "aarch64")]
#[repr(C, align(128))]
pub(crate) struct CacheAligned<T>(pub T);
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[repr(C, align(64))]
pub(crate) struct CacheAligned<T>(pub T);

impl<T> CacheAligned<T> {
    /// Creates a new cache-aligned value.
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T: Default> Default for CacheAligned<T> {
    fn default() -> Self {
        Self(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CacheAligned<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
