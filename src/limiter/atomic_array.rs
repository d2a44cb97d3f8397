//! A fixed-size array of independently atomic 64-bit words.
//!
//! This is the only mutable shared state in the crate: one word per bucket,
//! each slot loaded and replaced on its own with no relationship to its
//! neighbors. The limiter core treats this as a narrow capability with three
//! operations:
//!
//! ```text
//!     load(i)                      → word
//!     store(i, word)               → ()       (initialization / tests)
//!     compare_and_swap(i, old, new)→ bool     (publish one bucket update)
//! ```
//!
//! A successful `compare_and_swap` with release ordering is visible to every
//! subsequent acquire `load` of the same slot; that pairing is what makes a
//! refill+take appear atomic to concurrent callers. Orderings are passed in
//! by the caller so the limiter's configured [`MemoryOrdering`] strategy
//! applies uniformly.
//!
//! [`MemoryOrdering`]: super::config::MemoryOrdering

use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed-length array of atomically accessible `u64` slots.
///
/// The length is set at construction and never changes; only slot contents
/// mutate. Indexing past the end panics like any slice access, so callers
/// derive indices from a mask over the (power-of-two) length.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::Ordering;
/// use shardrate::AtomicWordArray;
///
/// let words = AtomicWordArray::new(4);
/// words.store(2, 99, Ordering::Release);
/// assert!(words.compare_and_swap(2, 99, 100, Ordering::AcqRel, Ordering::Acquire));
/// assert_eq!(words.load(2, Ordering::Acquire), 100);
/// ```
#[derive(Debug)]
pub struct AtomicWordArray {
    words: Box<[AtomicU64]>,
}

impl AtomicWordArray {
    /// Allocates `len` slots, all initialized to zero.
    pub fn new(len: usize) -> Self {
        let mut words = Vec::with_capacity(len);
        words.resize_with(len, || AtomicU64::new(0));
        Self {
            words: words.into_boxed_slice(),
        }
    }

    /// Number of slots.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the array has no slots.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Atomically reads the word at `index`.
    #[inline(always)]
    pub fn load(&self, index: usize, ordering: Ordering) -> u64 {
        self.words[index].load(ordering)
    }

    /// Atomically writes the word at `index`.
    ///
    /// Used to seed initial bucket state; steady-state updates go through
    /// [`AtomicWordArray::compare_and_swap`] so concurrent writers cannot
    /// clobber each other.
    #[inline(always)]
    pub fn store(&self, index: usize, word: u64, ordering: Ordering) {
        self.words[index].store(word, ordering);
    }

    /// Atomically replaces the word at `index` with `new` if it still equals
    /// `expected`. Returns whether the swap happened.
    ///
    /// Uses the strong compare-exchange: a `false` here means another writer
    /// really did change the slot, so the caller's retry re-reads fresh state
    /// instead of spinning on spurious failures.
    #[inline(always)]
    pub fn compare_and_swap(
        &self,
        index: usize,
        expected: u64,
        new: u64,
        success: Ordering,
        failure: Ordering,
    ) -> bool {
        self.words[index]
            .compare_exchange(expected, new, success, failure)
            .is_ok()
    }
}
