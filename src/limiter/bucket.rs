//! The token bucket value type and its refill/take transitions.
//!
//! A bucket is two fields, a token level and the timestamp of the last
//! refill, packed into one 64-bit word so that both can be observed and
//! replaced by a single atomic operation:
//!
//! ```text
//!     bit 63        bit 56 bit 55                              bit 0
//!     ┌──────────────────┬──────────────────────────────────────────┐
//!     │  level (8 bits)  │          stamp (56 bits, wrapping)       │
//!     └──────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! Everything in this module is a pure function from one bucket value to
//! another. The shared-memory protocol that installs these values lives in
//! `core`; keeping the transitions pure means they can be tested exhaustively
//! without any concurrency in sight.
//!
//! ## Invariants
//!
//! - `level` stays in `[0, capacity]` across every transition.
//! - `refill` never removes tokens; `take` is the only decrement.
//! - Elapsed time is only consumed in whole-token units: the remainder stays
//!   encoded in the stamp so fractional progress is never lost, no matter how
//!   often refill runs.

use super::time56::Time56;

/// A single token bucket: current level plus the stamp of its last refill.
///
/// Copied freely; equality compares both fields and is what the
/// compare-and-swap loop uses to detect "no state change needed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TokenBucket {
    /// Current number of tokens, `0..=capacity`.
    pub(crate) level: u8,
    /// Instant at which `level` was last computed.
    pub(crate) stamp: Time56,
}

impl TokenBucket {
    /// Creates a bucket with the given level and stamp.
    #[inline(always)]
    pub(crate) fn new(level: u8, stamp: Time56) -> Self {
        Self { level, stamp }
    }

    /// Returns this bucket advanced to `now_nanos`, crediting any whole
    /// tokens that have accrued since `stamp` at `rate` nanoseconds per
    /// token, capped at `capacity`.
    ///
    /// Rules, in order:
    ///
    /// 1. Non-positive elapsed time (clock standing still, a slightly stale
    ///    reading, or a wrapped stamp) credits nothing.
    /// 2. A non-positive `rate` credits nothing. Construction validates the
    ///    configured rate, but the public hooks accept caller-supplied rates
    ///    and a total function beats a division panic.
    /// 3. `elapsed / rate` whole tokens are added, capped at `capacity`.
    /// 4. If the level changed, the stamp advances by exactly the time those
    ///    tokens cost (`elapsed - elapsed % rate`); the remainder stays
    ///    banked toward the next token. If the level did not change because
    ///    the bucket is already saturated, the stamp stays put so the elapsed
    ///    time is still creditable once capacity frees up.
    #[inline]
    pub(crate) fn refill(self, now_nanos: i64, rate: i64, capacity: u8) -> Self {
        let now = Time56::from_nanos(now_nanos);

        let elapsed = now.since(self.stamp);
        if elapsed <= 0 || rate <= 0 {
            return self;
        }

        let tokens = elapsed / rate;
        if tokens <= 0 {
            return self;
        }

        let available = i64::from(capacity - self.level.min(capacity));
        let level = if tokens < available {
            self.level + tokens as u8
        } else {
            capacity
        };

        if level == self.level {
            return self;
        }

        let remainder = elapsed % rate;
        Self {
            level,
            stamp: now.sub_nanos(remainder),
        }
    }

    /// Attempts to remove one token.
    ///
    /// Returns the updated bucket and whether a token was taken. An empty
    /// bucket is returned unchanged with `false`.
    #[inline(always)]
    pub(crate) fn take(self) -> (Self, bool) {
        if self.level > 0 {
            (
                Self {
                    level: self.level - 1,
                    stamp: self.stamp,
                },
                true,
            )
        } else {
            (self, false)
        }
    }

    /// Encodes this bucket into its shared-word representation.
    #[inline(always)]
    pub(crate) fn packed(self) -> u64 {
        self.stamp.pack(self.level)
    }

    /// Decodes a bucket from its shared-word representation.
    ///
    /// Inverse of [`TokenBucket::packed`] for every valid bucket.
    #[inline(always)]
    pub(crate) fn unpack(word: u64) -> Self {
        let (level, stamp) = Time56::unpack(word);
        Self { level, stamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: i64 = 1_000; // 1000ns per token keeps the arithmetic readable

    fn bucket(level: u8, stamp_nanos: i64) -> TokenBucket {
        TokenBucket::new(level, Time56::from_nanos(stamp_nanos))
    }

    #[test]
    fn test_packed_round_trip() {
        for level in 0..=u8::MAX {
            let b = bucket(level, 123_456_789);
            assert_eq!(TokenBucket::unpack(b.packed()), b);
        }
    }

    #[test]
    fn test_refill_no_elapsed_time() {
        let b = bucket(3, 5_000);
        assert_eq!(b.refill(5_000, RATE, 10), b);
        // Stale reading: now earlier than the stamp
        assert_eq!(b.refill(4_000, RATE, 10), b);
    }

    #[test]
    fn test_refill_partial_token_is_banked() {
        let b = bucket(3, 5_000);
        // 999ns elapsed: not a whole token, nothing moves
        assert_eq!(b.refill(5_999, RATE, 10), b);
    }

    #[test]
    fn test_refill_whole_tokens() {
        let b = bucket(3, 5_000);
        let refilled = b.refill(8_000, RATE, 10);
        assert_eq!(refilled.level, 6);
        assert_eq!(refilled.stamp, Time56::from_nanos(8_000));
    }

    #[test]
    fn test_refill_keeps_remainder_in_stamp() {
        let b = bucket(0, 5_000);
        // 2.5 tokens elapsed: 2 credited, 500ns stays banked
        let refilled = b.refill(7_500, RATE, 10);
        assert_eq!(refilled.level, 2);
        assert_eq!(refilled.stamp, Time56::from_nanos(7_000));

        // The banked 500ns plus another 500ns makes the next whole token
        let again = refilled.refill(8_000, RATE, 10);
        assert_eq!(again.level, 3);
        assert_eq!(again.stamp, Time56::from_nanos(8_000));
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let b = bucket(8, 5_000);
        let refilled = b.refill(105_000, RATE, 10);
        assert_eq!(refilled.level, 10);
    }

    #[test]
    fn test_refill_saturated_keeps_stamp() {
        // Already full: the stamp must not advance, so elapsed time is still
        // available to credit after the next take.
        let b = bucket(10, 5_000);
        let refilled = b.refill(50_000, RATE, 10);
        assert_eq!(refilled, b);

        let (after_take, taken) = refilled.take();
        assert!(taken);
        let recredited = after_take.refill(50_000, RATE, 10);
        assert_eq!(recredited.level, 10);
    }

    #[test]
    fn test_refill_zero_and_negative_rate() {
        let b = bucket(2, 1_000);
        assert_eq!(b.refill(100_000, 0, 10), b);
        assert_eq!(b.refill(100_000, -5, 10), b);
    }

    #[test]
    fn test_refill_level_above_capacity_is_clamped() {
        // A level above capacity cannot arise through this module, but the
        // transition must not underflow if handed one.
        let b = bucket(20, 1_000);
        let refilled = b.refill(10_000, RATE, 10);
        assert_eq!(refilled.level, 10);
    }

    #[test]
    fn test_take_success_and_failure() {
        let b = bucket(2, 1_000);
        let (b1, ok1) = b.take();
        assert!(ok1);
        assert_eq!(b1.level, 1);
        assert_eq!(b1.stamp, b.stamp);

        let (b2, ok2) = b1.take();
        assert!(ok2);
        assert_eq!(b2.level, 0);

        let (b3, ok3) = b2.take();
        assert!(!ok3);
        assert_eq!(b3, b2);
    }

    #[test]
    fn test_level_invariant_over_random_walk() {
        let capacity = 5u8;
        let mut b = bucket(capacity, 0);
        let mut now = 0i64;
        for step in 0..10_000 {
            if step % 3 == 0 {
                now += (step % 2_700) as i64;
                b = b.refill(now, RATE, capacity);
            } else {
                b = b.take().0;
            }
            assert!(b.level <= capacity);
        }
    }

    #[test]
    fn test_non_drift_many_small_polls_equal_one_wait() {
        let capacity = 200u8;
        let start = 1_000i64;
        let total_elapsed = 57 * RATE + 321;

        let one_shot = bucket(0, start).refill(start + total_elapsed, RATE, capacity);

        let mut polled = bucket(0, start);
        let mut now = start;
        // 337ns steps never line up with the 1000ns token interval
        while now < start + total_elapsed {
            now += 337;
            polled = polled.refill(now.min(start + total_elapsed), RATE, capacity);
        }
        polled = polled.refill(start + total_elapsed, RATE, capacity);

        assert_eq!(one_shot.level, 57);
        assert_eq!(polled.level, one_shot.level);
        assert_eq!(polled.stamp, one_shot.stamp);
    }
}
