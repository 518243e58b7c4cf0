//! Sequence counter for outbound management frames.
//!
//! # What is the 802.11 sequence number? (for beginners)
//!
//! Every management frame carries a 12-bit sequence number in its
//! sequence-control field.  Receivers use it to discard duplicates: when a
//! transmitter retries a frame whose acknowledgment was lost, the retry reuses
//! the same sequence number and has the retry bit set, so the receiver can
//! recognise it as a copy.
//!
//! Because the field is only 12 bits wide, the number wraps from 4095 back to 0.
//!
//! # Thread safety
//!
//! The counter uses `AtomicU16` internally, so it can be shared behind an
//! `Arc` if a future transmit path runs on another thread.  Inside the MLME
//! it lives in the single dispatch context and is only read there.

use std::sync::atomic::{AtomicU16, Ordering};

/// Largest value the 12-bit sequence field can hold.
pub const MAX_SEQUENCE: u16 = 0x0fff;

/// A monotonically increasing, 12-bit wrapping sequence counter.
///
/// # Examples
///
/// ```rust
/// use wlan_mlme_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// ```
pub struct SequenceCounter {
    inner: AtomicU16,
}

impl SequenceCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU16::new(0),
        }
    }

    /// Creates a counter whose first [`next`](Self::next) returns `start`.
    pub fn starting_at(start: u16) -> Self {
        Self {
            inner: AtomicU16::new(start & MAX_SEQUENCE),
        }
    }

    /// Returns the next sequence number and advances the counter.
    ///
    /// Wraps from 4095 to 0.  The underlying `u16` also wraps, and since
    /// 65536 is a multiple of 4096 the masked value stays continuous across
    /// that boundary too.
    pub fn next(&self) -> u16 {
        self.inner.fetch_add(1, Ordering::Relaxed) & MAX_SEQUENCE
    }

    /// Returns the value the next call to [`next`](Self::next) will produce.
    pub fn current(&self) -> u16 {
        self.inner.load(Ordering::Relaxed) & MAX_SEQUENCE
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
