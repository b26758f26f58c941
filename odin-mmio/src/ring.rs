//! Lock-Free SPSC Byte Ring
//!
//! A fixed-capacity single-producer / single-consumer byte FIFO for handing
//! data from IRQ context to the foreground task without locks.
//!
//! # Protocol
//!
//! `head` is owned by the producer, `tail` by the consumer. Both advance
//! monotonically modulo the capacity. Index publication uses release stores
//! and acquire loads, so the byte written at `buffer[head]` is visible to
//! the consumer before the advanced `head` is, and symmetrically for `tail`.
//!
//! - empty: `head == tail`
//! - full: `(head + 1) % N == tail` (one slot is sacrificed)
//! - overrun: the producer drops the byte silently
//!
//! The capacity must be a power of two.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// A single-producer / single-consumer byte ring.
///
/// # Usage contract
///
/// Exactly one context may call [`try_push`](Self::try_push) (the producer,
/// typically an IRQ handler) and exactly one context may call
/// [`pop`](Self::pop) (the consumer). The type is `Sync` under that
/// contract; violating it is a logic error, not a memory-safety error for
/// byte payloads, but ordering guarantees are lost.
pub struct SpscRing<const N: usize> {
    buffer: UnsafeCell<[u8; N]>,
    /// Producer index: next slot to write
    head: AtomicUsize,
    /// Consumer index: next slot to read
    tail: AtomicUsize,
}

// SAFETY: head/tail are atomics; the buffer is partitioned between the
// single producer (writes only at head) and single consumer (reads only at
// tail), with release/acquire index publication ordering the byte accesses.
unsafe impl<const N: usize> Sync for SpscRing<N> {}

impl<const N: usize> SpscRing<N> {
    const MASK: usize = N - 1;

    /// Create an empty ring.
    #[must_use]
    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "ring capacity must be a power of two");
        Self {
            buffer: UnsafeCell::new([0; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Push a byte (producer side).
    ///
    /// Returns `false` and drops the byte if the ring is full.
    pub fn try_push(&self, byte: u8) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);

        let next = (head + 1) & Self::MASK;
        if next == tail {
            return false;
        }

        // SAFETY: Only the producer writes at `head`, and the consumer will
        // not read this slot until the release store below publishes it.
        unsafe {
            (*self.buffer.get())[head] = byte;
        }
        self.head.store(next, Ordering::Release);
        true
    }

    /// Pop a byte (consumer side).
    ///
    /// Returns `None` if the ring is empty.
    pub fn pop(&self) -> Option<u8> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        // SAFETY: `head != tail`, so the slot at `tail` was published by the
        // producer's release store of `head`; the acquire load above makes
        // the byte write visible. Only the consumer advances `tail`.
        let byte = unsafe { (*self.buffer.get())[tail] };
        self.tail.store((tail + 1) & Self::MASK, Ordering::Release);
        Some(byte)
    }

    /// Number of bytes currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & Self::MASK
    }

    /// Check if the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total capacity in bytes. One slot is reserved, so at most `N - 1`
    /// bytes can be queued at once.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for SpscRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let ring: SpscRing<256> = SpscRing::new();
        assert!(ring.is_empty());
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn fifo_order_is_preserved() {
        let ring: SpscRing<256> = SpscRing::new();
        for b in 1..=0xFFu8 {
            assert!(ring.try_push(b));
        }
        for b in 1..=0xFFu8 {
            assert_eq!(ring.pop(), Some(b));
        }
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn full_at_capacity_minus_one() {
        let ring: SpscRing<256> = SpscRing::new();
        // 255 bytes fit
        for i in 0..255u32 {
            assert!(ring.try_push(i as u8), "push {i} should succeed");
        }
        assert_eq!(ring.len(), 255);
        // The 256th is dropped
        assert!(!ring.try_push(0xEE));
        assert_eq!(ring.len(), 255);
        // Contents are unchanged and in order
        assert_eq!(ring.pop(), Some(0));
        // One slot freed: one more push succeeds
        assert!(ring.try_push(0xEE));
        assert!(!ring.try_push(0xEF));
    }

    #[test]
    fn wraps_around_the_buffer_end() {
        let ring: SpscRing<8> = SpscRing::new();
        // Walk the indexes past several wraps
        for round in 0..64u32 {
            for i in 0..5u8 {
                assert!(ring.try_push(round as u8 ^ i));
            }
            for i in 0..5u8 {
                assert_eq!(ring.pop(), Some(round as u8 ^ i));
            }
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn len_tracks_occupancy() {
        let ring: SpscRing<16> = SpscRing::new();
        for i in 0..10 {
            ring.try_push(i);
        }
        assert_eq!(ring.len(), 10);
        for _ in 0..4 {
            ring.pop();
        }
        assert_eq!(ring.len(), 6);
    }
}
