// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded FIFO of small `Copy` entries.
//!
//! Backs per-subscriber HRT delivery queues and per-service request queues.
//! Storage is allocated once; `push` reports "full" instead of growing.
//! Callers hold the owning topic/service lock, so no atomics are needed here.

use crate::rt::pool::SlotHandle;
use crate::types::{MessageId, Timestamp};

/// One pending HRT delivery: which slot, which message, when published.
///
/// `id` guards against a stale entry observing a recycled slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub slot: SlotHandle,
    pub id: MessageId,
    pub timestamp: Timestamp,
}

/// Fixed-capacity ring buffer.
///
/// Physical storage is rounded up to a power of two for mask-based wrapping;
/// the logical limit stays exactly `limit`.
#[derive(Debug)]
pub struct BoundedRing<T: Copy + Default> {
    entries: Box<[T]>,
    mask: usize,
    limit: usize,
    head: usize,
    len: usize,
}

impl<T: Copy + Default> BoundedRing<T> {
    /// Create a ring holding at most `limit` entries (`limit` of 0 is bumped to 1).
    pub fn with_limit(limit: usize) -> Self {
        let limit = limit.max(1);
        let physical = limit.next_power_of_two();
        Self {
            entries: vec![T::default(); physical].into_boxed_slice(),
            mask: physical - 1,
            limit,
            head: 0,
            len: 0,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.limit
    }

    /// Append at the tail. Returns `false` if full.
    #[must_use]
    pub fn push(&mut self, entry: T) -> bool {
        if self.is_full() {
            return false;
        }
        let tail = (self.head + self.len) & self.mask;
        self.entries[tail] = entry;
        self.len += 1;
        true
    }

    /// Oldest entry without removing it.
    pub fn peek(&self) -> Option<T> {
        if self.len == 0 {
            None
        } else {
            Some(self.entries[self.head])
        }
    }

    /// Remove and return the oldest entry.
    pub fn pop(&mut self) -> Option<T> {
        let entry = self.peek()?;
        self.head = (self.head + 1) & self.mask;
        self.len -= 1;
        Some(entry)
    }

    /// Remove the first entry matching `pred`, preserving the order of the rest.
    pub fn remove_first(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let pos = (0..self.len).find(|&i| pred(&self.entries[(self.head + i) & self.mask]))?;
        let removed = self.entries[(self.head + pos) & self.mask];
        for i in pos..self.len - 1 {
            let dst = (self.head + i) & self.mask;
            let src = (self.head + i + 1) & self.mask;
            self.entries[dst] = self.entries[src];
        }
        self.len -= 1;
        Some(removed)
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |i| self.entries[(self.head + i) & self.mask])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_and_limit() {
        let mut ring: BoundedRing<u32> = BoundedRing::with_limit(3);
        assert!(ring.push(1));
        assert!(ring.push(2));
        assert!(ring.push(3));
        // Physical size is 4 but logical limit is 3
        assert!(!ring.push(4));
        assert!(ring.is_full());

        assert_eq!(ring.pop(), Some(1));
        assert!(ring.push(4));
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), Some(4));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_wraparound() {
        let mut ring: BoundedRing<u32> = BoundedRing::with_limit(2);
        for i in 0..100 {
            assert!(ring.push(i));
            assert_eq!(ring.peek(), Some(i));
            assert_eq!(ring.pop(), Some(i));
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_remove_first_keeps_order() {
        let mut ring: BoundedRing<u32> = BoundedRing::with_limit(4);
        // Offset head so removal crosses the wrap point
        assert!(ring.push(0));
        assert!(ring.push(0));
        ring.pop();
        ring.pop();
        for v in [10, 20, 30, 40] {
            assert!(ring.push(v));
        }
        assert_eq!(ring.remove_first(|&v| v == 20), Some(20));
        assert_eq!(ring.remove_first(|&v| v == 99), None);
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![10, 30, 40]);
        assert!(ring.push(50));
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_delivery_entries() {
        let mut ring: BoundedRing<Delivery> = BoundedRing::with_limit(1);
        let d = Delivery {
            slot: SlotHandle(3),
            id: MessageId(8),
            timestamp: Timestamp(100),
        };
        assert!(ring.push(d));
        assert_eq!(ring.pop(), Some(d));
    }
}
