// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-capacity message slot arena.
//!
//! Slots are addressed by index and tracked with a free-list of indices.
//! Every payload buffer is allocated once at construction; `acquire` and
//! `release` never touch the heap.
//!
//! The pool is not internally synchronized. Owners (topics, services) keep it
//! behind their own short-held mutex.
//!
//! # Performance
//!
//! - acquire: O(1), pop from free-list
//! - release: O(1), push to free-list

use crate::error::{Error, Result};
use crate::types::{MessageId, Timestamp};

/// Index of a slot inside its [`MessagePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SlotHandle(pub(crate) u16);

impl SlotHandle {
    #[inline]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Instrumentation carried by each slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageProfile {
    /// Number of times this slot has carried a message.
    pub utilizations: u64,
    /// Bound subscribers (HRT and SRT) that have not yet seen the current message.
    pub consumers_left: u32,
}

/// One reusable message record.
#[derive(Debug)]
pub struct Message {
    id: MessageId,
    timestamp: Timestamp,
    payload: Box<[u8]>,
    size: usize,
    hrt_pending: u32,
    in_use: bool,
    profile: MessageProfile,
}

impl Message {
    fn with_capacity(max_payload: usize) -> Self {
        Self {
            id: MessageId::INVALID,
            timestamp: Timestamp::ZERO,
            payload: vec![0u8; max_payload].into_boxed_slice(),
            size: 0,
            hrt_pending: 0,
            in_use: false,
            profile: MessageProfile::default(),
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.size]
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Outstanding HRT consumers.
    pub fn hrt_pending(&self) -> u32 {
        self.hrt_pending
    }

    pub fn profile(&self) -> MessageProfile {
        self.profile
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    /// Arm the HRT consumer count. Only called once per publication.
    pub(crate) fn set_hrt_pending(&mut self, consumers: u32) {
        self.hrt_pending = consumers;
    }

    /// One HRT consumer done. Returns the remaining count.
    pub(crate) fn consume_hrt(&mut self) -> u32 {
        debug_assert!(self.hrt_pending > 0, "HRT count underflow on {}", self.id);
        self.hrt_pending = self.hrt_pending.saturating_sub(1);
        self.hrt_pending
    }

    pub(crate) fn profile_mut(&mut self) -> &mut MessageProfile {
        &mut self.profile
    }
}

/// Fixed-capacity arena of [`Message`] slots with an index free-list.
///
/// # Example
/// ```
/// use micrort::rt::MessagePool;
/// use micrort::types::{MessageId, Timestamp};
///
/// let mut pool = MessagePool::new(2, 16).unwrap();
/// let slot = pool.acquire().unwrap();
/// pool.write(slot, MessageId(1), Timestamp(0), b"hello").unwrap();
/// assert_eq!(pool.get(slot).map(|m| m.payload()), Some(&b"hello"[..]));
/// pool.release(slot).unwrap();
/// assert_eq!(pool.available(), 2);
/// ```
#[derive(Debug)]
pub struct MessagePool {
    slots: Box<[Message]>,
    free: Vec<u16>,
    max_payload: usize,
}

impl MessagePool {
    /// Create a pool of `capacity` slots, each holding up to `max_payload` bytes.
    pub fn new(capacity: usize, max_payload: usize) -> Result<Self> {
        if capacity == 0 || capacity > usize::from(u16::MAX) {
            return Err(Error::Config(format!(
                "pool capacity must be in 1..={}, got {}",
                u16::MAX,
                capacity
            )));
        }
        if max_payload == 0 {
            return Err(Error::Config("pool max_payload must be > 0".to_string()));
        }

        let slots: Box<[Message]> = (0..capacity)
            .map(|_| Message::with_capacity(max_payload))
            .collect();

        // Reversed so that slot 0 is handed out first.
        let mut free = Vec::with_capacity(capacity);
        for idx in (0..capacity).rev() {
            free.push(idx as u16);
        }

        Ok(Self {
            slots,
            free,
            max_payload,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Free slots.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn in_use(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Take an unused slot. Never blocks.
    pub fn acquire(&mut self) -> Result<SlotHandle> {
        let Some(idx) = self.free.pop() else {
            return Err(Error::PoolExhausted {
                capacity: self.capacity(),
            });
        };
        let msg = &mut self.slots[usize::from(idx)];
        debug_assert!(!msg.in_use, "free-list handed out a live slot {}", idx);
        msg.in_use = true;
        msg.hrt_pending = 0;
        msg.size = 0;
        Ok(SlotHandle(idx))
    }

    /// Return a slot to the free set.
    ///
    /// Fails with [`Error::SlotInUse`] while HRT consumers still reference the
    /// message and with [`Error::SlotNotAcquired`] on a double release.
    pub fn release(&mut self, slot: SlotHandle) -> Result<()> {
        let msg = self
            .slots
            .get_mut(slot.index())
            .ok_or(Error::SlotNotAcquired(slot.0))?;
        if !msg.in_use {
            return Err(Error::SlotNotAcquired(slot.0));
        }
        if msg.hrt_pending > 0 {
            return Err(Error::SlotInUse {
                slot: slot.0,
                pending: msg.hrt_pending,
            });
        }
        msg.in_use = false;
        msg.id = MessageId::INVALID;
        msg.size = 0;
        msg.profile.consumers_left = 0;
        self.free.push(slot.0);
        Ok(())
    }

    /// Fill an acquired slot with a new message.
    pub fn write(
        &mut self,
        slot: SlotHandle,
        id: MessageId,
        timestamp: Timestamp,
        payload: &[u8],
    ) -> Result<()> {
        if payload.len() > self.max_payload {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }
        let msg = self
            .slots
            .get_mut(slot.index())
            .filter(|m| m.in_use)
            .ok_or(Error::SlotNotAcquired(slot.0))?;
        msg.payload[..payload.len()].copy_from_slice(payload);
        msg.size = payload.len();
        msg.id = id;
        msg.timestamp = timestamp;
        msg.profile.utilizations += 1;
        Ok(())
    }

    /// Copy the payload of `slot` into `buf`, returning the byte count.
    pub fn read_into(&self, slot: SlotHandle, buf: &mut [u8]) -> Result<usize> {
        let msg = self.get(slot).ok_or(Error::SlotNotAcquired(slot.0))?;
        if buf.len() < msg.size {
            return Err(Error::BufferTooSmall {
                needed: msg.size,
                available: buf.len(),
            });
        }
        buf[..msg.size].copy_from_slice(msg.payload());
        Ok(msg.size)
    }

    /// `None` for a handle that does not belong to this pool.
    pub fn get(&self, slot: SlotHandle) -> Option<&Message> {
        self.slots.get(slot.index())
    }

    /// Unchecked lookup for handles this pool minted itself.
    pub(crate) fn slot(&self, slot: SlotHandle) -> &Message {
        &self.slots[slot.index()]
    }

    pub(crate) fn get_mut(&mut self, slot: SlotHandle) -> &mut Message {
        &mut self.slots[slot.index()]
    }

    /// Iterate over slots currently held.
    pub fn iter_in_use(&self) -> impl Iterator<Item = (SlotHandle, &Message)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, m)| m.in_use)
            .map(|(i, m)| (SlotHandle(i as u16), m))
    }

    /// Drop every HRT reference and free every held slot.
    ///
    /// Used only for forced teardown. Returns the number of slots freed.
    pub(crate) fn reclaim_all(&mut self) -> usize {
        let mut reclaimed = 0;
        for idx in 0..self.slots.len() {
            let msg = &mut self.slots[idx];
            if msg.in_use {
                msg.hrt_pending = 0;
                msg.in_use = false;
                msg.id = MessageId::INVALID;
                msg.size = 0;
                msg.profile.consumers_left = 0;
                self.free.push(idx as u16);
                reclaimed += 1;
            }
        }
        reclaimed
    }
}
