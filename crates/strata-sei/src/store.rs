//! # Message Store
//!
//! Bounded FIFO of metadata messages waiting for the next keyframe.
//!
//! [`MessageRing`] is the fixed-capacity ring itself; [`MessageStore`] wraps
//! it in a mutex whose every acquisition is bounded by a timeout, so neither
//! the frame path nor application threads can stall on it.
//!
//! When the ring is full the oldest message is evicted to make room. The
//! store prefers fresh metadata over guaranteed delivery of old metadata.

use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use quanta::Instant;

use crate::config::QueueConfig;
use crate::error::{try_buffer, SeiError};

// ─── Message ─────────────────────────────────────────────────────────────────

/// A queued metadata message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Opaque payload, never interpreted by the store.
    pub payload: Bytes,
    /// How many copies of the SEI unit go into the keyframe. Always > 0.
    pub repeat_count: u32,
    /// When the message entered the store.
    pub enqueued_at: Instant,
}

// ─── MessageRing ─────────────────────────────────────────────────────────────

/// Fixed-capacity circular FIFO.
///
/// Invariants: `len <= capacity`, `head < capacity`, and exactly the `len`
/// slots starting at `head` (wrapping) are occupied.
#[derive(Debug)]
pub struct MessageRing {
    slots: Box<[Option<Message>]>,
    head: usize,
    len: usize,
}

impl MessageRing {
    /// Create an empty ring. Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        MessageRing {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    /// Append a message. If the ring is full, the oldest message is removed
    /// first and returned.
    pub fn push(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.is_full() { self.pop() } else { None };
        let tail = (self.head + self.len) % self.capacity();
        self.slots[tail] = Some(message);
        self.len += 1;
        evicted
    }

    /// Remove and return the oldest message.
    pub fn pop(&mut self) -> Option<Message> {
        if self.len == 0 {
            return None;
        }
        let message = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        message
    }

    /// Remove every message, oldest first.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.len);
        while let Some(message) = self.pop() {
            out.push(message);
        }
        self.head = 0;
        out
    }

    /// Drop every message. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let cleared = self.len;
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
        cleared
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

// ─── MessageStore ────────────────────────────────────────────────────────────

/// Thread-safe message store shared by producers and the frame processor.
#[derive(Debug)]
pub struct MessageStore {
    ring: Mutex<MessageRing>,
    capacity: usize,
    max_payload_size: usize,
    default_repeat_count: u32,
    lock_timeout: Duration,
}

impl MessageStore {
    /// `lock_timeout` bounds every management operation (enqueue, size, clear,
    /// dequeue_all).
    pub fn new(config: &QueueConfig, lock_timeout: Duration) -> Self {
        let capacity = config.capacity.max(1);
        MessageStore {
            ring: Mutex::new(MessageRing::new(capacity)),
            capacity,
            max_payload_size: config.max_payload_size,
            default_repeat_count: config.default_repeat_count.max(1),
            lock_timeout,
        }
    }

    /// Queue a copy of `payload`. A `repeat_count` of 0 selects the default.
    ///
    /// Payloads over the limit are rejected. A full store evicts its oldest
    /// message instead of rejecting the new one.
    pub fn enqueue(&self, payload: &[u8], repeat_count: u32) -> Result<(), SeiError> {
        if payload.len() > self.max_payload_size {
            return Err(SeiError::PayloadTooLarge {
                len: payload.len(),
                max: self.max_payload_size,
            });
        }

        let mut owned = try_buffer(payload.len())?;
        owned.extend_from_slice(payload);
        let repeat_count = if repeat_count == 0 {
            self.default_repeat_count
        } else {
            repeat_count
        };
        let message = Message {
            payload: Bytes::from(owned),
            repeat_count,
            enqueued_at: Instant::now(),
        };

        let mut ring = self.lock_managed()?;
        if let Some(evicted) = ring.push(message) {
            tracing::warn!(
                evicted_len = evicted.payload.len(),
                capacity = ring.capacity(),
                "SEI message queue full, dropped oldest message"
            );
        }
        tracing::debug!(
            len = payload.len(),
            queue = ring.len(),
            capacity = ring.capacity(),
            repeat = repeat_count,
            "queued SEI message"
        );
        Ok(())
    }

    /// Remove and return every queued message in FIFO order.
    pub fn dequeue_all(&self) -> Result<Vec<Message>, SeiError> {
        Ok(self.lock_managed()?.drain())
    }

    /// Like [`dequeue_all`](Self::dequeue_all) with an explicit lock bound,
    /// for callers on the frame path.
    pub fn try_dequeue_all(&self, timeout: Duration) -> Result<Vec<Message>, SeiError> {
        Ok(self.lock(timeout)?.drain())
    }

    /// Number of queued messages.
    pub fn size(&self) -> Result<usize, SeiError> {
        Ok(self.lock_managed()?.len())
    }

    /// Drop every queued message. Returns how many were dropped.
    pub fn clear(&self) -> Result<usize, SeiError> {
        let cleared = self.lock_managed()?.clear();
        if cleared > 0 {
            tracing::info!(cleared, "cleared queued SEI messages");
        }
        Ok(cleared)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    #[cfg(test)]
    pub(crate) fn lock_for_test(&self) -> MutexGuard<'_, MessageRing> {
        self.ring.lock()
    }

    fn lock_managed(&self) -> Result<MutexGuard<'_, MessageRing>, SeiError> {
        self.lock(self.lock_timeout).inspect_err(|e| {
            tracing::warn!(error = %e, "SEI message store busy");
        })
    }

    fn lock(&self, timeout: Duration) -> Result<MutexGuard<'_, MessageRing>, SeiError> {
        self.ring
            .try_lock_for(timeout)
            .ok_or(SeiError::LockTimeout {
                resource: "message store",
                timeout,
            })
    }
}
