//! # Frame Processor
//!
//! Turns an outgoing access unit into a new one carrying the queued
//! metadata. Messages only ever go into keyframes: a receiver that drops
//! SEI on inter frames still gets them from the next reliably delivered
//! IDR.
//!
//! Each queued message is encoded once and inserted `repeat_count` times
//! directly in front of the first slice. The insertion point is looked up
//! again after every insertion, so later copies land right before the slice
//! rather than in the middle of earlier SEI units.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::config::SeiConfig;
use crate::error::{try_buffer, SeiError};
use crate::inspect::{find_insert_offset, is_keyframe};
use crate::sei::encode_user_data_unregistered;
use crate::store::{Message, MessageStore};

/// Output of a [`FrameProcessor`]. The caller owns `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedFrame {
    pub data: Bytes,
    /// Distinct messages with at least one SEI unit in `data`.
    pub messages_inserted: usize,
}

impl ProcessedFrame {
    /// A fresh copy of `frame` with nothing inserted.
    pub fn passthrough(frame: &[u8]) -> Result<Self, SeiError> {
        let mut data = try_buffer(frame.len())?;
        data.extend_from_slice(frame);
        Ok(ProcessedFrame {
            data: Bytes::from(data),
            messages_inserted: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A per-frame processing strategy.
///
/// Implementations must never mutate or retain the input frame.
pub trait FrameProcessor: Send + Sync {
    fn process(&self, frame: &[u8]) -> Result<ProcessedFrame, SeiError>;
}

impl<F> FrameProcessor for F
where
    F: Fn(&[u8]) -> Result<ProcessedFrame, SeiError> + Send + Sync,
{
    fn process(&self, frame: &[u8]) -> Result<ProcessedFrame, SeiError> {
        self(frame)
    }
}

// ─── SeiInjector ─────────────────────────────────────────────────────────────

/// Default strategy: drain the message store into every keyframe.
pub struct SeiInjector {
    store: Arc<MessageStore>,
    uuid: [u8; 16],
    lock_timeout: Duration,
}

impl SeiInjector {
    pub fn new(store: Arc<MessageStore>, config: &SeiConfig) -> Self {
        SeiInjector {
            store,
            uuid: config.uuid,
            lock_timeout: config.locks.frame_timeout,
        }
    }
}

impl SeiInjector {
    /// Drain the store into a copy of `frame`, with the working buffer from
    /// `alloc` and each copy placed by `insert`.
    ///
    /// The working buffer is allocated before the store is touched, so a
    /// failed allocation leaves every queued message in place.
    fn inject_with<A, I>(&self, frame: &[u8], alloc: A, insert: I) -> Result<ProcessedFrame, SeiError>
    where
        A: FnOnce(usize) -> Result<Vec<u8>, SeiError>,
        I: FnMut(&[u8], &[u8]) -> Result<Vec<u8>, SeiError>,
    {
        if !is_keyframe(frame) {
            return ProcessedFrame::passthrough(frame);
        }

        let mut working = alloc(frame.len())?;
        working.extend_from_slice(frame);

        let messages = match self.store.try_dequeue_all(self.lock_timeout) {
            Ok(messages) => messages,
            Err(e) if e.is_timeout() => {
                tracing::debug!(error = %e, "message store busy, passing keyframe through");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        Ok(inject_messages(working, messages, &self.uuid, insert))
    }
}

impl FrameProcessor for SeiInjector {
    fn process(&self, frame: &[u8]) -> Result<ProcessedFrame, SeiError> {
        self.inject_with(frame, try_buffer, insert_unit)
    }
}

/// Insert every message into `frame`, in order, using `insert` to place each
/// copy (normally [`insert_unit`]).
///
/// A message whose insertion fails part way keeps the copies already placed;
/// its remaining repeats are abandoned and the next message proceeds from
/// the buffer as it stood.
pub fn inject_messages<I>(
    frame: Vec<u8>,
    messages: Vec<Message>,
    uuid: &[u8; 16],
    mut insert: I,
) -> ProcessedFrame
where
    I: FnMut(&[u8], &[u8]) -> Result<Vec<u8>, SeiError>,
{
    let original_len = frame.len();
    let mut current = frame;
    let mut inserted = 0usize;

    for message in messages {
        let unit = match encode_user_data_unregistered(uuid, &message.payload) {
            Ok(unit) => unit,
            Err(e) => {
                tracing::warn!(error = %e, len = message.payload.len(), "failed to encode SEI unit");
                continue;
            }
        };

        let mut copies = 0u32;
        while copies < message.repeat_count {
            match insert(&current, &unit) {
                Ok(next) => {
                    current = next;
                    copies += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt = copies + 1,
                        repeat = message.repeat_count,
                        "failed to insert SEI unit, abandoning remaining repeats"
                    );
                    break;
                }
            }
        }
        if copies > 0 {
            inserted += 1;
        }
        tracing::debug!(unit_len = unit.len(), copies, "inserted SEI unit");
    }

    if inserted > 0 {
        tracing::info!(
            messages = inserted,
            from = original_len,
            to = current.len(),
            "injected SEI messages into keyframe"
        );
    }

    ProcessedFrame {
        data: Bytes::from(current),
        messages_inserted: inserted,
    }
}

/// New buffer holding `frame` with `unit` placed before its first slice, or
/// at the front when there is no slice.
pub fn insert_unit(frame: &[u8], unit: &[u8]) -> Result<Vec<u8>, SeiError> {
    let offset = find_insert_offset(frame).unwrap_or(0);
    let mut out = try_buffer(frame.len() + unit.len())?;
    out.extend_from_slice(&frame[..offset]);
    out.extend_from_slice(unit);
    out.extend_from_slice(&frame[offset..]);
    Ok(out)
}
