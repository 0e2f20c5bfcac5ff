//! # SEI Publisher
//!
//! Subsystem entry point owned by the node. Application code enqueues
//! metadata through the envelope helpers; the video pipeline calls
//! [`SeiPublisher::process_frame`] on every encoded access unit.
//!
//! ```text
//!   app threads ──enqueue_*──▶ MessageStore ◀──drain── SeiInjector
//!                                                          ▲
//!   encoder thread ──process_frame──▶ VideoSeiHook ────────┘
//! ```
//!
//! Envelopes are JSON objects with a `timestamp` in milliseconds since the
//! publisher was created and a `type` tag. An envelope that would not fit
//! the payload limit has its free-text field shortened until it does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use quanta::Instant;
use serde::Serialize;

use crate::config::SeiConfig;
use crate::error::SeiError;
use crate::hook::{HookStats, VideoSeiHook};
use crate::processor::{FrameProcessor, ProcessedFrame, SeiInjector};
use crate::store::MessageStore;

// ─── Envelopes ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TextEnvelope<'a> {
    text: &'a str,
    timestamp: u64,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatEnvelope<'a> {
    role: &'a str,
    content: &'a str,
    timestamp: u64,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct StatusEnvelope<'a> {
    status: &'a str,
    value: i64,
    timestamp: u64,
    #[serde(rename = "type")]
    kind: &'static str,
}

pub const TYPE_TEXT: &str = "text_content";
pub const TYPE_CHAT: &str = "chat_message";
pub const TYPE_STATUS: &str = "status_update";

// ─── SeiPublisher ────────────────────────────────────────────────────────────

pub struct SeiPublisher {
    config: SeiConfig,
    store: Arc<MessageStore>,
    hook: VideoSeiHook,
    epoch: Instant,
    closed: AtomicBool,
}

impl SeiPublisher {
    pub fn new(config: SeiConfig) -> Self {
        let store = Arc::new(MessageStore::new(
            &config.queue,
            config.locks.management_timeout,
        ));
        let injector: Arc<dyn FrameProcessor> = Arc::new(SeiInjector::new(store.clone(), &config));
        let hook = VideoSeiHook::new(injector, config.locks);

        tracing::info!(
            uuid = %config.uuid_string(),
            capacity = config.queue.capacity,
            max_payload = config.queue.max_payload_size,
            repeat = config.queue.default_repeat_count,
            "SEI publisher initialized"
        );

        SeiPublisher {
            config,
            store,
            hook,
            epoch: Instant::now(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SeiConfig {
        &self.config
    }

    /// The shared message store, for callers that drive a custom processor.
    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    // ─── Producers ──────────────────────────────────────────────────────

    /// Queue an opaque payload. `repeat_count` 0 selects the default.
    pub fn enqueue(&self, payload: &[u8], repeat_count: u32) -> Result<(), SeiError> {
        self.ensure_open()?;
        self.store.enqueue(payload, repeat_count)
    }

    /// Wrap `text` in a `text_content` envelope and queue it.
    pub fn enqueue_text(&self, text: &str) -> Result<(), SeiError> {
        self.ensure_open()?;
        let timestamp = self.timestamp_ms();
        let body = self.fit_envelope("text", text, |text| {
            serde_json::to_vec(&TextEnvelope {
                text,
                timestamp,
                kind: TYPE_TEXT,
            })
        })?;
        self.store.enqueue(&body, 0)
    }

    /// Wrap a chat-style `role`/`content` pair and queue it. Only `content`
    /// is ever shortened.
    pub fn enqueue_structured(&self, role: &str, content: &str) -> Result<(), SeiError> {
        self.ensure_open()?;
        let timestamp = self.timestamp_ms();
        let body = self.fit_envelope("content", content, |content| {
            serde_json::to_vec(&ChatEnvelope {
                role,
                content,
                timestamp,
                kind: TYPE_CHAT,
            })
        })?;
        self.store.enqueue(&body, 0)
    }

    /// Queue caller-built JSON verbatim. Never truncated.
    pub fn enqueue_raw(&self, json: &str) -> Result<(), SeiError> {
        self.ensure_open()?;
        self.store.enqueue(json.as_bytes(), 0)
    }

    /// Wrap a named integer reading in a `status_update` envelope and queue it.
    pub fn enqueue_status(&self, name: &str, value: i64) -> Result<(), SeiError> {
        self.ensure_open()?;
        let body = serde_json::to_vec(&StatusEnvelope {
            status: name,
            value,
            timestamp: self.timestamp_ms(),
            kind: TYPE_STATUS,
        })?;
        self.store.enqueue(&body, 0)
    }

    /// Messages waiting for the next keyframe.
    pub fn queue_size(&self) -> Result<usize, SeiError> {
        self.ensure_open()?;
        self.store.size()
    }

    /// Drop every pending message. Returns how many were dropped.
    pub fn clear(&self) -> Result<usize, SeiError> {
        self.ensure_open()?;
        self.store.clear()
    }

    // ─── Frame path ─────────────────────────────────────────────────────

    pub fn process_frame(&self, frame: &[u8]) -> Result<ProcessedFrame, SeiError> {
        self.ensure_open()?;
        self.hook.process_frame(frame)
    }

    pub fn stats(&self) -> Result<HookStats, SeiError> {
        self.ensure_open()?;
        self.hook.stats()
    }

    pub fn reset_stats(&self) -> Result<(), SeiError> {
        self.ensure_open()?;
        self.hook.reset_stats()
    }

    pub fn set_processor(&self, processor: Arc<dyn FrameProcessor>) -> Result<(), SeiError> {
        self.ensure_open()?;
        self.hook.set_processor(processor);
        Ok(())
    }

    pub fn reset_processor(&self) -> Result<(), SeiError> {
        self.ensure_open()?;
        self.hook.reset_processor();
        Ok(())
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Drop pending messages and refuse every later call. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.store.clear() {
            Ok(dropped) => tracing::info!(dropped, "SEI publisher shut down"),
            Err(e) => tracing::warn!(error = %e, "SEI publisher shut down with messages still queued"),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), SeiError> {
        if self.is_shut_down() {
            Err(SeiError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn timestamp_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Render an envelope, shortening `field` at a character boundary until
    /// the result fits the payload limit.
    fn fit_envelope<F>(&self, name: &str, field: &str, render: F) -> Result<Vec<u8>, SeiError>
    where
        F: Fn(&str) -> Result<Vec<u8>, serde_json::Error>,
    {
        let max = self.store.max_payload_size();
        let mut cut = field.len();
        loop {
            let body = render(&field[..cut])?;
            if body.len() <= max {
                if cut < field.len() {
                    tracing::warn!(
                        field = name,
                        original = field.len(),
                        kept = cut,
                        max,
                        "SEI message truncated to fit payload limit"
                    );
                }
                return Ok(body);
            }
            if cut == 0 {
                return Err(SeiError::PayloadTooLarge {
                    len: body.len(),
                    max,
                });
            }
            cut = floor_char_boundary(field, cut.saturating_sub(body.len() - max));
        }
    }
}

/// Largest char boundary in `s` that is `<= index`.
fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
