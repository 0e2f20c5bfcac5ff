//! # Video SEI Hook
//!
//! The single per-frame entry point the video pipeline calls for every
//! encoded access unit on its way to the transport. Delegates to the active
//! [`FrameProcessor`] and keeps running counters of what was injected.
//!
//! The active processor is held in an [`ArcSwap`], so the frame path reads
//! it without locking and a swap never waits for an in-flight frame. The
//! counters sit behind their own timed mutex; a frame that cannot update
//! them in time is still delivered.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;

use crate::config::LockConfig;
use crate::error::SeiError;
use crate::processor::{FrameProcessor, ProcessedFrame};

/// Running injection counters. Only ever reset explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HookStats {
    /// Frames successfully returned by the active processor.
    pub frames_processed: u64,
    /// Distinct messages inserted across all frames.
    pub sei_units_inserted: u64,
    /// Sum of per-frame size growth, in bytes.
    pub total_sei_bytes: u64,
}

impl HookStats {
    /// Average bytes added per inserted message.
    pub fn bytes_per_unit(&self) -> f64 {
        if self.sei_units_inserted == 0 {
            0.0
        } else {
            self.total_sei_bytes as f64 / self.sei_units_inserted as f64
        }
    }

    fn record(&mut self, input_len: usize, output: &ProcessedFrame) {
        self.frames_processed += 1;
        if output.len() > input_len {
            // A custom processor that grows the frame without reporting its
            // messages counts as one.
            self.sei_units_inserted += output.messages_inserted.max(1) as u64;
            self.total_sei_bytes += (output.len() - input_len) as u64;
        }
    }
}

/// Swappable per-frame processing stage with statistics.
pub struct VideoSeiHook {
    active: ArcSwap<Arc<dyn FrameProcessor>>,
    default: Arc<dyn FrameProcessor>,
    stats: Mutex<HookStats>,
    locks: LockConfig,
}

impl VideoSeiHook {
    /// Create a hook whose default (and initially active) strategy is
    /// `default`.
    pub fn new(default: Arc<dyn FrameProcessor>, locks: LockConfig) -> Self {
        VideoSeiHook {
            active: ArcSwap::from_pointee(default.clone()),
            default,
            stats: Mutex::new(HookStats::default()),
            locks,
        }
    }

    /// Install a custom processing strategy.
    pub fn set_processor(&self, processor: Arc<dyn FrameProcessor>) {
        self.active.store(Arc::new(processor));
        tracing::info!("installed custom video frame processor");
    }

    /// Restore the default strategy.
    pub fn reset_processor(&self) {
        self.active.store(Arc::new(self.default.clone()));
        tracing::info!("restored default video frame processor");
    }

    /// Run `frame` through the active strategy and account for the result.
    pub fn process_frame(&self, frame: &[u8]) -> Result<ProcessedFrame, SeiError> {
        let processor = self.active.load_full();
        let output = processor.process(frame)?;

        match self.stats.try_lock_for(self.locks.frame_timeout) {
            Some(mut stats) => stats.record(frame.len(), &output),
            None => tracing::debug!(
                timeout = ?self.locks.frame_timeout,
                "hook stats busy, frame not counted"
            ),
        }
        if output.len() > frame.len() {
            tracing::debug!(
                from = frame.len(),
                to = output.len(),
                added = output.len() - frame.len(),
                "frame processed with SEI"
            );
        }
        Ok(output)
    }

    /// Consistent snapshot of the counters.
    pub fn stats(&self) -> Result<HookStats, SeiError> {
        self.lock_stats().map(|stats| *stats)
    }

    /// Zero every counter.
    pub fn reset_stats(&self) -> Result<(), SeiError> {
        *self.lock_stats()? = HookStats::default();
        tracing::info!("hook statistics reset");
        Ok(())
    }

    fn lock_stats(&self) -> Result<MutexGuard<'_, HookStats>, SeiError> {
        let timeout = self.locks.management_timeout;
        self.stats.try_lock_for(timeout).ok_or_else(|| {
            tracing::warn!(?timeout, "hook stats busy");
            SeiError::LockTimeout {
                resource: "hook stats",
                timeout,
            }
        })
    }
}
