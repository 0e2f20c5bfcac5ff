//! # SEI Errors
//!
//! Every failure is local to the caller. A failed operation leaves the
//! message store and the hook exactly as they were before the call.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by the SEI injection subsystem.
#[derive(Debug, Error)]
pub enum SeiError {
    /// Payload exceeds the per-message limit. Rejected, never truncated.
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    /// A bounded lock acquisition gave up.
    #[error("timed out after {timeout:?} waiting for the {resource} lock")]
    LockTimeout {
        resource: &'static str,
        timeout: Duration,
    },

    /// A buffer could not be allocated.
    #[error("failed to allocate {requested} bytes")]
    Allocation { requested: usize },

    /// The publisher has been shut down.
    #[error("SEI subsystem is shut down")]
    ShutDown,

    #[error("invalid SEI config: {0}")]
    Config(String),

    /// An envelope could not be serialized.
    #[error("failed to encode message envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SeiError {
    /// Whether this error is transient backpressure rather than a hard failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SeiError::LockTimeout { .. })
    }
}

/// Allocate an empty buffer with exactly `capacity` bytes reserved.
pub(crate) fn try_buffer(capacity: usize) -> Result<Vec<u8>, SeiError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(capacity)
        .map_err(|_| SeiError::Allocation {
            requested: capacity,
        })?;
    Ok(buf)
}
