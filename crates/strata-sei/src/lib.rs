//! # strata-sei
//!
//! Metadata injection for outgoing H.264 video.
//!
//! Application messages are queued in a bounded store and carried to
//! receivers as "user data unregistered" SEI NAL units, inserted in front of
//! the first slice of the next keyframe. Every unit is tagged with a fixed
//! UUID so observers can pick Strata metadata out of any other SEI traffic.
//!
//! ## Crate structure
//!
//! - [`error`]: `SeiError`
//! - [`config`]: TOML configuration (queue limits, UUID, lock bounds)
//! - [`store`]: Bounded FIFO of pending messages
//! - [`nal`]: Annex B start-code scanning and NAL header classification
//! - [`inspect`]: Keyframe detection and insertion offset lookup
//! - [`sei`]: SEI unit encoding, emulation prevention, extraction
//! - [`processor`]: Frame processing strategies and the default injector
//! - [`hook`]: Swappable per-frame hook with statistics
//! - [`publisher`]: Subsystem entry point and JSON envelope helpers

pub mod config;
pub mod error;
pub mod hook;
pub mod inspect;
pub mod nal;
pub mod processor;
pub mod publisher;
pub mod sei;
pub mod store;

pub use config::SeiConfig;
pub use error::SeiError;
pub use hook::{HookStats, VideoSeiHook};
pub use processor::{FrameProcessor, ProcessedFrame, SeiInjector};
pub use publisher::SeiPublisher;
pub use sei::STRATA_SEI_UUID;
