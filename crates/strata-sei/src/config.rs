use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::SeiError;
use crate::sei::STRATA_SEI_UUID;

pub const CONFIG_VERSION: u32 = 1;

/// Ring capacity of the message store.
pub const DEFAULT_QUEUE_CAPACITY: usize = 15;

/// Largest payload a single message may carry.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 400;

/// How many times each message is inserted into its keyframe.
pub const DEFAULT_REPEAT_COUNT: u32 = 3;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeiConfigInput {
    pub version: u32,
    pub uuid: Option<String>,
    pub queue: QueueConfigInput,
    pub locks: LockConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueueConfigInput {
    pub capacity: Option<usize>,
    pub max_payload_size: Option<usize>,
    pub default_repeat_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LockConfigInput {
    pub frame_timeout_ms: Option<u64>,
    pub management_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub capacity: usize,
    pub max_payload_size: usize,
    pub default_repeat_count: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            default_repeat_count: DEFAULT_REPEAT_COUNT,
        }
    }
}

/// Bounded lock waits. The frame path must stay well under one frame interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    pub frame_timeout: Duration,
    pub management_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            frame_timeout: Duration::from_millis(10),
            management_timeout: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeiConfig {
    pub version: u32,
    /// Tags every SEI unit this subsystem emits.
    pub uuid: [u8; 16],
    pub queue: QueueConfig,
    pub locks: LockConfig,
}

impl Default for SeiConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            uuid: STRATA_SEI_UUID,
            queue: QueueConfig::default(),
            locks: LockConfig::default(),
        }
    }
}

impl SeiConfigInput {
    pub fn resolve(self) -> Result<SeiConfig, SeiError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(SeiError::Config(format!(
                "unsupported config version {}",
                version
            )));
        }

        let uuid = match self.uuid.as_deref().map(str::trim) {
            None | Some("") => STRATA_SEI_UUID,
            Some(s) => *Uuid::parse_str(s)
                .map_err(|e| SeiError::Config(format!("invalid uuid {:?}: {}", s, e)))?
                .as_bytes(),
        };

        let defaults = QueueConfig::default();
        let queue = QueueConfig {
            capacity: self.queue.capacity.unwrap_or(defaults.capacity),
            max_payload_size: self
                .queue
                .max_payload_size
                .unwrap_or(defaults.max_payload_size),
            default_repeat_count: self
                .queue
                .default_repeat_count
                .unwrap_or(defaults.default_repeat_count),
        };
        if queue.capacity == 0 {
            return Err(SeiError::Config("queue.capacity must be at least 1".into()));
        }
        if queue.max_payload_size == 0 {
            return Err(SeiError::Config(
                "queue.max_payload_size must be at least 1".into(),
            ));
        }
        if queue.default_repeat_count == 0 {
            return Err(SeiError::Config(
                "queue.default_repeat_count must be at least 1".into(),
            ));
        }

        let lock_defaults = LockConfig::default();
        let locks = LockConfig {
            frame_timeout: self
                .locks
                .frame_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(lock_defaults.frame_timeout),
            management_timeout: self
                .locks
                .management_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(lock_defaults.management_timeout),
        };

        Ok(SeiConfig {
            version,
            uuid,
            queue,
            locks,
        })
    }
}

impl SeiConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, SeiError> {
        if input.trim().is_empty() {
            return Ok(SeiConfig::default());
        }
        let parsed: SeiConfigInput = toml::from_str(input)
            .map_err(|e| SeiError::Config(format!("invalid config TOML: {}", e)))?;
        parsed.resolve()
    }

    /// Hyphenated form of the tagging UUID, for logs.
    pub fn uuid_string(&self) -> String {
        Uuid::from_bytes(self.uuid).hyphenated().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_toml_config_basic() {
        let toml = r#"
            version = 1
            uuid = "00112233-4455-6677-8899-aabbccddeeff"

            [queue]
            capacity = 4
            max_payload_size = 128
            default_repeat_count = 2

            [locks]
            frame_timeout_ms = 5
            management_timeout_ms = 250
        "#;

        let cfg = SeiConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.version, CONFIG_VERSION);
        assert_eq!(
            cfg.uuid,
            [
                0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
                0xEE, 0xFF
            ]
        );
        assert_eq!(cfg.queue.capacity, 4);
        assert_eq!(cfg.queue.max_payload_size, 128);
        assert_eq!(cfg.queue.default_repeat_count, 2);
        assert_eq!(cfg.locks.frame_timeout, Duration::from_millis(5));
        assert_eq!(cfg.locks.management_timeout, Duration::from_millis(250));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = SeiConfig::from_toml_str("   ").unwrap();
        assert_eq!(cfg, SeiConfig::default());
        assert_eq!(cfg.queue.capacity, 15);
        assert_eq!(cfg.queue.max_payload_size, 400);
        assert_eq!(cfg.queue.default_repeat_count, 3);
        assert_eq!(cfg.uuid_string(), "3f8a2b1c-4d5e-6f70-8192-a3b4c5d6e7f8");
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let cfg = SeiConfig::from_toml_str("[queue]\ncapacity = 30\n").unwrap();
        assert_eq!(cfg.queue.capacity, 30);
        assert_eq!(cfg.queue.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
        assert_eq!(cfg.locks, LockConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(SeiConfig::from_toml_str("version = 2").is_err());
        assert!(SeiConfig::from_toml_str("[queue]\ncapacity = 0").is_err());
        assert!(SeiConfig::from_toml_str("[queue]\ndefault_repeat_count = 0").is_err());
        assert!(SeiConfig::from_toml_str("uuid = \"not-a-uuid\"").is_err());
        assert!(SeiConfig::from_toml_str("queue = 3").is_err());
    }
}
