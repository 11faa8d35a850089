use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_CHUNK_SIZE;
use crate::constants::SIDE_CHANNEL_CAPTURE_LINES;
use crate::Error;
use crate::Result;

/// Transfer pipeline tuning.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReplicationConfig {
    /// Block size used when pumping send stdout into receive stdin
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Optional wall-clock budget for one whole transfer
    /// (unit: seconds, None disables the deadline)
    #[serde(default)]
    pub transfer_deadline_secs: Option<u64>,

    /// How many side-channel lines are kept for failure reports
    #[serde(default = "default_capture_lines")]
    pub capture_lines: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            transfer_deadline_secs: None,
            capture_lines: default_capture_lines(),
        }
    }
}

impl ReplicationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "chunk_size must be > 0".into(),
            )));
        }

        if self.transfer_deadline_secs == Some(0) {
            return Err(Error::Config(ConfigError::Message(
                "transfer_deadline_secs must be > 0 when set".into(),
            )));
        }

        if self.capture_lines == 0 {
            return Err(Error::Config(ConfigError::Message(
                "capture_lines must be > 0".into(),
            )));
        }

        Ok(())
    }

    pub fn transfer_deadline(&self) -> Option<Duration> {
        self.transfer_deadline_secs.map(Duration::from_secs)
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_capture_lines() -> usize {
    SIDE_CHANNEL_CAPTURE_LINES
}
