use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Location and behavior of the dataset tooling the engine shells out to.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Path of the zfs binary
    #[serde(default = "default_zfs_path")]
    pub zfs_path: PathBuf,

    /// Wall-clock budget for one listing/snapshot/destroy invocation
    /// (unit: milliseconds)
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            zfs_path: default_zfs_path(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.zfs_path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "zfs_path cannot be empty".into(),
            )));
        }

        if self.command_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "command_timeout_ms must be > 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_zfs_path() -> PathBuf {
    "/sbin/zfs".into()
}

fn default_command_timeout_ms() -> u64 {
    60_000
}
