//! Configuration management module for the snapshot engine.
//!
//! Provides hierarchical configuration loading from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. Base config file (`config/snap-engine.toml`)
//! 3. Explicit config path (CLI / `CONFIG_PATH`)
//! 4. Local overrides (`config/local.toml`)
//! 5. Environment variables (highest priority)
//!

mod engine;
mod monitoring;
mod network;
mod node;
mod replication;
mod retention;
mod retry;
mod schedule;
mod tls;
pub use engine::*;
pub use monitoring::*;
pub use network::*;
pub use node::*;
pub use replication::*;
pub use retention::*;
pub use retry::*;
pub use schedule::*;
pub use tls::*;

#[cfg(test)]
mod config_test;

//---
use std::collections::HashSet;
use std::env;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Daemon identity, listener address and log location
    #[serde(default)]
    pub node: NodeConfig,
    /// Dataset tooling (zfs binary) parameters
    #[serde(default)]
    pub engine: EngineConfig,
    /// Transfer pipeline tuning
    #[serde(default)]
    pub replication: ReplicationConfig,
    /// Retention queue pacing and retry budget
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Metrics and monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Network communication parameters
    #[serde(default)]
    pub network: NetworkConfig,
    /// TLS/SSL security configuration
    #[serde(default)]
    pub tls: TlsConfig,
    /// Snapshot schedules driven by this node
    #[serde(default)]
    pub schedules: Vec<ScheduleConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            engine: EngineConfig::default(),
            replication: ReplicationConfig::default(),
            retention: RetentionConfig::default(),
            monitoring: MonitoringConfig::default(),
            network: NetworkConfig::default(),
            tls: TlsConfig::default(),
            schedules: vec![],
        }
    }
}

impl Settings {
    /// Load configuration from multiple sources with priority:
    /// 1. Base config file (optional)
    /// 2. Explicit config path (required when given)
    /// 3. `CONFIG_PATH` environment override
    /// 4. Local overrides
    /// 5. Environment variables
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a node-specific configuration file
    ///
    /// # Returns
    /// Merged configuration with proper priority ordering
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        // 1. Base config
        config = config.add_source(File::with_name("config/snap-engine").required(false));

        // 2. Overwrite with node-specific config
        if let Some(custom) = config_path {
            config = config.add_source(File::with_name(custom).required(true));
        }

        // 3. Environment overlay
        if let Ok(path) = env::var("CONFIG_PATH") {
            config = config.add_source(File::with_name(&path));
        }

        // 4. Local overrides
        config = config.add_source(File::with_name("config/local").required(false));

        // 5. Environment variables (highest priority)
        config = config.add_source(
            Environment::with_prefix("SNAP")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize().map_err(Error::Config)?;
        Ok(settings)
    }

    /// Validates every configuration section plus the cross-section rules.
    pub fn validate(&self) -> Result<()> {
        self.node.validate()?;
        self.engine.validate()?;
        self.replication.validate()?;
        self.retention.validate()?;
        self.monitoring.validate()?;
        self.network.validate()?;
        self.tls.validate()?;

        let mut names = HashSet::new();
        for schedule in &self.schedules {
            schedule.validate()?;
            if !names.insert(schedule.name.as_str()) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "Duplicate schedule name '{}'",
                    schedule.name
                ))));
            }
        }

        Ok(())
    }

    /// Snapshot-name prefixes of every configured schedule, used when a
    /// remote caller asks for schedule-managed snapshots only.
    pub fn schedule_prefixes(&self) -> Vec<String> {
        self.schedules.iter().map(|s| s.snapshot_prefix()).collect()
    }
}
