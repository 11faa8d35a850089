use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::MANAGED_SNAPSHOT_PREFIX;
use crate::Error;
use crate::Result;

/// One recurring snapshot schedule.
///
/// Every firing creates `<dataset>@auto-<label>-<timestamp>` and prunes
/// schedule-owned snapshots beyond `keep`, oldest first.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScheduleConfig {
    /// Unique schedule identifier (also the default label)
    pub name: String,

    /// Dataset the schedule snapshots
    pub dataset: String,

    /// Name fragment between the managed prefix and the timestamp;
    /// defaults to `name`
    #[serde(default)]
    pub label: Option<String>,

    /// Seconds between the end of one firing and the start of the next
    pub every_secs: u64,

    /// How many schedule-owned snapshots survive a pruning pass
    pub keep: usize,

    /// Snapshot and prune descendant datasets too
    #[serde(default = "default_recursive")]
    pub recursive: bool,

    /// Disabled schedules are parsed but never spawned
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains(char::is_whitespace) {
            return Err(Error::Config(ConfigError::Message(format!(
                "Schedule name '{}' must be non-empty and whitespace-free",
                self.name
            ))));
        }

        if self.dataset.is_empty() || self.dataset.contains('@') {
            return Err(Error::Config(ConfigError::Message(format!(
                "Schedule '{}' has invalid dataset '{}'",
                self.name, self.dataset
            ))));
        }

        let label = self.label_or_name();
        if label.is_empty() || label.contains(char::is_whitespace) || label.contains('@') {
            return Err(Error::Config(ConfigError::Message(format!(
                "Schedule '{}' has invalid label '{}'",
                self.name, label
            ))));
        }

        if self.every_secs == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "Schedule '{}' must have every_secs > 0",
                self.name
            ))));
        }

        if self.keep == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "Schedule '{}' must keep at least one snapshot",
                self.name
            ))));
        }

        Ok(())
    }

    pub fn label_or_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Prefix owned by this schedule, e.g. `auto-hourly-`.
    pub fn snapshot_prefix(&self) -> String {
        format!("{}{}-", MANAGED_SNAPSHOT_PREFIX, self.label_or_name())
    }
}

fn default_recursive() -> bool {
    true
}

fn default_enabled() -> bool {
    true
}
