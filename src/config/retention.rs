use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::RETENTION_DRAIN_DELAY_MS;
use crate::constants::RETENTION_QUEUE_CAPACITY;
use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Retention queue pacing and destroy retry budget.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetentionConfig {
    /// Bound of the pending deletion channel
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Pause between consecutive destroy tasks (unit: milliseconds)
    #[serde(default = "default_drain_delay_ms")]
    pub drain_delay_ms: u64,

    /// Retry strategy for failing destroys
    #[serde(default)]
    pub retry: BackoffPolicy,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            drain_delay_ms: default_drain_delay_ms(),
            retry: BackoffPolicy::default(),
        }
    }
}

impl RetentionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "queue_capacity must be > 0".into(),
            )));
        }

        if self.retry.max_retries == 0 {
            return Err(Error::Config(ConfigError::Message(
                "retention retry.max_retries must be > 0".into(),
            )));
        }

        Ok(())
    }

    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }
}

fn default_queue_capacity() -> usize {
    RETENTION_QUEUE_CAPACITY
}

fn default_drain_delay_ms() -> u64 {
    RETENTION_DRAIN_DELAY_MS
}
