use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Network tuning for the replication RPC surface.
///
/// Replication traffic is one long-lived bulk stream per transfer plus a
/// handful of short negotiation calls, so the defaults lean towards the
/// bulk-transfer end: generous windows, long keepalives, low stream
/// concurrency.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// gRPC request completion timeout for negotiation calls in
    /// milliseconds (streaming imports are not bounded by this)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// Max concurrent requests per connection
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// HTTP2 SETTINGS_MAX_CONCURRENT_STREAMS
    #[serde(default = "default_max_streams")]
    pub max_concurrent_streams: u32,

    /// TCP keepalive in seconds
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_in_secs: u64,

    /// HTTP2 keepalive ping interval in seconds
    #[serde(default = "default_h2_keepalive_interval")]
    pub http2_keep_alive_interval_in_secs: u64,

    /// HTTP2 keepalive timeout in seconds
    #[serde(default = "default_h2_keepalive_timeout")]
    pub http2_keep_alive_timeout_in_secs: u64,

    /// Initial connection-level flow control window in bytes
    #[serde(default = "default_conn_window_size")]
    pub connection_window_size: u32,

    /// Initial stream-level flow control window in bytes
    #[serde(default = "default_stream_window_size")]
    pub stream_window_size: u32,

    /// Enable HTTP2 adaptive window sizing
    #[serde(default = "default_adaptive_window")]
    pub adaptive_window: bool,

    /// Common TCP setting for all connections
    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            concurrency_limit: default_concurrency_limit(),
            max_concurrent_streams: default_max_streams(),
            tcp_keepalive_in_secs: default_tcp_keepalive(),
            http2_keep_alive_interval_in_secs: default_h2_keepalive_interval(),
            http2_keep_alive_timeout_in_secs: default_h2_keepalive_timeout(),
            connection_window_size: default_conn_window_size(),
            stream_window_size: default_stream_window_size(),
            adaptive_window: default_adaptive_window(),
            tcp_nodelay: default_tcp_nodelay(),
        }
    }
}

impl NetworkConfig {
    /// Validates configuration sanity
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "connect timeout must be > 0".into(),
            )));
        }

        if self.request_timeout_in_ms != 0
            && self.request_timeout_in_ms <= self.connect_timeout_in_ms
        {
            return Err(Error::Config(ConfigError::Message(format!(
                "request timeout {}ms must exceed connect timeout {}ms",
                self.request_timeout_in_ms, self.connect_timeout_in_ms
            ))));
        }

        if self.http2_keep_alive_timeout_in_secs >= self.http2_keep_alive_interval_in_secs {
            return Err(Error::Config(ConfigError::Message(format!(
                "keepalive timeout {}s must be < interval {}s",
                self.http2_keep_alive_timeout_in_secs, self.http2_keep_alive_interval_in_secs
            ))));
        }

        if !self.adaptive_window {
            const MIN_WINDOW: u32 = 65535; // HTTP2 spec minimum
            if self.stream_window_size < MIN_WINDOW {
                return Err(Error::Config(ConfigError::Message(format!(
                    "stream window size {} below minimum {}",
                    self.stream_window_size, MIN_WINDOW
                ))));
            }

            if self.connection_window_size < self.stream_window_size {
                return Err(Error::Config(ConfigError::Message(format!(
                    "connection window {} smaller than stream window {}",
                    self.connection_window_size, self.stream_window_size
                ))));
            }
        }

        Ok(())
    }
}

// Defaults profile a long-lived bulk replication link

fn default_connect_timeout() -> u64 {
    1_000
}
fn default_request_timeout() -> u64 {
    30_000
}
fn default_concurrency_limit() -> usize {
    32
}
fn default_max_streams() -> u32 {
    16
}
fn default_tcp_keepalive() -> u64 {
    3600
}
fn default_h2_keepalive_interval() -> u64 {
    600
}
fn default_h2_keepalive_timeout() -> u64 {
    60
}
fn default_conn_window_size() -> u32 {
    67_108_864 // 64MB connection window
}
fn default_stream_window_size() -> u32 {
    16_777_216 // 16MB stream window
}
fn default_adaptive_window() -> bool {
    false
}
fn default_tcp_nodelay() -> bool {
    true
}
