use std::net::SocketAddr;
use std::net::SocketAddrV4;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_LISTEN_PORT;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NodeConfig {
    /// Human-readable node name carried in logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Bind address of the replication RPC listener
    #[serde(default = "default_listen_addr")]
    pub listen_address: SocketAddr,

    /// Serve the replication RPC surface at all
    #[serde(default = "default_enable_rpc")]
    pub enable_rpc: bool,

    /// Directory receiving the rolling daemon log
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            listen_address: default_listen_addr(),
            enable_rpc: default_enable_rpc(),
            log_dir: default_log_dir(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.node_name.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "node_name cannot be empty".into(),
            )));
        }

        if self.enable_rpc && self.listen_address.port() == 0 {
            return Err(Error::Config(ConfigError::Message(
                "listen_address must specify a non-zero port".into(),
            )));
        }

        Ok(())
    }
}

fn default_node_name() -> String {
    "snap-engine".into()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(
        std::net::Ipv4Addr::UNSPECIFIED,
        DEFAULT_LISTEN_PORT,
    ))
}

fn default_enable_rpc() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    "./logs".into()
}
