use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;

use crate::Error;
use crate::Result;

/// TLS settings for the replication listener.
///
/// Replication traffic carries raw dataset contents, so deployments that
/// cross trust boundaries should enable mTLS; the client CA root then
/// doubles as the sender allowlist.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TlsConfig {
    /// Encrypt replication traffic
    #[serde(default)]
    pub enable_tls: bool,

    /// Generate a self-signed server identity on startup when the CA
    /// root path does not exist yet
    #[serde(default)]
    pub generate_self_signed_certificates: bool,

    /// Certificate authority root certificate
    #[serde(default = "default_ca_path")]
    pub certificate_authority_root_path: PathBuf,

    /// Server certificate chain in PEM format
    #[serde(default = "default_server_cert_path")]
    pub server_certificate_path: PathBuf,

    /// Server private key in PEM format
    #[serde(default = "default_server_key_path")]
    pub server_private_key_path: PathBuf,

    /// CA root used to verify client certificates under mTLS
    #[serde(default = "default_ca_path")]
    pub client_certificate_authority_root_path: PathBuf,

    /// Require client certificates (mutual TLS)
    #[serde(default)]
    pub enable_mtls: bool,
}

impl TlsConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.enable_tls {
            if self.enable_mtls {
                return Err(Error::Config(ConfigError::Message(
                    "enable_mtls requires enable_tls".into(),
                )));
            }
            return Ok(());
        }

        if self.server_certificate_path.as_os_str().is_empty()
            || self.server_private_key_path.as_os_str().is_empty()
        {
            return Err(Error::Config(ConfigError::Message(
                "TLS requires server_certificate_path and server_private_key_path".into(),
            )));
        }

        if self.enable_mtls && self.client_certificate_authority_root_path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "mTLS requires client_certificate_authority_root_path".into(),
            )));
        }

        Ok(())
    }
}

fn default_ca_path() -> PathBuf {
    "/etc/ssl/certs/ca.pem".into()
}
fn default_server_cert_path() -> PathBuf {
    "./certs/server.pem".into()
}
fn default_server_key_path() -> PathBuf {
    "./certs/server.key".into()
}
