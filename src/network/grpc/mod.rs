//! gRPC transport for snapshot negotiation and streamed imports
//!
//! This submodule hosts the replication RPC service and the server bootstrap.
//! Negotiation calls are cheap unary lookups; the import call is one
//! long-lived client stream feeding a local receive process.

mod replication_service;


//-------------------------------------------------------------------------------
// Start RPC Server
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use rcgen::generate_simple_self_signed;
use rcgen::CertifiedKey;
use tokio::sync::watch;
use tonic::codec::CompressionEncoding;
use tonic::transport::Certificate;
use tonic::transport::Identity;
use tonic::transport::ServerTlsConfig;
use tonic_health::server::health_reporter;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::Settings;
use crate::proto::replication::replication_service_server::ReplicationServiceServer;
use crate::EngineNode;
use crate::Result;
use crate::SystemError;
use crate::TlsConfig;

/// RPC server for the replication surface.
/// It answers snapshot negotiation lookups and accepts streamed snapshot
/// imports from peer nodes.
pub(crate) async fn start_rpc_server(
    node: Arc<EngineNode>,
    listen_address: SocketAddr,
    settings: Settings,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    // Create a HealthReporter to manage the health status
    let (mut health_reporter, health_service) = health_reporter();

    // Set the initial health status to SERVING
    health_reporter
        .set_serving::<ReplicationServiceServer<EngineNode>>()
        .await;

    let network_config = &settings.network;

    let mut server_builder = tonic::transport::Server::builder()
        .concurrency_limit_per_connection(network_config.concurrency_limit)
        .tcp_keepalive(Some(Duration::from_secs(network_config.tcp_keepalive_in_secs)))
        .http2_keepalive_interval(Some(Duration::from_secs(
            network_config.http2_keep_alive_interval_in_secs,
        )))
        .http2_keepalive_timeout(Some(Duration::from_secs(
            network_config.http2_keep_alive_timeout_in_secs,
        )))
        // Window sizes matter here: one import stream carries the whole
        // snapshot payload
        .initial_stream_window_size(network_config.stream_window_size)
        .initial_connection_window_size(network_config.connection_window_size)
        .http2_adaptive_window(Some(network_config.adaptive_window))
        .tcp_nodelay(network_config.tcp_nodelay);

    if settings.tls.enable_tls {
        if settings.tls.generate_self_signed_certificates {
            if settings.tls.certificate_authority_root_path.exists() {
                warn!(
                    "CA root {:?} already exists, skipping self-signed certificate generation",
                    settings.tls.certificate_authority_root_path
                );
            } else {
                info!("Generating self signed certificates");
                generate_self_signed_certificates(&settings.tls);
            }
        }
        let cert = std::fs::read_to_string(&settings.tls.server_certificate_path)
            .expect("failed to read server certificate");
        let key = std::fs::read_to_string(&settings.tls.server_private_key_path)
            .expect("failed to read server private key");
        let tls = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));
        if settings.tls.enable_mtls {
            // The client CA doubles as the sender allowlist: only peers it
            // signed may push streams into this node.
            let client_ca_cert =
                std::fs::read_to_string(&settings.tls.client_certificate_authority_root_path)
                    .expect("failed to read client certificate authority root");
            let tls = tls.client_ca_root(Certificate::from_pem(client_ca_cert));
            server_builder = server_builder.tls_config(tls).expect("failed to setup mTLS");
            info!("gRPC mTLS enabled");
        } else {
            server_builder = server_builder.tls_config(tls).expect("failed to setup TLS");
            info!("gRPC TLS enabled");
        }
    }

    if let Err(e) = server_builder
        .add_service(health_service)
        .add_service(
            ReplicationServiceServer::from_arc(node)
                .accept_compressed(CompressionEncoding::Gzip)
                .send_compressed(CompressionEncoding::Gzip),
        )
        .serve_with_shutdown(
            listen_address,
            shutdown_signal.changed().map(|_s| {
                warn!("Stopping RPC server. {}", listen_address);
            }),
        )
        .await
    {
        error!("error to start replication rpc server :{:?}.", e);
        return Err(SystemError::ServerUnavailable.into());
    }
    debug!("rpc service finished!");
    Ok(())
}

fn generate_self_signed_certificates(config: &TlsConfig) {
    let subject_alt_names = vec!["localhost".to_string()];
    let CertifiedKey { cert, key_pair } =
        generate_simple_self_signed(subject_alt_names).expect("Certificate generation failed");

    std::fs::write(&config.server_certificate_path, cert.pem()).expect("Should succeed to write server certificate");
    std::fs::write(&config.server_private_key_path, key_pair.serialize_pem())
        .expect("Should succeed to write server private key");
}
