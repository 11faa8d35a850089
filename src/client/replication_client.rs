use std::future::Future;
use std::time::Duration;

use tonic::codec::CompressionEncoding;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tracing::debug;
use tracing::error;

use crate::config::NetworkConfig;
use crate::net::endpoint_uri;
use crate::proto::replication::replication_service_client::ReplicationServiceClient;
use crate::proto::replication::CommonSnapshotsRequest;
use crate::proto::replication::LatestSnapshotNeededRequest;
use crate::proto::replication::ListSnapshotsRequest;
use crate::proto::replication::SnapshotsNeededRequest;
use crate::NetworkError;
use crate::Result;

/// Negotiation client for one replication peer.
///
/// Holds a single tonic channel; clones share it. Gzip runs in both
/// directions, matching the server side.
#[derive(Debug, Clone)]
pub struct ReplicationClient {
    channel: Channel,
    peer: String,
    request_timeout: Duration,
}

impl ReplicationClient {
    /// Connects to `addr`, a bare `host:port` or a full URI.
    pub async fn connect(addr: &str, config: &NetworkConfig) -> Result<Self> {
        let uri = endpoint_uri(addr);
        debug!("connecting replication client to {}", uri);

        // The channel also carries unbounded import streams, so the
        // request timeout wraps each unary call instead of the endpoint.
        let channel = Endpoint::try_from(uri.clone())
            .map_err(|e| NetworkError::InvalidURI(e.to_string()))?
            .connect_timeout(Duration::from_millis(config.connect_timeout_in_ms))
            .tcp_keepalive(Some(Duration::from_secs(config.tcp_keepalive_in_secs)))
            .http2_keep_alive_interval(Duration::from_secs(
                config.http2_keep_alive_interval_in_secs,
            ))
            .keep_alive_timeout(Duration::from_secs(config.http2_keep_alive_timeout_in_secs))
            .tcp_nodelay(config.tcp_nodelay)
            .connect()
            .await?;

        Ok(Self {
            channel,
            peer: uri,
            request_timeout: Duration::from_millis(config.request_timeout_in_ms),
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub(crate) fn service(&self) -> ReplicationServiceClient<Channel> {
        ReplicationServiceClient::new(self.channel.clone())
            .send_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Gzip)
    }

    /// Which of `source_snapshots` the peer's `dataset` lacks.
    pub async fn snapshots_needed(
        &self,
        dataset: &str,
        source_snapshots: Vec<String>,
        apply_schedule_filter: bool,
    ) -> Result<Vec<String>> {
        let mut service = self.service();
        let reply = self
            .bounded(service.snapshots_needed(SnapshotsNeededRequest {
                dataset: dataset.to_string(),
                source_snapshots,
                apply_schedule_filter,
            }))
            .await?;
        Ok(reply.snapshots)
    }

    /// Which of `source_snapshots` the peer's `dataset` also holds.
    pub async fn common_snapshots(
        &self,
        dataset: &str,
        source_snapshots: Vec<String>,
    ) -> Result<Vec<String>> {
        let mut service = self.service();
        let reply = self
            .bounded(service.common_snapshots(CommonSnapshotsRequest {
                dataset: dataset.to_string(),
                source_snapshots,
            }))
            .await?;
        Ok(reply.snapshots)
    }

    /// The next snapshot the peer wants for `dataset`, `None` when it is
    /// already caught up.
    pub async fn latest_snapshot_needed(
        &self,
        dataset: &str,
        source_snapshots: Vec<String>,
    ) -> Result<Option<String>> {
        let mut service = self.service();
        let reply = self
            .bounded(service.latest_snapshot_needed(LatestSnapshotNeededRequest {
                dataset: dataset.to_string(),
                source_snapshots,
            }))
            .await?;
        Ok(reply.snapshot)
    }

    /// The peer's full inventory for `dataset`, oldest first.
    pub async fn list_snapshots(&self, dataset: &str) -> Result<Vec<String>> {
        let mut service = self.service();
        let reply = self
            .bounded(service.list_snapshots(ListSnapshotsRequest {
                dataset: dataset.to_string(),
            }))
            .await?;
        Ok(reply.snapshots)
    }

    /// Runs a unary call under the configured request timeout. A zero
    /// timeout disables the bound.
    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<tonic::Response<T>, tonic::Status>>,
    {
        let reply = if self.request_timeout.is_zero() {
            call.await
        } else {
            match tokio::time::timeout(self.request_timeout, call).await {
                Ok(reply) => reply,
                Err(_) => {
                    return Err(NetworkError::Timeout {
                        address: self.peer.clone(),
                        duration: self.request_timeout,
                    }
                    .into());
                }
            }
        };

        match reply {
            Ok(response) => Ok(response.into_inner()),
            Err(status) => {
                error!("replication rpc against {} failed: {:?}", self.peer, status);
                Err(status.into())
            }
        }
    }
}
