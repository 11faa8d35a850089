//! Replication gRPC service implementation handling snapshot negotiation
//! between peer nodes and streamed snapshot imports. Negotiation compares a
//! caller-supplied source listing against the local inventory; imports feed a
//! local receive process chunk by chunk.

use autometrics::autometrics;
use nanoid::nanoid;
use tonic::Response;
use tonic::Status;
use tonic::Streaming;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::metrics::RECEIVED_BYTES_METRIC;
use crate::proto::replication::replication_service_server::ReplicationService;
use crate::proto::replication::CommonSnapshotsRequest;
use crate::proto::replication::LatestSnapshotNeededRequest;
use crate::proto::replication::LatestSnapshotNeededResponse;
use crate::proto::replication::ListSnapshotsRequest;
use crate::proto::replication::ReceiveChunk;
use crate::proto::replication::ReceiveSummary;
use crate::proto::replication::SnapshotList;
use crate::proto::replication::SnapshotsNeededRequest;
use crate::snapshots;
use crate::EngineError;
use crate::EngineNode;
use crate::Error;
use crate::PlanError;
use crate::PlanOutcome;
use crate::ReceiveSink;
use crate::ReplicationError;
use crate::SnapshotSet;
use crate::SystemError;
use crate::API_SLO;

#[tonic::async_trait]
impl ReplicationService for EngineNode {
    /// Answers which source snapshots are missing here.
    /// # Negotiation Logic
    /// - The caller is the source and ships its own listing
    /// - The answer preserves source order, oldest first
    /// - With the schedule filter set, only names owned by a configured
    ///   schedule count
    #[cfg_attr(not(doc), autometrics(objective = API_SLO))]
    #[tracing::instrument]
    async fn snapshots_needed(
        &self,
        request: tonic::Request<SnapshotsNeededRequest>,
    ) -> std::result::Result<tonic::Response<SnapshotList>, tonic::Status> {
        if !self.server_is_ready() {
            warn!("[rpc|snapshots_needed] {} is not ready!", self.node_name());
            return Err(Status::unavailable("Service is not ready"));
        }

        let req = request.into_inner();
        let destination = SnapshotSet::load(self.engine.as_ref(), &req.dataset)
            .await
            .map_err(status_from_error)?;
        let source = SnapshotSet::from_remote(&req.dataset, req.source_snapshots);

        let prefixes = req
            .apply_schedule_filter
            .then(|| self.settings.schedule_prefixes());
        let needed = snapshots::snapshots_needed(&source, &destination, prefixes.as_deref());

        debug!(
            "[rpc|snapshots_needed] '{}' lacks {} snapshot(s)",
            req.dataset,
            needed.len()
        );
        Ok(Response::new(SnapshotList { snapshots: needed }))
    }

    /// Answers which snapshots both sides hold, in source order.
    #[cfg_attr(not(doc), autometrics(objective = API_SLO))]
    #[tracing::instrument]
    async fn common_snapshots(
        &self,
        request: tonic::Request<CommonSnapshotsRequest>,
    ) -> std::result::Result<tonic::Response<SnapshotList>, tonic::Status> {
        if !self.server_is_ready() {
            warn!("[rpc|common_snapshots] {} is not ready!", self.node_name());
            return Err(Status::unavailable("Service is not ready"));
        }

        let req = request.into_inner();
        let destination = SnapshotSet::load(self.engine.as_ref(), &req.dataset)
            .await
            .map_err(status_from_error)?;
        let source = SnapshotSet::from_remote(&req.dataset, req.source_snapshots);

        let shared = snapshots::common_snapshots(&source, &destination);
        Ok(Response::new(SnapshotList { snapshots: shared }))
    }

    /// Runs the full planner against the caller's listing and answers
    /// with the next target to send, unset when nothing is missing.
    /// # Negotiation Logic
    /// - The youngest source snapshot absent here wins
    /// - A local snapshot younger than the target fails the call; the
    ///   caller must not try to send into a destination that moved ahead
    #[cfg_attr(not(doc), autometrics(objective = API_SLO))]
    #[tracing::instrument]
    async fn latest_snapshot_needed(
        &self,
        request: tonic::Request<LatestSnapshotNeededRequest>,
    ) -> std::result::Result<tonic::Response<LatestSnapshotNeededResponse>, tonic::Status> {
        if !self.server_is_ready() {
            warn!(
                "[rpc|latest_snapshot_needed] {} is not ready!",
                self.node_name()
            );
            return Err(Status::unavailable("Service is not ready"));
        }

        let req = request.into_inner();
        let destination = SnapshotSet::load(self.engine.as_ref(), &req.dataset)
            .await
            .map_err(status_from_error)?;
        let source = SnapshotSet::from_remote(&req.dataset, req.source_snapshots);

        match snapshots::plan(&source, &destination, None) {
            Ok(PlanOutcome::Plan(plan)) => Ok(Response::new(LatestSnapshotNeededResponse {
                snapshot: Some(plan.target),
            })),
            Ok(PlanOutcome::UpToDate) => {
                debug!("[rpc|latest_snapshot_needed] '{}' is up to date", req.dataset);
                Ok(Response::new(LatestSnapshotNeededResponse { snapshot: None }))
            }
            Err(e) => Err(status_from_error(e)),
        }
    }

    /// Returns the local snapshot listing of one dataset, oldest first.
    #[cfg_attr(not(doc), autometrics(objective = API_SLO))]
    #[tracing::instrument]
    async fn list_snapshots(
        &self,
        request: tonic::Request<ListSnapshotsRequest>,
    ) -> std::result::Result<tonic::Response<SnapshotList>, tonic::Status> {
        if !self.server_is_ready() {
            warn!("[rpc|list_snapshots] {} is not ready!", self.node_name());
            return Err(Status::unavailable("Service is not ready"));
        }

        let req = request.into_inner();
        let set = SnapshotSet::load(self.engine.as_ref(), &req.dataset)
            .await
            .map_err(status_from_error)?;
        Ok(Response::new(SnapshotList {
            snapshots: set.names(),
        }))
    }

    /// Imports a streamed snapshot into a local dataset.
    /// # Stream Protocol
    /// - The first chunk names the dataset; every chunk may carry payload
    /// - A dead receive process stops the pull early; the summary then
    ///   reports failure with the process diagnostics attached
    /// - A broken client stream kills the import outright
    async fn receive(
        &self,
        request: tonic::Request<Streaming<ReceiveChunk>>,
    ) -> std::result::Result<tonic::Response<ReceiveSummary>, tonic::Status> {
        if !self.server_is_ready() {
            warn!("[rpc|receive] {} is not ready!", self.node_name());
            return Err(Status::unavailable("Service is not ready"));
        }

        let mut stream = request.into_inner();

        let first = match stream.message().await? {
            Some(chunk) => chunk,
            None => return Err(Status::invalid_argument("Receive stream carried no chunks")),
        };
        if first.dataset.is_empty() {
            return Err(Status::invalid_argument(
                "First receive chunk must name the dataset",
            ));
        }
        let dataset = first.dataset.clone();
        if dataset.contains('@') || dataset.contains(char::is_whitespace) {
            return Err(Status::invalid_argument(format!(
                "Invalid dataset name '{dataset}'"
            )));
        }

        let transfer_id = nanoid!(10);
        info!(
            "[{}] receiving snapshot stream into '{}'",
            transfer_id, dataset
        );

        let recv_cmd = self.engine.receive_command(dataset.clone());
        let mut sink = ReceiveSink::spawn(
            transfer_id.clone(),
            recv_cmd,
            self.settings.replication.capture_lines,
        )
        .map_err(status_from_error)?;

        // Pump chunks until client EOF. A dead receive process stops the
        // pull; the exit status collected below explains it.
        let mut clean_eof = false;
        let mut write_error: Option<Error> = None;

        if let Err(e) = sink.write_chunk(&first.data).await {
            write_error = Some(e);
        }
        while write_error.is_none() {
            match stream.message().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = sink.write_chunk(&chunk.data).await {
                        write_error = Some(e);
                    }
                }
                Ok(None) => {
                    clean_eof = true;
                    break;
                }
                Err(status) => {
                    // Peer abandoned the stream: nothing of this import
                    // may survive.
                    warn!("[{}] receive stream broke: {}", transfer_id, status);
                    let _ = sink.abort().await;
                    return Err(status);
                }
            }
        }

        let outcome = sink.finish().await.map_err(status_from_error)?;
        let success = outcome.success && clean_eof;
        if success {
            RECEIVED_BYTES_METRIC
                .with_label_values(&[&dataset])
                .inc_by(outcome.bytes_received);
            info!(
                "[{}] received {} bytes into '{}'",
                transfer_id, outcome.bytes_received, dataset
            );
        } else {
            warn!(
                "[{}] receive into '{}' failed (exit {:?}, clean eof: {}): {:?}",
                transfer_id, dataset, outcome.status_code, clean_eof, write_error
            );
        }

        Ok(Response::new(ReceiveSummary {
            success,
            bytes_received: outcome.bytes_received,
            detail: outcome.diagnostics.join("\n"),
        }))
    }
}

/// Maps engine and planner failures onto transport status codes.
/// Callers lean on the distinction between "dataset missing" (not found)
/// and "destination moved ahead" (failed precondition) to pick their
/// next step, so those two must stay stable.
fn status_from_error(e: Error) -> Status {
    match e {
        Error::System(SystemError::Engine(engine_error)) => match engine_error {
            EngineError::DatasetNotFound(_) => Status::not_found(engine_error.to_string()),
            _ => Status::internal(engine_error.to_string()),
        },
        Error::Replication(ReplicationError::Plan(plan_error)) => match plan_error {
            PlanError::StaleTarget { .. } => Status::failed_precondition(plan_error.to_string()),
            PlanError::UnknownTarget { .. } => Status::not_found(plan_error.to_string()),
            _ => Status::invalid_argument(plan_error.to_string()),
        },
        other => Status::internal(other.to_string()),
    }
}
