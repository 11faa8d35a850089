//! Snapshot Replication Engine Error Hierarchy
//!
//! Defines comprehensive error types for the snapshot engine,
//! categorized by subsystem and operational concerns.

use std::fmt;
use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, dataset engine)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Replication workflow violations and failures
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Network layer
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    // Dataset engine layer
    #[error("Dataset engine operation failed")]
    Engine(#[from] EngineError),

    // Basic node operations
    #[error("Node failed to start: {0}")]
    NodeStartFailed(String),

    #[error("General server error: {0}")]
    GeneralServer(String),

    #[error("Internal server error")]
    ServerUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// Plan derivation failures (anchor/target negotiation)
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Transfer pipeline failures (send/receive pumping)
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Retention queue failures (snapshot pruning)
    #[error(transparent)]
    Retention(#[from] RetentionError),
}

/// Failures raised while shelling out to the dataset tooling.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The named dataset is unknown to the pool
    #[error("Dataset '{0}' does not exist")]
    DatasetNotFound(String),

    /// The tool ran but reported failure
    #[error("zfs {verb} exited with status {status:?}: {stderr}")]
    CommandFailed {
        verb: &'static str,
        status: Option<i32>,
        stderr: String,
    },

    /// The tool binary could not be launched at all
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Listing output that does not match the expected columns
    #[error("Unparsable zfs output: {0}")]
    UnexpectedOutput(String),

    /// I/O failures while talking to the child process
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Requested target snapshot is not present on the source
    #[error("Snapshot '{name}' not found in source dataset '{dataset}'")]
    UnknownTarget { dataset: String, name: String },

    /// Destination already holds a snapshot newer than the requested target
    #[error(
        "Destination anchor '{anchor}' (index {anchor_index}) postdates target '{target}' (index {target_index})"
    )]
    StaleTarget {
        anchor: String,
        anchor_index: u64,
        target: String,
        target_index: u64,
    },

    /// Incremental plan without a base snapshot
    #[error("Incremental plan for '{dataset}' is missing an anchor snapshot")]
    MissingAnchor { dataset: String },

    /// Full plan carrying a base snapshot
    #[error("Full plan for '{dataset}' must not carry anchor '{anchor}'")]
    UnexpectedAnchor { dataset: String, anchor: String },
}

/// Which half of the send|receive pipeline an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Send,
    Receive,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Send => write!(f, "send"),
            Leg::Receive => write!(f, "receive"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Child process could not be spawned
    #[error("Failed to spawn {leg} process: {source}")]
    Spawn {
        leg: Leg,
        #[source]
        source: std::io::Error,
    },

    /// Child process came up without the expected piped stream
    #[error("{leg} process has no piped {stream}")]
    MissingPipe { leg: Leg, stream: &'static str },

    /// Child process status could not be collected
    #[error("Failed to collect {leg} process status: {source}")]
    Wait {
        leg: Leg,
        #[source]
        source: std::io::Error,
    },

    /// One side of the pump vanished mid-stream
    #[error("Pipe to {leg} process broke after {bytes_copied} bytes")]
    BrokenPipe {
        leg: Leg,
        bytes_copied: u64,
        diagnostics: Vec<String>,
    },

    /// Both processes finished but at least one reported failure
    #[error("Transfer tools exited with failure (send: {send_status:?}, receive: {receive_status:?})")]
    ToolExit {
        send_status: Option<i32>,
        receive_status: Option<i32>,
        diagnostics: Vec<String>,
    },

    /// The configured wall-clock budget ran out
    #[error("Transfer exceeded deadline of {deadline:?}")]
    DeadlineExceeded {
        deadline: Duration,
        diagnostics: Vec<String>,
    },

    /// The peer ran the import but reported failure
    #[error("Peer rejected the stream after {bytes_received} bytes: {detail}")]
    RemoteRejected { bytes_received: u64, detail: String },

    /// Side-channel reader task panicked or was cancelled
    #[error("Transfer task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    /// Destroy still failing after the retry budget was spent
    #[error("Destroy of '{dataset}@{snapshot}' failed after {attempts} attempts: {last_error}")]
    DestroyFailed {
        dataset: String,
        snapshot: String,
        attempts: u32,
        last_error: String,
    },

    /// Consumer side of the queue has gone away
    #[error("Retention queue is closed")]
    QueueClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Endpoint unavailable (HTTP 503 equivalent)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Peer communication timeout
    #[error("Connection timeout to {address} after {duration:?}")]
    Timeout { address: String, duration: Duration },

    /// Malformed peer addresses
    #[error("Invalid URI format: {0}")]
    InvalidURI(String),

    /// TLS negotiation failures
    #[error("TLS handshake failed")]
    TlsHandshakeFailure,

    /// gRPC transport layer errors
    #[error(transparent)]
    TonicError(#[from] Box<tonic::transport::Error>),

    /// gRPC status code errors
    #[error(transparent)]
    TonicStatusError(#[from] Box<tonic::Status>),

    /// Background task failures
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Error::System(SystemError::Engine(e))
    }
}

// ===== Replication sub-error conversions =====

impl From<PlanError> for Error {
    fn from(e: PlanError) -> Self {
        Error::Replication(ReplicationError::Plan(e))
    }
}

impl From<TransferError> for Error {
    fn from(e: TransferError) -> Self {
        Error::Replication(ReplicationError::Transfer(e))
    }
}

impl From<RetentionError> for Error {
    fn from(e: RetentionError) -> Self {
        Error::Replication(ReplicationError::Retention(e))
    }
}

// ===== Network sub-error conversions =====

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        NetworkError::TonicError(Box::new(err)).into()
    }
}

impl From<tonic::Status> for Error {
    fn from(err: tonic::Status) -> Self {
        NetworkError::TonicStatusError(Box::new(err)).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        NetworkError::TaskFailed(err).into()
    }
}
