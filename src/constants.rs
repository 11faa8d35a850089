// -
// Snapshot naming

/// Prefix shared by every schedule-managed snapshot name
pub(crate) const MANAGED_SNAPSHOT_PREFIX: &str = "auto-";

/// strftime-style suffix appended to schedule-managed snapshot names
pub(crate) const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

// -
// Transfer pipeline

/// Block size used when pumping bytes between send and receive
pub(crate) const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Largest number of side-channel lines retained for error reports
pub(crate) const SIDE_CHANNEL_CAPTURE_LINES: usize = 200;

// -
// Retention queue

/// Pause between consecutive destroy tasks
pub(crate) const RETENTION_DRAIN_DELAY_MS: u64 = 1000;

/// Default bound of the deletion task channel
pub(crate) const RETENTION_QUEUE_CAPACITY: usize = 1024;

// -
// Network

/// Default port of the replication RPC listener
pub(crate) const DEFAULT_LISTEN_PORT: u16 = 4242;
