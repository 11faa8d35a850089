//! Snapshot inventories and replication planning.
//!
//! A [`SnapshotSet`] is the ordered view of one dataset's snapshots at
//! a point in time; the planner compares a source set against a
//! destination set and derives the cheapest next transfer.

mod planner;
mod snapshot_set;
pub use planner::*;
pub use snapshot_set::*;
