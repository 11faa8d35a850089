//! Scheduled snapshot creation and retention.
//!
//! Every enabled schedule runs as its own repeating task: create a
//! timestamped snapshot, then queue everything beyond the schedule's
//! keep count for deletion. Deletions from all schedules funnel into
//! one deduplicating FIFO drained by a single paced consumer, so the
//! engine never sees two destroys at once.

mod retention_queue;
mod schedule_runner;

pub use retention_queue::*;
pub use schedule_runner::*;

#[cfg(test)]
mod schedule_runner_test;
