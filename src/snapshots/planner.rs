use tracing::debug;

use crate::PlanError;
use crate::Result;
use crate::SnapshotSet;

/// How the target snapshot travels to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Complete stream of the target snapshot
    Full,
    /// Delta between the anchor and the target
    Incremental,
}

/// One derived transfer: send `target` from the source dataset into the
/// destination dataset, as a delta from `anchor` when one exists.
///
/// Coherence invariant: `Incremental` always carries an anchor, `Full`
/// never does; [`ReplicationPlan::validate`] rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationPlan {
    pub source_dataset: String,
    pub destination_dataset: String,
    pub anchor: Option<String>,
    pub target: String,
    pub mode: TransferMode,
}

impl ReplicationPlan {
    pub fn validate(&self) -> Result<()> {
        match (self.mode, &self.anchor) {
            (TransferMode::Incremental, None) => Err(PlanError::MissingAnchor {
                dataset: self.source_dataset.clone(),
            }
            .into()),
            (TransferMode::Full, Some(anchor)) => Err(PlanError::UnexpectedAnchor {
                dataset: self.source_dataset.clone(),
                anchor: anchor.clone(),
            }
            .into()),
            _ => Ok(()),
        }
    }
}

/// Result of planning: either a transfer to run or nothing to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    Plan(ReplicationPlan),
    UpToDate,
}

/// Derives the next transfer from `source` towards `destination`.
///
/// Target selection: `desired_target` when given (it must exist on the
/// source), otherwise the youngest source snapshot the destination
/// lacks. The anchor is the youngest snapshot both sides share; with no
/// shared snapshot the transfer degrades to a full stream.
///
/// A destination that already holds a snapshot younger than the target
/// cannot accept the delta; that case fails with
/// [`PlanError::StaleTarget`] instead of guessing.
pub fn plan(
    source: &SnapshotSet,
    destination: &SnapshotSet,
    desired_target: Option<&str>,
) -> Result<PlanOutcome> {
    let target = match desired_target {
        Some(name) => {
            if source.index_of(name).is_none() {
                return Err(PlanError::UnknownTarget {
                    dataset: source.dataset().to_string(),
                    name: name.to_string(),
                }
                .into());
            }
            name.to_string()
        }
        None => {
            let needed = source.difference(destination);
            match needed.last() {
                Some(entry) => entry.name.clone(),
                None => {
                    debug!(
                        "nothing to send: '{}' already holds every snapshot of '{}'",
                        destination.dataset(),
                        source.dataset()
                    );
                    return Ok(PlanOutcome::UpToDate);
                }
            }
        }
    };

    if destination.contains(&target) {
        debug!(
            "snapshot '{}' already present on '{}'",
            target,
            destination.dataset()
        );
        return Ok(PlanOutcome::UpToDate);
    }

    // index_of cannot fail here: target was taken from or checked
    // against the source set above
    let target_index = source.index_of(&target).unwrap_or_default();

    let common = common_snapshots(source, destination);
    let anchor = source.latest_in(&common);

    if let Some(anchor_entry) = anchor {
        if anchor_entry.created_index > target_index {
            return Err(PlanError::StaleTarget {
                anchor: anchor_entry.name.clone(),
                anchor_index: anchor_entry.created_index,
                target,
                target_index,
            }
            .into());
        }
    }

    let plan = match anchor {
        Some(anchor_entry) => ReplicationPlan {
            source_dataset: source.dataset().to_string(),
            destination_dataset: destination.dataset().to_string(),
            anchor: Some(anchor_entry.name.clone()),
            target,
            mode: TransferMode::Incremental,
        },
        None => ReplicationPlan {
            source_dataset: source.dataset().to_string(),
            destination_dataset: destination.dataset().to_string(),
            anchor: None,
            target,
            mode: TransferMode::Full,
        },
    };

    plan.validate()?;
    Ok(PlanOutcome::Plan(plan))
}

/// Source-order names the destination lacks, optionally narrowed to
/// the given name prefixes.
pub fn snapshots_needed(
    source: &SnapshotSet,
    destination: &SnapshotSet,
    prefixes: Option<&[String]>,
) -> Vec<String> {
    source
        .difference(destination)
        .into_iter()
        .map(|e| e.name.clone())
        .filter(|name| match prefixes {
            Some(prefixes) => prefixes.iter().any(|p| name.starts_with(p.as_str())),
            None => true,
        })
        .collect()
}

/// Names present on both sides, in source order.
pub fn common_snapshots(source: &SnapshotSet, destination: &SnapshotSet) -> Vec<String> {
    source
        .intersection(destination)
        .into_iter()
        .map(|e| e.name.clone())
        .collect()
}
