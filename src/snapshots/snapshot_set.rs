use std::collections::HashMap;

use crate::DatasetEngine;
use crate::Result;
use crate::SnapshotEntry;

/// Point-in-time inventory of one dataset's snapshots, oldest first.
///
/// Creation indices come from the pool (`createtxg`) for local sets and
/// from list positions for remote sets; either way a higher index means
/// a younger snapshot, and names are unique within the set.
#[derive(Debug, Clone)]
pub struct SnapshotSet {
    dataset: String,
    entries: Vec<SnapshotEntry>,
    index_by_name: HashMap<String, u64>,
}

impl SnapshotSet {
    /// Fresh inventory of `dataset` straight from the engine.
    pub async fn load(engine: &dyn DatasetEngine, dataset: &str) -> Result<Self> {
        let entries = engine.list_snapshots(dataset.to_string()).await?;
        Ok(Self::from_entries(dataset, entries))
    }

    /// Builds a set from listing rows, restoring oldest-first order.
    /// Repeated names keep their first occurrence.
    pub fn from_entries(dataset: &str, mut entries: Vec<SnapshotEntry>) -> Self {
        entries.sort_by_key(|e| e.created_index);

        let mut index_by_name = HashMap::with_capacity(entries.len());
        entries.retain(|e| {
            if index_by_name.contains_key(&e.name) {
                return false;
            }
            index_by_name.insert(e.name.clone(), e.created_index);
            true
        });

        Self {
            dataset: dataset.to_string(),
            entries,
            index_by_name,
        }
    }

    /// Ordered view of a remote peer's listing. The peer only ships
    /// names, so list positions stand in for creation indices.
    pub fn from_remote(dataset: &str, names: Vec<String>) -> Self {
        let entries = names
            .into_iter()
            .enumerate()
            .map(|(position, name)| SnapshotEntry {
                name,
                created_index: position as u64,
            })
            .collect();
        Self::from_entries(dataset, entries)
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All rows, oldest first.
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// All names, oldest first.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_by_name.contains_key(name)
    }

    pub fn index_of(&self, name: &str) -> Option<u64> {
        self.index_by_name.get(name).copied()
    }

    /// Youngest snapshot of the set.
    pub fn latest(&self) -> Option<&SnapshotEntry> {
        self.entries.last()
    }

    /// Members of this set that `other` lacks, oldest first.
    pub fn difference(&self, other: &SnapshotSet) -> Vec<&SnapshotEntry> {
        self.entries
            .iter()
            .filter(|e| !other.contains(&e.name))
            .collect()
    }

    /// Members shared with `other`, oldest first by this set's indices.
    pub fn intersection(&self, other: &SnapshotSet) -> Vec<&SnapshotEntry> {
        self.entries
            .iter()
            .filter(|e| other.contains(&e.name))
            .collect()
    }

    /// Youngest member of this set among `names`. Names unknown to the
    /// set are ignored.
    pub fn latest_in(&self, names: &[String]) -> Option<&SnapshotEntry> {
        names
            .iter()
            .filter_map(|n| {
                self.index_by_name
                    .get(n.as_str())
                    .map(|idx| (idx, n.as_str()))
            })
            .max_by_key(|(idx, _)| **idx)
            .and_then(|(_, name)| self.entries.iter().find(|e| e.name == name))
    }

    /// Members whose name starts with `prefix`, oldest first.
    pub fn matching_prefix(&self, prefix: &str) -> Vec<&SnapshotEntry> {
        self.entries
            .iter()
            .filter(|e| e.name.starts_with(prefix))
            .collect()
    }
}
