#![forbid(unsafe_code)]

use crate::step::StepHash;
use std::collections::BTreeMap;

/// One persisted ledger row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    pub hash: StepHash,
    pub revert: String,
    pub group: String,
    pub order: i64,
    pub name: String,
    pub origin: String,
    pub applied_at_ms: i64,
}

impl LedgerEntry {
    /// Rows written before groups were tracked carry an empty group.
    pub fn is_unattributed(&self) -> bool {
        self.group.is_empty()
    }
}

/// In-memory view of the ledger rows a run considers, keyed by hash.
#[derive(Clone, Debug, Default)]
pub struct LedgerSnapshot {
    by_hash: BTreeMap<StepHash, LedgerEntry>,
    shadowed: Vec<LedgerEntry>,
}

impl LedgerSnapshot {
    pub fn from_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let mut entries = entries.into_iter().collect::<Vec<_>>();
        entries.sort_by_key(|entry| entry.order);

        let mut snapshot = Self::default();
        for entry in entries {
            // A hash recorded twice keeps its latest row; older rows are orphaned.
            if let Some(previous) = snapshot.by_hash.insert(entry.hash.clone(), entry) {
                snapshot.shadowed.push(previous);
            }
        }
        snapshot
    }

    pub fn take(&mut self, hash: &StepHash) -> Option<LedgerEntry> {
        self.by_hash.remove(hash)
    }

    pub fn len(&self) -> usize {
        self.by_hash.len() + self.shadowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_orphans(self) -> Vec<LedgerEntry> {
        let mut orphans = self.shadowed;
        orphans.extend(self.by_hash.into_values());
        orphans
    }
}
