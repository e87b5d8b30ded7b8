#![forbid(unsafe_code)]

use crate::ledger::{LedgerEntry, LedgerSnapshot};
use crate::series::Series;
use crate::step::StepHash;
use std::collections::BTreeSet;

/// Ledger entries that must be undone before forward progress, most
/// recently applied first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RevertPlan {
    pub boundary: Option<i64>,
    pub entries: Vec<LedgerEntry>,
    pub already_applied: usize,
}

impl RevertPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hashes(&self) -> Vec<StepHash> {
        self.entries.iter().map(|entry| entry.hash.clone()).collect()
    }

    /// Folds in ledger entries recorded at or after the boundary that the
    /// planned series do not account for, such as rows of unselected groups.
    /// Returns how many were added.
    pub fn absorb(&mut self, later: impl IntoIterator<Item = LedgerEntry>) -> usize {
        let Some(boundary) = self.boundary else {
            return 0;
        };
        let planned = self
            .entries
            .iter()
            .map(|entry| entry.order)
            .collect::<BTreeSet<_>>();
        let before = self.entries.len();
        self.entries.extend(
            later
                .into_iter()
                .filter(|entry| entry.order >= boundary && !planned.contains(&entry.order)),
        );
        self.entries.sort_by(|a, b| b.order.cmp(&a.order));
        self.entries.len() - before
    }
}

/// Earliest application order among entries no series claims any more.
pub fn revert_boundary(orphans: &[LedgerEntry]) -> Option<i64> {
    orphans.iter().map(|entry| entry.order).min()
}

/// Reconciles every series against the snapshot, then rewinds each one to
/// the revert boundary. Touches nothing but the in-memory series.
pub fn plan_reverts(series: &mut [Series], mut snapshot: LedgerSnapshot) -> RevertPlan {
    let already_applied = series
        .iter_mut()
        .map(|one| one.reconcile(&mut snapshot))
        .sum::<usize>();

    // An unattributed row only counts against this run once a series has
    // claimed an older unattributed row; before that it may belong to any group.
    let legacy_floor = series
        .iter()
        .flat_map(|one| one.matched())
        .filter(|entry| entry.is_unattributed())
        .map(|entry| entry.order)
        .min();
    let orphans = snapshot
        .into_orphans()
        .into_iter()
        .filter(|entry| {
            !entry.is_unattributed() || legacy_floor.is_some_and(|floor| entry.order > floor)
        })
        .collect::<Vec<_>>();
    let Some(boundary) = revert_boundary(&orphans) else {
        return RevertPlan {
            boundary: None,
            entries: Vec::new(),
            already_applied,
        };
    };

    let mut entries = orphans;
    let mut rewound = 0usize;
    for one in series.iter_mut() {
        let undone = one.rewind(boundary);
        rewound += undone.len();
        entries.extend(undone);
    }
    entries.sort_by(|a, b| b.order.cmp(&a.order));

    RevertPlan {
        boundary: Some(boundary),
        entries,
        already_applied: already_applied - rewound,
    }
}
