#![forbid(unsafe_code)]

use crate::ids::GroupKey;
use crate::ledger::{LedgerEntry, LedgerSnapshot};
use crate::step::Step;

/// A step that could not run because its prerequisite never held.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockedStep {
    pub group: String,
    pub name: String,
    pub origin: String,
    pub prerequisite: String,
}

impl std::fmt::Display for BlockedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.group, self.name)?;
        if !self.origin.is_empty() {
            write!(f, " ({})", self.origin)?;
        }
        write!(f, " waiting on `{}`", self.prerequisite)
    }
}

/// An ordered run of steps from one registration with a cursor pointing at
/// the next step to attempt.
///
/// The cursor only moves forward, except for the single rewind performed
/// while planning reverts.
#[derive(Clone, Debug)]
pub struct Series {
    group: GroupKey,
    steps: Vec<Step>,
    recorded: Vec<Option<LedgerEntry>>,
    cursor: usize,
    rewound: bool,
}

impl Series {
    pub fn new(group: GroupKey, steps: Vec<Step>) -> Self {
        let recorded = vec![None; steps.len()];
        Self {
            group,
            steps,
            recorded,
            cursor: 0,
            rewound: false,
        }
    }

    pub fn group(&self) -> &GroupKey {
        &self.group
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    pub fn current(&self) -> Option<&Step> {
        self.steps.get(self.cursor)
    }

    /// Ledger entries currently matched by the leading steps.
    pub fn matched(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.recorded[..self.cursor].iter().flatten()
    }

    /// The step this series is waiting on, if it has not finished.
    pub fn blocked_step(&self) -> Option<BlockedStep> {
        let step = self.current()?;
        Some(BlockedStep {
            group: self.group.as_str().to_string(),
            name: step.name().to_string(),
            origin: step.origin().to_string(),
            prerequisite: step.prerequisite().unwrap_or_default().to_string(),
        })
    }

    pub fn advance(&mut self) {
        if !self.is_done() {
            self.cursor += 1;
        }
    }

    /// Skips every leading step already present in the ledger, taking the
    /// matched entries out of `snapshot`. Returns how many steps matched.
    pub fn reconcile(&mut self, snapshot: &mut LedgerSnapshot) -> usize {
        let start = self.cursor;
        while let Some(step) = self.steps.get(self.cursor) {
            let Some(entry) = snapshot.take(step.hash()) else {
                break;
            };
            self.recorded[self.cursor] = Some(entry);
            self.cursor += 1;
        }
        self.cursor - start
    }

    /// Moves the cursor back over every matched step recorded at or after
    /// `boundary` and returns their ledger entries.
    pub fn rewind(&mut self, boundary: i64) -> Vec<LedgerEntry> {
        debug_assert!(!self.rewound, "a series is rewound at most once per run");
        self.rewound = true;

        let mut undone = Vec::new();
        while self.cursor > 0 {
            let index = self.cursor - 1;
            let Some(entry) = self.recorded[index].as_ref() else {
                break;
            };
            if entry.order < boundary {
                break;
            }
            if let Some(entry) = self.recorded[index].take() {
                undone.push(entry);
            }
            self.cursor = index;
        }
        undone
    }
}
