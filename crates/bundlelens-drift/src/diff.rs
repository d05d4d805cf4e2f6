//! Difference between two flag snapshots of the same lineage

use crate::snapshot::Flags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Initial, // first snapshot of a lineage, establishes the baseline
    Delta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagChange {
    pub old: String,
    pub new: String,
}

/// Changes from an older snapshot to a newer one. Unchanged flags appear in none
/// of the maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDiff {
    #[serde(rename = "type")]
    pub kind: DiffKind,
    pub added: Flags,
    pub removed: Flags,
    pub modified: BTreeMap<String, FlagChange>,
}

impl FlagDiff {
    pub fn initial() -> Self {
        Self {
            kind: DiffKind::Initial,
            added: Flags::new(),
            removed: Flags::new(),
            modified: BTreeMap::new(),
        }
    }

    pub fn between(older: &Flags, newer: &Flags) -> Self {
        let mut diff = Self {
            kind: DiffKind::Delta,
            ..Self::initial()
        };

        for (name, value) in newer {
            match older.get(name) {
                None => {
                    diff.added.insert(name.clone(), value.clone());
                }
                Some(old) if old != value => {
                    diff.modified.insert(
                        name.clone(),
                        FlagChange {
                            old: old.clone(),
                            new: value.clone(),
                        },
                    );
                }
                Some(_) => {}
            }
        }
        for (name, value) in older {
            if !newer.contains_key(name) {
                diff.removed.insert(name.clone(), value.clone());
            }
        }
        diff
    }

    /// Replay the diff on top of `base`. For a diff produced by
    /// `between(a, b)`, `apply(a)` yields `b`.
    pub fn apply(&self, base: &Flags) -> Flags {
        let mut flags = base.clone();
        for name in self.removed.keys() {
            flags.remove(name);
        }
        for (name, value) in &self.added {
            flags.insert(name.clone(), value.clone());
        }
        for (name, change) in &self.modified {
            flags.insert(name.clone(), change.new.clone());
        }
        flags
    }

    pub fn counts(&self) -> ChangeCounts {
        ChangeCounts {
            added: self.added.len(),
            removed: self.removed.len(),
            modified: self.modified.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Rolled-up change counts, used to order nodes and roles for display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

impl AddAssign for ChangeCounts {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
        self.modified += other.modified;
    }
}
