// Flag snapshots and the per (node, role) lineage they accumulate into

use crate::diff::FlagDiff;
use crate::DriftError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// flag name -> value, as declared by the process
pub type Flags = BTreeMap<String, String>;

/// Grouping key for related reports and snapshot lineages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterIdentity {
    pub cluster_uuid: Uuid,
    pub organization: String,
}

impl ClusterIdentity {
    pub fn new(cluster_uuid: Uuid, organization: impl Into<String>) -> Self {
        Self {
            cluster_uuid,
            organization: organization.into(),
        }
    }
}

/// Flags of one process role on one node, as captured by one bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSnapshot {
    pub bundle: String,
    pub timestamp: DateTime<Utc>,
    pub node: String,
    pub role: String, // server type: master, tserver, ...
    pub flags: Flags,
}

impl FlagSnapshot {
    pub fn lineage_key(&self) -> LineageKey {
        LineageKey::new(&self.node, &self.role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineageKey {
    pub node: String,
    pub role: String,
}

impl LineageKey {
    pub fn new(node: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            role: role.into(),
        }
    }
}

impl fmt::Display for LineageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.role)
    }
}

/// Append-only, time ordered snapshots of a single (node, role).
/// Ties on timestamp are ordered by bundle name so the order never depends on
/// arrival order.
#[derive(Debug, Clone)]
pub struct Lineage {
    key: LineageKey,
    snapshots: Vec<FlagSnapshot>,
}

impl Lineage {
    pub fn new(key: LineageKey) -> Self {
        Self {
            key,
            snapshots: Vec::new(),
        }
    }

    pub fn key(&self) -> &LineageKey {
        &self.key
    }

    /// Insert in time order. A snapshot from another (node, role) or a second
    /// snapshot from the same bundle is rejected.
    pub fn push(&mut self, snapshot: FlagSnapshot) -> Result<(), DriftError> {
        let found = snapshot.lineage_key();
        if found != self.key {
            return Err(DriftError::CrossLineage {
                expected: self.key.clone(),
                found,
            });
        }
        if let Some(existing) = self.snapshots.iter().find(|s| s.bundle == snapshot.bundle) {
            return Err(DriftError::DuplicateSnapshot {
                bundle: snapshot.bundle,
                key: found,
                timestamp: existing.timestamp,
            });
        }

        let at = self.snapshots.partition_point(|s| {
            (s.timestamp, s.bundle.as_str()) <= (snapshot.timestamp, snapshot.bundle.as_str())
        });
        self.snapshots.insert(at, snapshot);
        Ok(())
    }

    /// Oldest first
    pub fn snapshots(&self) -> &[FlagSnapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// One diff per snapshot, oldest first: the first is the initial baseline,
    /// every later one is computed against its predecessor.
    pub fn diffs(&self) -> Vec<(&FlagSnapshot, FlagDiff)> {
        let mut out = Vec::with_capacity(self.snapshots.len());
        let mut previous: Option<&FlagSnapshot> = None;
        for snapshot in &self.snapshots {
            let diff = match previous {
                None => FlagDiff::initial(),
                Some(older) => FlagDiff::between(&older.flags, &snapshot.flags),
            };
            out.push((snapshot, diff));
            previous = Some(snapshot);
        }
        out
    }
}
