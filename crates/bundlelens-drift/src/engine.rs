//! Drift engine: lineages, per-entry diffs and the node/role roll-ups

use crate::diff::{ChangeCounts, FlagDiff};
use crate::snapshot::{FlagSnapshot, Lineage, LineageKey};
use crate::DriftError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One diff annotated with the bundle it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftEntry {
    pub bundle: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub diff: FlagDiff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageDrift {
    pub node: String,
    pub role: String,
    pub entries: Vec<DriftEntry>, // newest first
}

impl LineageDrift {
    /// Sum over non-initial entries
    pub fn counts(&self) -> ChangeCounts {
        let mut total = ChangeCounts::default();
        for entry in &self.entries {
            total += entry.diff.counts();
        }
        total
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub lineages: Vec<LineageDrift>, // ordered by (node, role)
    pub node_summary: BTreeMap<String, ChangeCounts>,
    pub role_summary: BTreeMap<String, ChangeCounts>,
}

impl DriftReport {
    pub fn lineage(&self, node: &str, role: &str) -> Option<&LineageDrift> {
        self.lineages.iter().find(|l| l.node == node && l.role == role)
    }

    /// Nodes with the most changes first, ties by name
    pub fn nodes_by_activity(&self) -> Vec<(&str, ChangeCounts)> {
        let mut nodes: Vec<(&str, ChangeCounts)> = self
            .node_summary
            .iter()
            .map(|(node, counts)| (node.as_str(), *counts))
            .collect();
        nodes.sort_by(|a, b| b.1.total().cmp(&a.1.total()).then_with(|| a.0.cmp(b.0)));
        nodes
    }

    pub fn is_empty(&self) -> bool {
        self.lineages.is_empty()
    }
}

/// Group snapshots into lineages and diff each lineage forward in time.
/// Input order does not matter.
pub fn compute_drift(
    snapshots: impl IntoIterator<Item = FlagSnapshot>,
) -> Result<DriftReport, DriftError> {
    let mut lineages: BTreeMap<LineageKey, Lineage> = BTreeMap::new();
    for snapshot in snapshots {
        let key = snapshot.lineage_key();
        lineages
            .entry(key.clone())
            .or_insert_with(|| Lineage::new(key))
            .push(snapshot)?;
    }

    let mut report = DriftReport::default();
    for (key, lineage) in &lineages {
        let mut entries: Vec<DriftEntry> = lineage
            .diffs()
            .into_iter()
            .map(|(snapshot, diff)| DriftEntry {
                bundle: snapshot.bundle.clone(),
                timestamp: snapshot.timestamp,
                diff,
            })
            .collect();
        entries.reverse();

        let drift = LineageDrift {
            node: key.node.clone(),
            role: key.role.clone(),
            entries,
        };
        let counts = drift.counts();
        *report.node_summary.entry(key.node.clone()).or_default() += counts;
        *report.role_summary.entry(key.role.clone()).or_default() += counts;

        debug!(lineage = %key, snapshots = lineage.len(), changes = counts.total(), "Lineage diffed");
        report.lineages.push(drift);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffKind;
    use crate::snapshot::Flags;
    use chrono::TimeZone;

    fn snap(bundle: &str, day: u32, node: &str, role: &str, pairs: &[(&str, &str)]) -> FlagSnapshot {
        FlagSnapshot {
            bundle: bundle.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            node: node.to_string(),
            role: role.to_string(),
            flags: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Flags>(),
        }
    }

    #[test]
    fn test_entries_newest_first() {
        let report = compute_drift(vec![
            snap("b1", 1, "n1", "tserver", &[("a", "1")]),
            snap("b3", 3, "n1", "tserver", &[("a", "3")]),
            snap("b2", 2, "n1", "tserver", &[("a", "2")]),
        ])
        .unwrap();

        let lineage = report.lineage("n1", "tserver").unwrap();
        let bundles: Vec<&str> = lineage.entries.iter().map(|e| e.bundle.as_str()).collect();
        assert_eq!(bundles, vec!["b3", "b2", "b1"]);
        assert_eq!(lineage.entries[2].diff.kind, DiffKind::Initial);
        assert_eq!(lineage.entries[0].diff.modified["a"].old, "2");
    }

    #[test]
    fn test_summaries() {
        let report = compute_drift(vec![
            snap("b1", 1, "n1", "tserver", &[("a", "1")]),
            snap("b2", 2, "n1", "tserver", &[("a", "2"), ("b", "1")]),
            snap("b1", 1, "n1", "master", &[("x", "1")]),
            snap("b2", 2, "n1", "master", &[]),
            snap("b1", 1, "n2", "tserver", &[("a", "1")]),
        ])
        .unwrap();

        assert_eq!(
            report.node_summary["n1"],
            ChangeCounts {
                added: 1,
                removed: 1,
                modified: 1
            }
        );
        assert_eq!(report.node_summary["n2"], ChangeCounts::default());
        assert_eq!(report.role_summary["master"].removed, 1);
        assert_eq!(report.role_summary["tserver"].total(), 2);
        assert_eq!(report.nodes_by_activity()[0].0, "n1");
    }

    #[test]
    fn test_duplicate_bundle_is_rejected() {
        let err = compute_drift(vec![
            snap("b1", 1, "n1", "tserver", &[]),
            snap("b1", 2, "n1", "tserver", &[]),
        ])
        .unwrap_err();
        assert!(matches!(err, DriftError::DuplicateSnapshot { .. }));
    }
}
