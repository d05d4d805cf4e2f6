//! Configuration drift across ingested bundles
//!
//! Flag snapshots are grouped into per (node, role) lineages, diffed forward in
//! time and rolled up per node and per role. Report records are correlated by
//! cluster identity to find the history a drift report is computed over.

pub mod correlate;
pub mod diff;
pub mod engine;
pub mod snapshot;

pub use correlate::{
    cluster_history, cluster_snapshots, organization_history, related, RelatedReport, RelatedReports,
    ReportRecord,
};
pub use diff::{ChangeCounts, DiffKind, FlagChange, FlagDiff};
pub use engine::{compute_drift, DriftEntry, DriftReport, LineageDrift};
pub use snapshot::{ClusterIdentity, FlagSnapshot, Flags, Lineage, LineageKey};

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriftError {
    #[error("snapshot for {found} pushed into lineage {expected}")]
    CrossLineage {
        expected: LineageKey,
        found: LineageKey,
    },

    #[error("bundle '{bundle}' already has a snapshot for {key} (at {timestamp})")]
    DuplicateSnapshot {
        bundle: String,
        key: LineageKey,
        timestamp: DateTime<Utc>,
    },
}
