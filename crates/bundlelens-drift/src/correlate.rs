//! Identity correlation: which stored reports belong with which
//!
//! Records are grouped by their declared cluster identity. Related views are
//! newest-first for presentation; cluster and organization histories are
//! oldest-first for diffing.

use crate::snapshot::{ClusterIdentity, FlagSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// A stored report, as handed over by the storage layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: Uuid,
    pub bundle: String,
    pub identity: ClusterIdentity,
    #[serde(default)]
    pub cluster_name: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub snapshots: Vec<FlagSnapshot>,
}

/// Summary row for a related report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedReport {
    pub id: Uuid,
    pub bundle: String,
    pub cluster_name: Option<String>,
    pub cluster_uuid: Uuid,
    pub organization: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ReportRecord> for RelatedReport {
    fn from(record: &ReportRecord) -> Self {
        Self {
            id: record.id,
            bundle: record.bundle.clone(),
            cluster_name: record.cluster_name.clone(),
            cluster_uuid: record.identity.cluster_uuid,
            organization: record.identity.organization.clone(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedReports {
    pub same_cluster: Vec<RelatedReport>,
    // same organization, different cluster
    pub same_organization: Vec<RelatedReport>,
}

// newest first, id breaks ties so the order is total
fn newest_first(a: &&ReportRecord, b: &&ReportRecord) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
}

/// Reports related to `report`, excluding itself, each group capped at `limit`.
/// An empty organization relates nothing by organization.
pub fn related(report: &ReportRecord, all: &[ReportRecord], limit: usize) -> RelatedReports {
    let identity = &report.identity;
    let own_id = report.id;
    let others = || all.iter().filter(move |r| r.id != own_id);

    let mut same_cluster: Vec<&ReportRecord> = others()
        .filter(|r| r.identity.cluster_uuid == identity.cluster_uuid)
        .collect();

    let mut same_organization: Vec<&ReportRecord> = if identity.organization.is_empty() {
        Vec::new()
    } else {
        others()
            .filter(|r| {
                r.identity.organization == identity.organization
                    && r.identity.cluster_uuid != identity.cluster_uuid
            })
            .collect()
    };

    same_cluster.sort_by(newest_first);
    same_organization.sort_by(newest_first);

    RelatedReports {
        same_cluster: same_cluster.into_iter().take(limit).map(RelatedReport::from).collect(),
        same_organization: same_organization
            .into_iter()
            .take(limit)
            .map(RelatedReport::from)
            .collect(),
    }
}

/// Every record of the cluster, oldest first
pub fn cluster_history<'a>(identity: &ClusterIdentity, records: &'a [ReportRecord]) -> Vec<&'a ReportRecord> {
    let mut history: Vec<&ReportRecord> = records
        .iter()
        .filter(|r| r.identity.cluster_uuid == identity.cluster_uuid)
        .collect();
    history.sort_by(|a, b| newest_first(b, a));
    history
}

/// Records of the organization's other clusters, oldest first. Empty for an
/// empty organization.
pub fn organization_history<'a>(
    identity: &ClusterIdentity,
    records: &'a [ReportRecord],
) -> Vec<&'a ReportRecord> {
    if identity.organization.is_empty() {
        return Vec::new();
    }
    let mut history: Vec<&ReportRecord> = records
        .iter()
        .filter(|r| {
            r.identity.organization == identity.organization
                && r.identity.cluster_uuid != identity.cluster_uuid
        })
        .collect();
    history.sort_by(|a, b| newest_first(b, a));
    history
}

/// Snapshots of the cluster's history, ready for the drift engine
pub fn cluster_snapshots(identity: &ClusterIdentity, records: &[ReportRecord]) -> Vec<FlagSnapshot> {
    cluster_history(identity, records)
        .into_iter()
        .flat_map(|r| r.snapshots.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(cluster: Uuid, org: &str, day: u32) -> ReportRecord {
        ReportRecord {
            id: Uuid::new_v4(),
            bundle: format!("bundle-{}", day),
            identity: ClusterIdentity::new(cluster, org),
            cluster_name: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            snapshots: Vec::new(),
        }
    }

    #[test]
    fn test_empty_organization_relates_nothing() {
        let a = record(Uuid::new_v4(), "", 1);
        let b = record(Uuid::new_v4(), "", 2);
        let all = vec![a.clone(), b];
        let related = related(&a, &all, 20);
        assert!(related.same_cluster.is_empty());
        assert!(related.same_organization.is_empty());
    }

    #[test]
    fn test_history_oldest_first() {
        let cluster = Uuid::new_v4();
        let all = vec![record(cluster, "acme", 3), record(cluster, "acme", 1), record(Uuid::new_v4(), "acme", 2)];
        let history = cluster_history(&all[0].identity, &all);
        let days: Vec<_> = history.iter().map(|r| r.bundle.as_str()).collect();
        assert_eq!(days, vec!["bundle-1", "bundle-3"]);
    }

    #[test]
    fn test_organization_history_oldest_first() {
        let own = Uuid::new_v4();
        let all = vec![
            record(Uuid::new_v4(), "acme", 5),
            record(own, "acme", 4),
            record(Uuid::new_v4(), "acme", 2),
            record(Uuid::new_v4(), "globex", 1),
        ];
        let history = organization_history(&all[1].identity, &all);
        let bundles: Vec<_> = history.iter().map(|r| r.bundle.as_str()).collect();
        assert_eq!(bundles, vec!["bundle-2", "bundle-5"]);

        // same members as the presentation group, reversed
        let shown: Vec<_> = related(&all[1], &all, 20)
            .same_organization
            .into_iter()
            .map(|r| r.bundle)
            .collect();
        assert_eq!(shown, vec!["bundle-5", "bundle-2"]);

        assert!(organization_history(&ClusterIdentity::new(own, ""), &all).is_empty());
    }
}
