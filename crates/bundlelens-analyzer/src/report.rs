//! Per-report event cache
//!
//! Each analysed report keeps one immutable `EventIndex`. Re-ingesting a report
//! swaps in a new index under a fresh generation, so a caller holding an older
//! generation can tell its results are stale.

use bundlelens_core::EventIndex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StoredReport {
    pub generation: u64,
    pub index: Arc<EventIndex>,
}

#[derive(Debug, Default)]
pub struct ReportStore {
    reports: RwLock<HashMap<String, StoredReport>>,
    next_generation: AtomicU64,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the index of a report and return its generation.
    pub fn insert(&self, report_id: &str, index: EventIndex) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let stored = StoredReport {
            generation,
            index: Arc::new(index),
        };

        let mut reports = self.reports.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = reports.insert(report_id.to_string(), stored).is_some();
        debug!(report = report_id, generation, replaced, "Report index stored");
        generation
    }

    pub fn get(&self, report_id: &str) -> Option<StoredReport> {
        let reports = self.reports.read().unwrap_or_else(PoisonError::into_inner);
        reports.get(report_id).cloned()
    }

    pub fn generation(&self, report_id: &str) -> Option<u64> {
        self.get(report_id).map(|r| r.generation)
    }

    /// Drop a cached report; the next query for it fails until it is re-analysed.
    pub fn invalidate(&self, report_id: &str) -> bool {
        let mut reports = self.reports.write().unwrap_or_else(PoisonError::into_inner);
        reports.remove(report_id).is_some()
    }

    pub fn report_ids(&self) -> Vec<String> {
        let reports = self.reports.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = reports.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.reports.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_bumps_generation() {
        let store = ReportStore::new();
        let first = store.insert("r1", EventIndex::default());
        let second = store.insert("r1", EventIndex::default());

        assert!(second > first);
        assert_eq!(store.generation("r1"), Some(second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalidate() {
        let store = ReportStore::new();
        store.insert("r1", EventIndex::default());
        assert!(store.invalidate("r1"));
        assert!(!store.invalidate("r1"));
        assert!(store.get("r1").is_none());
        assert!(store.is_empty());
    }
}
