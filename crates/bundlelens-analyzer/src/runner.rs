use crate::config::{load_config, AnalyzerConfig};
use crate::error::AnalyzerError;
use crate::report::ReportStore;
use bundlelens_core::{
    lines_from_text, EventIndex, ExtractError, Filter, HistogramQuery, HistogramView, LineClock,
    LogLine, RuleRegistry, RuleSet,
};
use bundlelens_drift::{cluster_snapshots, compute_drift, related, DriftReport, RelatedReports, ReportRecord};
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lines of one process on one node, in original order
#[derive(Debug, Clone)]
pub struct LogSource {
    pub node: String,
    pub process_type: String,
    pub lines: Vec<LogLine>,
}

impl LogSource {
    pub fn from_text(node: &str, process_type: &str, text: &str, clock: &mut LineClock) -> Self {
        Self {
            node: node.to_string(),
            process_type: process_type.to_string(),
            lines: lines_from_text(node, process_type, text, clock),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub report_id: String,
    pub generation: u64,
    pub lines: usize,
    pub events: usize,
    pub dropped: usize,
    pub events_per_process: BTreeMap<String, usize>,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

/// Histogram query as received from a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramRequest {
    pub interval_minutes: u32,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub node: Option<String>, // "all" or absent means every node
    #[serde(default)]
    pub process_type: Option<String>,
    #[serde(default)]
    pub merge_nodes: bool,
    #[serde(default)]
    pub merge_process_types: bool,
    #[serde(default)]
    pub sparse: bool,
}

impl Default for HistogramRequest {
    fn default() -> Self {
        Self {
            interval_minutes: 1,
            start: None,
            end: None,
            node: None,
            process_type: None,
            merge_nodes: false,
            merge_process_types: false,
            sparse: false,
        }
    }
}

impl HistogramRequest {
    fn to_query(&self, max_dense_buckets: usize) -> HistogramQuery {
        let mut query = HistogramQuery::new(self.interval_minutes)
            .with_range(self.start, self.end)
            .with_node(Filter::from_param(self.node.as_deref()))
            .with_process_type(Filter::from_param(self.process_type.as_deref()))
            .with_max_dense_buckets(max_dense_buckets);
        if self.merge_nodes {
            query = query.merge_nodes();
        }
        if self.merge_process_types {
            query = query.merge_process_types();
        }
        if self.sparse {
            query = query.sparse();
        }
        query
    }
}

// main runner: classification on ingest, histogram/drift/related on query

pub struct AnalysisRunner {
    config: AnalyzerConfig,
    registry: Arc<RuleRegistry>,
    store: ReportStore,
}

impl AnalysisRunner {
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalyzerError> {
        config.validate()?;
        let registry = config.build_registry()?;
        Ok(Self {
            config,
            registry: Arc::new(registry),
            store: ReportStore::new(),
        })
    }

    /// Runner whose rules are the given regexes, for every process type. The
    /// configured catalogue is ignored; query settings still come from `config`.
    pub fn with_patterns<S: AsRef<str>>(
        config: AnalyzerConfig,
        patterns: &[S],
    ) -> Result<Self, AnalyzerError> {
        config.validate()?;
        let rules = RuleSet::from_patterns(patterns).map_err(AnalyzerError::Patterns)?;
        info!(patterns = rules.len(), "Ad-hoc patterns replace configured rules");
        Ok(Self {
            config,
            registry: Arc::new(RuleRegistry::uniform(rules)),
            store: ReportStore::new(),
        })
    }

    // create a new runner from config file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, AnalyzerError> {
        Self::new(load_config(path)?)
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Classify every source and store the report's event index, replacing any
    /// previous analysis. Sources are classified in parallel; each keeps its
    /// own line order. Fails before any work if a source's process type has no
    /// rules.
    pub async fn analyze(
        &self,
        report_id: &str,
        sources: Vec<LogSource>,
    ) -> Result<AnalysisSummary, AnalyzerError> {
        if let Some(missing) = sources
            .iter()
            .find(|s| self.registry.get(&s.process_type).is_none())
        {
            return Err(AnalyzerError::Config {
                report: report_id.to_string(),
                process_type: missing.process_type.clone(),
            });
        }

        let workers = sources.into_iter().map(|source| {
            let registry = Arc::clone(&self.registry);
            tokio::task::spawn_blocking(move || {
                let classified = registry.classify_batch(&source.lines);
                (source, classified)
            })
        });

        let mut summary = AnalysisSummary {
            report_id: report_id.to_string(),
            ..AnalysisSummary::default()
        };
        let mut events = Vec::new();

        for joined in join_all(workers).await {
            let (source, classified) = joined?;
            let classified = classified.map_err(|e| match e {
                ExtractError::NoRules(process_type) => AnalyzerError::Config {
                    report: report_id.to_string(),
                    process_type,
                },
            })?;

            debug!(
                node = %source.node,
                process_type = %source.process_type,
                lines = source.lines.len(),
                classified = classified.events.len(),
                "Source classified"
            );
            summary.lines += source.lines.len();
            summary.dropped += classified.dropped;
            *summary
                .events_per_process
                .entry(source.process_type)
                .or_default() += classified.events.len();
            events.extend(classified.events);
        }

        if summary.dropped > 0 {
            warn!(report = report_id, dropped = summary.dropped, "Lines matched no extraction rule");
        }

        let index = EventIndex::new(events);
        summary.events = index.len();
        summary.earliest = index.earliest();
        summary.latest = index.latest();
        summary.generation = self.store.insert(report_id, index);

        info!(
            report = report_id,
            generation = summary.generation,
            lines = summary.lines,
            events = summary.events,
            "Report analysed"
        );
        Ok(summary)
    }

    pub fn histogram(
        &self,
        report_id: &str,
        request: &HistogramRequest,
    ) -> Result<HistogramView, AnalyzerError> {
        let settings = &self.config.histogram;
        if !settings.allowed_intervals.contains(&request.interval_minutes) {
            warn!(interval = request.interval_minutes, "Histogram interval not allowed");
            return Err(AnalyzerError::IntervalNotAllowed {
                interval: request.interval_minutes,
                allowed: settings.allowed_intervals.clone(),
            });
        }

        let stored = self
            .store
            .get(report_id)
            .ok_or_else(|| AnalyzerError::UnknownReport(report_id.to_string()))?;
        let view = stored
            .index
            .histogram(&request.to_query(settings.max_dense_buckets))?;

        info!(
            report = report_id,
            interval = request.interval_minutes,
            node = ?request.node,
            process_type = ?request.process_type,
            nodes = view.len(),
            "Histogram request"
        );
        Ok(view)
    }

    /// Latest observed event, `None` when the report classified nothing
    pub fn latest_timestamp(&self, report_id: &str) -> Result<Option<DateTime<Utc>>, AnalyzerError> {
        self.store
            .get(report_id)
            .map(|stored| stored.index.latest())
            .ok_or_else(|| AnalyzerError::UnknownReport(report_id.to_string()))
    }

    /// `[latest - default_window_days, latest]`
    pub fn default_window(
        &self,
        report_id: &str,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, AnalyzerError> {
        let days = i64::from(self.config.histogram.default_window_days);
        let Some(latest) = self.latest_timestamp(report_id)? else {
            return Ok(None);
        };
        let start = latest
            .checked_sub_signed(Duration::days(days))
            .ok_or_else(|| {
                AnalyzerError::Invalid(format!(
                    "default window of {} days reaches before the earliest representable time",
                    days
                ))
            })?;
        Ok(Some((start, latest)))
    }

    pub fn related(
        &self,
        report_id: Uuid,
        records: &[ReportRecord],
    ) -> Result<RelatedReports, AnalyzerError> {
        let report = find_record(report_id, records)?;
        let related = related(report, records, self.config.related.max_results);
        info!(
            report = %report_id,
            same_cluster = related.same_cluster.len(),
            same_organization = related.same_organization.len(),
            "Related reports"
        );
        Ok(related)
    }

    /// Drift over the report's whole cluster history, the report included.
    pub fn drift(&self, report_id: Uuid, records: &[ReportRecord]) -> Result<DriftReport, AnalyzerError> {
        let report = find_record(report_id, records)?;
        let snapshots = cluster_snapshots(&report.identity, records);
        let count = snapshots.len();
        let drift = compute_drift(snapshots)?;
        info!(
            report = %report_id,
            cluster = %report.identity.cluster_uuid,
            snapshots = count,
            lineages = drift.lineages.len(),
            "Drift computed"
        );
        Ok(drift)
    }
}

fn find_record(report_id: Uuid, records: &[ReportRecord]) -> Result<&ReportRecord, AnalyzerError> {
    records
        .iter()
        .find(|r| r.id == report_id)
        .ok_or_else(|| AnalyzerError::UnknownReport(report_id.to_string()))
}
