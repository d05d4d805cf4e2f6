//! Bucketed aggregation of classified events
//! histograms are views computed per query over an immutable, time-sorted index,
//! so any interval/range combination can be asked for after ingestion.

use crate::{ClassifiedEvent, ALL};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const DEFAULT_MAX_DENSE_BUCKETS: usize = 100_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistogramError {
    #[error("interval must be at least one minute")]
    ZeroInterval,

    #[error("range start {start} is after range end {end}")]
    InvertedRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("dense histogram would need {requested} buckets (limit {limit})")]
    TooManyBuckets { requested: u64, limit: usize },
}

// QUERY //

/// Node or process type filter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    #[default]
    All,
    Only(String),
}

impl Filter {
    /// Query parameter form: missing, empty or "all" means no filtering.
    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(str::trim) {
            None | Some("") => Self::All,
            Some(v) if v.eq_ignore_ascii_case(ALL) => Self::All,
            Some(v) => Self::Only(v.to_string()),
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == value,
        }
    }
}

/// Whether a dimension keeps one entry per value or is merged under "all"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Split,
    Merged,
}

impl Scope {
    fn key<'a>(&self, value: &'a str) -> &'a str {
        match self {
            Self::Split => value,
            Self::Merged => ALL,
        }
    }
}

/// Dense: every bucket of the range, zero-filled. Sparse: only non-empty buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketFill {
    #[default]
    Dense,
    Sparse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramQuery {
    pub interval_minutes: u32,
    pub range_start: Option<DateTime<Utc>>, // defaults to earliest filtered event
    pub range_end: Option<DateTime<Utc>>,   // defaults to latest filtered event
    pub node: Filter,
    pub process_type: Filter,
    pub node_scope: Scope,
    pub process_scope: Scope,
    pub fill: BucketFill,
    pub max_dense_buckets: usize,
}

impl HistogramQuery {
    pub fn new(interval_minutes: u32) -> Self {
        Self {
            interval_minutes,
            range_start: None,
            range_end: None,
            node: Filter::All,
            process_type: Filter::All,
            node_scope: Scope::Split,
            process_scope: Scope::Split,
            fill: BucketFill::Dense,
            max_dense_buckets: DEFAULT_MAX_DENSE_BUCKETS,
        }
    }

    pub fn with_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.range_start = start;
        self.range_end = end;
        self
    }

    pub fn with_node(mut self, node: Filter) -> Self {
        self.node = node;
        self
    }

    pub fn with_process_type(mut self, process_type: Filter) -> Self {
        self.process_type = process_type;
        self
    }

    pub fn merge_nodes(mut self) -> Self {
        self.node_scope = Scope::Merged;
        self
    }

    pub fn merge_process_types(mut self) -> Self {
        self.process_scope = Scope::Merged;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.fill = BucketFill::Sparse;
        self
    }

    pub fn with_max_dense_buckets(mut self, limit: usize) -> Self {
        self.max_dense_buckets = limit;
        self
    }
}

// RESULT //

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementStats {
    pub samples: u64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Stats for one (node, process type, signature) over the queried range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStats {
    pub histogram: BTreeMap<DateTime<Utc>, u64>, // bucket start -> count
    pub first_occurrence: DateTime<Utc>,
    pub last_occurrence: DateTime<Utc>,
    pub total_count: u64,

    // absent when no event of this signature carried a measurement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<MeasurementStats>,
}

impl MessageStats {
    pub fn avg_measurement(&self) -> Option<f64> {
        self.measurement.map(|m| m.avg)
    }

    pub fn min_measurement(&self) -> Option<f64> {
        self.measurement.map(|m| m.min)
    }

    pub fn max_measurement(&self) -> Option<f64> {
        self.measurement.map(|m| m.max)
    }
}

/// node -> process type -> signature -> stats
pub type HistogramView = BTreeMap<String, BTreeMap<String, BTreeMap<String, MessageStats>>>;

// running totals for one output key
struct Accumulator {
    buckets: BTreeMap<u64, u64>,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    count: u64,
    samples: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn new(first: DateTime<Utc>) -> Self {
        Self {
            buckets: BTreeMap::new(),
            first,
            last: first,
            count: 0,
            samples: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn add(&mut self, bucket: u64, event: &ClassifiedEvent) {
        *self.buckets.entry(bucket).or_insert(0) += 1;
        self.count += 1;
        self.first = self.first.min(event.timestamp);
        self.last = self.last.max(event.timestamp);

        if let Some(value) = event.measurement.filter(|v| v.is_finite()) {
            self.samples += 1;
            self.sum += value;
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
    }

    fn finish(self, histogram: BTreeMap<DateTime<Utc>, u64>) -> MessageStats {
        let measurement = (self.samples > 0).then(|| MeasurementStats {
            samples: self.samples,
            avg: self.sum / self.samples as f64,
            min: self.min,
            max: self.max,
        });
        MessageStats {
            histogram,
            first_occurrence: self.first,
            last_occurrence: self.last,
            total_count: self.count,
            measurement,
        }
    }
}

// EVENT INDEX //

/// Classified events of one report, grouped per (node, process type) and
/// sorted by time. Sorting is stable, so per-node arrival order breaks ties.
#[derive(Debug, Clone, Default)]
pub struct EventIndex {
    series: BTreeMap<(String, String), Vec<ClassifiedEvent>>,
    len: usize,
}

impl EventIndex {
    pub fn new(events: impl IntoIterator<Item = ClassifiedEvent>) -> Self {
        let mut series: BTreeMap<(String, String), Vec<ClassifiedEvent>> = BTreeMap::new();
        let mut len = 0;
        for event in events {
            len += 1;
            series
                .entry((event.node.clone(), event.process_type.clone()))
                .or_default()
                .push(event);
        }
        for events in series.values_mut() {
            events.sort_by_key(|e| e.timestamp);
        }
        Self { series, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.series
            .values()
            .filter_map(|events| events.first())
            .map(|e| e.timestamp)
            .min()
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.series
            .values()
            .filter_map(|events| events.last())
            .map(|e| e.timestamp)
            .max()
    }

    pub fn nodes(&self) -> Vec<&str> {
        let mut nodes: Vec<&str> = self.series.keys().map(|(node, _)| node.as_str()).collect();
        nodes.dedup();
        nodes
    }

    pub fn process_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.series.keys().map(|(_, p)| p.as_str()).collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    pub fn events(&self) -> impl Iterator<Item = &ClassifiedEvent> {
        self.series.values().flatten()
    }

    /// Compute the histogram view for a query.
    pub fn histogram(&self, query: &HistogramQuery) -> Result<HistogramView, HistogramError> {
        if query.interval_minutes == 0 {
            return Err(HistogramError::ZeroInterval);
        }
        if let (Some(start), Some(end)) = (query.range_start, query.range_end) {
            if start > end {
                return Err(HistogramError::InvertedRange { start, end });
            }
        }

        let selected: Vec<&[ClassifiedEvent]> = self
            .series
            .iter()
            .filter(|((node, process), _)| {
                query.node.accepts(node) && query.process_type.accepts(process)
            })
            .map(|(_, events)| events.as_slice())
            .filter(|events| !events.is_empty())
            .collect();

        let start = query
            .range_start
            .or_else(|| selected.iter().map(|s| s[0].timestamp).min());
        let end = query
            .range_end
            .or_else(|| selected.iter().map(|s| s[s.len() - 1].timestamp).max());

        let (Some(start), Some(end)) = (start, end) else {
            return Ok(HistogramView::new());
        };
        if start > end {
            // only one bound was given and it lies beyond the data
            return Ok(HistogramView::new());
        }

        let interval_ms = i64::from(query.interval_minutes) * 60_000;
        let bucket_count = ((end - start).num_milliseconds() / interval_ms) as u64 + 1;
        if query.fill == BucketFill::Dense && bucket_count > query.max_dense_buckets as u64 {
            return Err(HistogramError::TooManyBuckets {
                requested: bucket_count,
                limit: query.max_dense_buckets,
            });
        }

        let mut totals: BTreeMap<(String, String, String), Accumulator> = BTreeMap::new();
        for events in selected {
            let lo = events.partition_point(|e| e.timestamp < start);
            let hi = events.partition_point(|e| e.timestamp <= end);

            for event in &events[lo..hi] {
                let bucket = ((event.timestamp - start).num_milliseconds() / interval_ms) as u64;
                let key = (
                    query.node_scope.key(&event.node).to_string(),
                    query.process_scope.key(&event.process_type).to_string(),
                    event.signature.clone(),
                );
                totals
                    .entry(key)
                    .or_insert_with(|| Accumulator::new(event.timestamp))
                    .add(bucket, event);
            }
        }

        let boundary = |i: u64| start + Duration::milliseconds(i as i64 * interval_ms);
        let mut view = HistogramView::new();
        for ((node, process, signature), acc) in totals {
            let histogram = match query.fill {
                BucketFill::Dense => (0..bucket_count)
                    .map(|i| (boundary(i), acc.buckets.get(&i).copied().unwrap_or(0)))
                    .collect(),
                BucketFill::Sparse => acc
                    .buckets
                    .iter()
                    .map(|(&i, &count)| (boundary(i), count))
                    .collect(),
            };
            view.entry(node)
                .or_default()
                .entry(process)
                .or_default()
                .insert(signature, acc.finish(histogram));
        }

        tracing::debug!(
            interval = query.interval_minutes,
            %start,
            %end,
            buckets = bucket_count,
            nodes = view.len(),
            "Histogram computed"
        );
        Ok(view)
    }
}

/// One-shot form over a plain event slice.
pub fn build_histogram(
    events: &[ClassifiedEvent],
    query: &HistogramQuery,
) -> Result<HistogramView, HistogramError> {
    EventIndex::new(events.iter().cloned()).histogram(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, second).unwrap()
    }

    fn event(node: &str, minute: u32, second: u32) -> ClassifiedEvent {
        ClassifiedEvent {
            node: node.to_string(),
            process_type: "tserver".to_string(),
            timestamp: at(minute, second),
            signature: "flush".to_string(),
            measurement: None,
        }
    }

    #[test]
    fn test_filter_from_param() {
        assert_eq!(Filter::from_param(None), Filter::All);
        assert_eq!(Filter::from_param(Some("ALL")), Filter::All);
        assert_eq!(Filter::from_param(Some("n1")), Filter::Only("n1".to_string()));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let err = build_histogram(&[event("n1", 0, 0)], &HistogramQuery::new(0)).unwrap_err();
        assert_eq!(err, HistogramError::ZeroInterval);
    }

    #[test]
    fn test_inverted_explicit_range_is_rejected() {
        let q = HistogramQuery::new(1).with_range(Some(at(5, 0)), Some(at(1, 0)));
        assert!(matches!(
            build_histogram(&[event("n1", 0, 0)], &q),
            Err(HistogramError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_start_beyond_data_is_empty() {
        let q = HistogramQuery::new(1).with_range(Some(at(30, 0)), None);
        assert!(build_histogram(&[event("n1", 0, 0)], &q).unwrap().is_empty());
    }

    #[test]
    fn test_dense_bucket_limit() {
        let events = [event("n1", 0, 0), event("n1", 59, 0)];
        let q = HistogramQuery::new(1).with_max_dense_buckets(10);
        assert_eq!(
            build_histogram(&events, &q).unwrap_err(),
            HistogramError::TooManyBuckets {
                requested: 60,
                limit: 10
            }
        );
        // sparse form is not bounded by the dense limit
        assert!(build_histogram(&events, &q.sparse()).is_ok());
    }

    #[test]
    fn test_index_bounds() {
        let index = EventIndex::new(vec![event("n2", 3, 0), event("n1", 1, 0), event("n1", 7, 0)]);
        assert_eq!(index.len(), 3);
        assert_eq!(index.earliest(), Some(at(1, 0)));
        assert_eq!(index.latest(), Some(at(7, 0)));
        assert_eq!(index.nodes(), vec!["n1", "n2"]);
        assert_eq!(index.process_types(), vec!["tserver"]);
    }
}
