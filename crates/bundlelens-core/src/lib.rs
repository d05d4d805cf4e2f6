//! Core types for the bundle log pipeline
//! this crate contains the data structures shared by the extractor, the
//! aggregator and the analyzer.
pub mod extract;
pub mod histogram;
pub mod timestamp;

pub use extract::{classify, ExtractError, ExtractionRule, RuleError, RuleRegistry, RuleSet};
pub use histogram::{
    build_histogram, BucketFill, EventIndex, Filter, HistogramError, HistogramQuery,
    HistogramView, MeasurementStats, MessageStats, Scope,
};
pub use timestamp::{lines_from_text, LineClock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel used by filters and merged views meaning "every value of this dimension".
pub const ALL: &str = "all";

// LOG LINE (what the file reader hands us)

/// One raw line from one process on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub node: String,

    pub process_type: String,

    pub timestamp: DateTime<Utc>,

    pub raw_text: String,
}

impl LogLine {
    pub fn new(
        node: impl Into<String>,
        process_type: impl Into<String>,
        timestamp: DateTime<Utc>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            node: node.into(),
            process_type: process_type.into(),
            timestamp,
            raw_text: raw_text.into(),
        }
    }
}

// CLASSIFIED EVENT (after the extractor)

/// A line that matched an extraction rule.
/// Produced by the extractor, consumed by the aggregator, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub node: String,

    pub process_type: String,

    pub timestamp: DateTime<Utc>,

    pub signature: String, // normalized short message class

    #[serde(default)]
    pub measurement: Option<f64>, // duration (ms) or count, when the rule probes for one
}

// PROCESS KIND

/// Process roles found in a bundle, keyed by the names used in rule configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    TServer,
    Master,
    Postgres,
    Controller,
}

impl ProcessKind {
    /// Infer the process from a log file name, e.g. `yb-tserver.INFO.20240101-...`
    pub fn infer(file_name: &str) -> Option<Self> {
        let name = file_name.to_lowercase();
        if name.contains("postgres") {
            Some(Self::Postgres)
        } else if name.contains("tserver") {
            Some(Self::TServer)
        } else if name.contains("master") {
            Some(Self::Master)
        } else if name.contains("controller") || name.starts_with("ybc") {
            Some(Self::Controller)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TServer => "tserver",
            Self::Master => "master",
            Self::Postgres => "postgres",
            Self::Controller => "controller",
        }
    }
}

impl std::fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
