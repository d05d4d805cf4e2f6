use bundlelens_core::{HistogramError, RuleError};
use bundlelens_drift::DriftError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid rules for process type '{process_type}': {source}")]
    Rules {
        process_type: String,
        #[source]
        source: RuleError,
    },

    #[error("invalid ad-hoc patterns: {0}")]
    Patterns(#[source] RuleError),

    // a report references a process type with no rule set
    #[error("report '{report}': no extraction rules configured for process type '{process_type}'")]
    Config {
        report: String,
        process_type: String,
    },

    #[error("unknown report '{0}'")]
    UnknownReport(String),

    #[error("interval {interval} is not allowed (allowed: {allowed:?})")]
    IntervalNotAllowed { interval: u32, allowed: Vec<u32> },

    #[error(transparent)]
    Histogram(#[from] HistogramError),

    #[error(transparent)]
    Drift(#[from] DriftError),

    #[error("classification worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
