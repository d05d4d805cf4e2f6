//! Bundle analysis: rule configuration, per-report event cache and the query surface

pub mod config;
pub mod error;
pub mod report;
pub mod runner;

pub use config::{load_config, AnalyzerConfig};
pub use error::AnalyzerError;
pub use report::ReportStore;
pub use runner::{AnalysisRunner, AnalysisSummary, HistogramRequest, LogSource};
