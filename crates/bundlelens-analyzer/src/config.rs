//! Configuration parsing for extraction rules and query limits

use crate::error::AnalyzerError;
use bundlelens_core::extract::{compile_rules, RuleSpec};
use bundlelens_core::histogram::DEFAULT_MAX_DENSE_BUCKETS;
use bundlelens_core::RuleRegistry;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

// Main config structure
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub histogram: HistogramSettings,

    #[serde(default)]
    pub related: RelatedSettings,

    // process type -> ordered rules
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessRules>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistogramSettings {
    // bucket sizes (minutes) a caller may ask for
    #[serde(default = "default_allowed_intervals")]
    pub allowed_intervals: Vec<u32>,

    // relative window ending at the latest observed event
    #[serde(default = "default_window_days")]
    pub default_window_days: u32,

    #[serde(default = "default_max_dense_buckets")]
    pub max_dense_buckets: usize,
}

impl Default for HistogramSettings {
    fn default() -> Self {
        Self {
            allowed_intervals: default_allowed_intervals(),
            default_window_days: default_window_days(),
            max_dense_buckets: default_max_dense_buckets(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelatedSettings {
    // cap per group (same cluster, same organization)
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for RelatedSettings {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRules {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

// a century; anything longer is a typo
pub const MAX_WINDOW_DAYS: u32 = 36_500;

// defaults helpers for serde
fn default_allowed_intervals() -> Vec<u32> {
    vec![1, 5, 15, 30, 60]
}

fn default_window_days() -> u32 {
    7
}

fn default_max_dense_buckets() -> usize {
    DEFAULT_MAX_DENSE_BUCKETS
}

fn default_max_results() -> usize {
    20
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), AnalyzerError> {
        let intervals = &self.histogram.allowed_intervals;
        if intervals.is_empty() {
            return Err(AnalyzerError::Invalid("histogram.allowed_intervals is empty".to_string()));
        }
        if intervals.contains(&0) {
            return Err(AnalyzerError::Invalid(
                "histogram.allowed_intervals must be positive".to_string(),
            ));
        }
        let days = self.histogram.default_window_days;
        if days == 0 || days > MAX_WINDOW_DAYS {
            return Err(AnalyzerError::Invalid(format!(
                "histogram.default_window_days must be between 1 and {} (got {})",
                MAX_WINDOW_DAYS, days
            )));
        }
        if self.histogram.max_dense_buckets == 0 {
            return Err(AnalyzerError::Invalid(
                "histogram.max_dense_buckets must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Compile every declared process type. A process type with an empty or
    /// malformed rule list fails the whole load.
    pub fn build_registry(&self) -> Result<RuleRegistry, AnalyzerError> {
        let mut registry = RuleRegistry::new();
        let mut total = 0;

        for (process_type, process) in &self.processes {
            let rules = compile_rules(&process.rules).map_err(|source| AnalyzerError::Rules {
                process_type: process_type.clone(),
                source,
            })?;
            total += rules.len();
            registry.register(process_type.clone(), rules);
        }

        info!(
            process_types = self.processes.len(),
            rules = total,
            "Extraction rules loaded"
        );
        Ok(registry)
    }
}

// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AnalyzerConfig, AnalyzerError> {
    let content = fs::read_to_string(path)?;
    let config: AnalyzerConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlelens_core::extract::{PredicateSpec, SignatureSpec};

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[histogram]
allowed_intervals = [1, 10]

[processes.tserver]
[[processes.tserver.rules]]
name = "slow_operation"
match = { type = "contains", text = "took a long time" }
signature = { type = "tokens_before", phrase = "took a long time", max_tokens = 2 }
fallback = { type = "fixed", name = "slow_operation" }
measurement = { type = "duration" }

[[processes.tserver.rules]]
name = "tablet_not_found"
match = { type = "regex", pattern = "tablet .* not found" }
signature = { type = "fixed", name = "tablet_not_found" }
"#;
        let config: AnalyzerConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.histogram.allowed_intervals, vec![1, 10]);
        assert_eq!(config.histogram.default_window_days, 7);
        assert_eq!(config.related.max_results, 20);

        let rules = &config.processes["tserver"].rules;
        assert_eq!(rules.len(), 2);
        assert!(matches!(rules[0].predicate, PredicateSpec::Contains { .. }));
        assert!(matches!(
            rules[0].signature,
            SignatureSpec::TokensBefore { min_tokens: 1, max_tokens: 2, .. }
        ));
        assert!(rules[1].measurement.is_none());

        let registry = config.build_registry().unwrap();
        assert_eq!(registry.process_types(), vec!["tserver"]);
    }

    #[test]
    fn test_empty_rule_list_fails_fast() {
        let config: AnalyzerConfig = toml::from_str("[processes.master]\nrules = []\n").unwrap();
        let err = config.build_registry().unwrap_err();
        assert!(matches!(err, AnalyzerError::Rules { ref process_type, .. } if process_type == "master"));
    }

    #[test]
    fn test_window_days_bounded() {
        let config: AnalyzerConfig =
            toml::from_str("[histogram]\ndefault_window_days = 4000000000\n").unwrap();
        assert!(matches!(config.validate(), Err(AnalyzerError::Invalid(_))));

        let config: AnalyzerConfig =
            toml::from_str("[histogram]\ndefault_window_days = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(AnalyzerError::Invalid(_))));

        let config: AnalyzerConfig =
            toml::from_str("[histogram]\ndefault_window_days = 36500\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config: AnalyzerConfig =
            toml::from_str("[histogram]\nallowed_intervals = [0, 5]\n").unwrap();
        assert!(matches!(config.validate(), Err(AnalyzerError::Invalid(_))));
    }
}
