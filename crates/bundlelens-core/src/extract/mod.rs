//! signature extraction - classify raw lines with ordered, per-process rule sets

pub mod measurement;
pub mod predicate;
pub mod signature;
pub mod spec;

pub use measurement::MeasurementExtractor;
pub use predicate::MatchPredicate;
pub use signature::SignatureSource;
pub use spec::{compile_rules, MeasurementSpec, PredicateSpec, RuleSpec, SignatureSpec};

use crate::{ClassifiedEvent, LogLine};
use std::collections::HashMap;
use thiserror::Error;

// errors raised while building rules
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule set is empty")]
    EmptyRuleSet,

    #[error("rule '{rule}': invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule '{rule}': {reason}")]
    Invalid { rule: String, reason: String },
}

// errors raised while classifying
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no extraction rules registered for process type '{0}'")]
    NoRules(String),
}

// One rule: predicate claims the line, signature names it, measurement is optional
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    name: String,
    predicate: MatchPredicate,
    signature: SignatureSource,
    fallback: Option<SignatureSource>,
    measurement: Option<MeasurementExtractor>,
}

impl ExtractionRule {
    pub fn new(name: impl Into<String>, predicate: MatchPredicate, signature: SignatureSource) -> Self {
        Self {
            name: name.into(),
            predicate,
            signature,
            fallback: None,
            measurement: None,
        }
    }

    pub fn with_fallback(mut self, fallback: SignatureSource) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_measurement(mut self, measurement: MeasurementExtractor) -> Self {
        self.measurement = Some(measurement);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn predicate(&self) -> &MatchPredicate {
        &self.predicate
    }
}

// Ordered, non-empty list of rules for one process type
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<ExtractionRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ExtractionRule>) -> Result<Self, RuleError> {
        if rules.is_empty() {
            return Err(RuleError::EmptyRuleSet);
        }
        Ok(Self { rules })
    }

    /// Ad-hoc rule set: each regex claims its lines and is its own signature.
    /// Blank entries are ignored.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, RuleError> {
        let rules = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(|pattern| -> Result<ExtractionRule, RuleError> {
                let predicate =
                    MatchPredicate::regex(pattern).map_err(|source| RuleError::InvalidPattern {
                        rule: pattern.to_string(),
                        source,
                    })?;
                Ok(ExtractionRule::new(pattern, predicate, SignatureSource::fixed(pattern)))
            })
            .collect::<Result<Vec<_>, RuleError>>()?;
        Self::new(rules)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractionRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Classify one line. The first rule whose predicate matches claims the line;
/// if neither its signature nor its fallback captures, the line yields nothing.
pub fn classify(line: &LogLine, rules: &RuleSet) -> Option<ClassifiedEvent> {
    let text = line.raw_text.as_str();

    for rule in rules.iter() {
        let Some(anchor) = rule.predicate.locate(text) else {
            continue;
        };

        let signature = rule
            .signature
            .extract(text)
            .or_else(|| rule.fallback.as_ref().and_then(|f| f.extract(text)))?;

        let measurement = rule
            .measurement
            .as_ref()
            .and_then(|m| m.extract(text, anchor));

        return Some(ClassifiedEvent {
            node: line.node.clone(),
            process_type: line.process_type.clone(),
            timestamp: line.timestamp,
            signature,
            measurement,
        });
    }
    None
}

// Result of classifying a batch of lines
#[derive(Debug, Clone, Default)]
pub struct Classified {
    pub events: Vec<ClassifiedEvent>,
    pub dropped: usize, // lines no rule could classify
}

// Registry to hold the rule set of every process type

#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rule_sets: HashMap<String, RuleSet>,
    // applies to every process type, registered or not
    shared: Option<RuleSet>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            rule_sets: HashMap::new(),
            shared: None,
        }
    }

    /// One rule set for every process type, e.g. patterns given for a single run
    pub fn uniform(rules: RuleSet) -> Self {
        Self {
            rule_sets: HashMap::new(),
            shared: Some(rules),
        }
    }

    // register (or replace) the rules for a process type
    pub fn register(&mut self, process_type: impl Into<String>, rules: RuleSet) {
        self.rule_sets.insert(process_type.into(), rules);
    }

    // Get rules by process type
    pub fn get(&self, process_type: &str) -> Option<&RuleSet> {
        self.shared.as_ref().or_else(|| self.rule_sets.get(process_type))
    }

    /// Rules for a declared process type, or a configuration error.
    pub fn require(&self, process_type: &str) -> Result<&RuleSet, ExtractError> {
        self.get(process_type)
            .ok_or_else(|| ExtractError::NoRules(process_type.to_string()))
    }

    pub fn process_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.rule_sets.keys().map(|k| k.as_str()).collect();
        types.sort_unstable();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.rule_sets.is_empty() && self.shared.is_none()
    }

    // classify using the rules of the line's process type
    pub fn classify(&self, line: &LogLine) -> Result<Option<ClassifiedEvent>, ExtractError> {
        Ok(classify(line, self.require(&line.process_type)?))
    }

    /// Classify lines in order. Unmatched lines are counted and dropped;
    /// a line whose process type has no rules aborts the batch.
    pub fn classify_batch(&self, lines: &[LogLine]) -> Result<Classified, ExtractError> {
        let mut out = Classified::default();
        for line in lines {
            match self.classify(line)? {
                Some(event) => out.events.push(event),
                None => out.dropped += 1,
            }
        }
        Ok(out)
    }
}
