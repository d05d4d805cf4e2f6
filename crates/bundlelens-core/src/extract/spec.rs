// Declarative rule definitions as they appear in the TOML config

use super::{
    ExtractionRule, MatchPredicate, MeasurementExtractor, RuleError, RuleSet, SignatureSource,
};
use serde::{Deserialize, Serialize};

// A single extraction rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    // unique name for this rule (also the default signature)
    pub name: String,

    // structural predicate deciding whether the rule claims a line
    #[serde(rename = "match")]
    pub predicate: PredicateSpec,

    pub signature: SignatureSpec,

    // tried when the primary signature captures nothing
    #[serde(default)]
    pub fallback: Option<SignatureSpec>,

    #[serde(default)]
    pub measurement: Option<MeasurementSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredicateSpec {
    Contains {
        text: String,
        #[serde(default)]
        ignore_case: bool,
    },
    Regex {
        pattern: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignatureSpec {
    Fixed {
        name: String,
    },
    Capture {
        pattern: String,
    },
    TokensBefore {
        phrase: String,
        #[serde(default = "default_min_tokens")]
        min_tokens: usize,
        #[serde(default = "default_max_tokens")]
        max_tokens: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeasurementSpec {
    Duration,
    Count,
    Regex { pattern: String },
}

fn default_min_tokens() -> usize {
    1
}

fn default_max_tokens() -> usize {
    2
}

impl RuleSpec {
    pub fn compile(&self) -> Result<ExtractionRule, RuleError> {
        if self.name.trim().is_empty() {
            return Err(RuleError::Invalid {
                rule: self.name.clone(),
                reason: "rule name is empty".to_string(),
            });
        }

        let predicate = match &self.predicate {
            PredicateSpec::Contains { text, .. } if text.is_empty() => {
                return Err(self.invalid("contains predicate has empty text"));
            }
            PredicateSpec::Contains { text, ignore_case: false } => MatchPredicate::contains(text),
            PredicateSpec::Contains { text, ignore_case: true } => {
                MatchPredicate::contains_ignore_case(text)
            }
            PredicateSpec::Regex { pattern } => {
                MatchPredicate::regex(pattern).map_err(|e| self.bad_pattern(e))?
            }
        };

        let signature = self.compile_signature(&self.signature)?;
        let fallback = match &self.fallback {
            Some(spec) => Some(self.compile_signature(spec)?),
            None => None,
        };

        let measurement = match &self.measurement {
            None => None,
            Some(MeasurementSpec::Duration) => Some(MeasurementExtractor::duration()),
            Some(MeasurementSpec::Count) => Some(MeasurementExtractor::count()),
            Some(MeasurementSpec::Regex { pattern }) => {
                Some(MeasurementExtractor::pattern(pattern).map_err(|e| self.bad_pattern(e))?)
            }
        };

        let mut rule = ExtractionRule::new(&self.name, predicate, signature);
        if let Some(fallback) = fallback {
            rule = rule.with_fallback(fallback);
        }
        if let Some(measurement) = measurement {
            rule = rule.with_measurement(measurement);
        }
        Ok(rule)
    }

    fn compile_signature(&self, spec: &SignatureSpec) -> Result<SignatureSource, RuleError> {
        match spec {
            SignatureSpec::Fixed { name } if name.trim().is_empty() => {
                Err(self.invalid("fixed signature is empty"))
            }
            SignatureSpec::Fixed { name } => Ok(SignatureSource::fixed(name.trim())),
            SignatureSpec::Capture { pattern } => {
                SignatureSource::capture(pattern).map_err(|e| self.bad_pattern(e))
            }
            SignatureSpec::TokensBefore { phrase, .. } if phrase.is_empty() => {
                Err(self.invalid("tokens_before phrase is empty"))
            }
            SignatureSpec::TokensBefore {
                min_tokens,
                max_tokens,
                ..
            } if *min_tokens == 0 || min_tokens > max_tokens => Err(self.invalid(&format!(
                "tokens_before needs 1 <= min_tokens <= max_tokens (got {}..{})",
                min_tokens, max_tokens
            ))),
            SignatureSpec::TokensBefore {
                phrase,
                min_tokens,
                max_tokens,
            } => Ok(SignatureSource::tokens_before(phrase, *min_tokens, *max_tokens)),
        }
    }

    fn invalid(&self, reason: &str) -> RuleError {
        RuleError::Invalid {
            rule: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn bad_pattern(&self, source: regex::Error) -> RuleError {
        RuleError::InvalidPattern {
            rule: self.name.clone(),
            source,
        }
    }
}

/// Compile an ordered list of specs; an empty list is a configuration error.
pub fn compile_rules(specs: &[RuleSpec]) -> Result<RuleSet, RuleError> {
    let rules = specs
        .iter()
        .map(RuleSpec::compile)
        .collect::<Result<Vec<_>, _>>()?;
    RuleSet::new(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(signature: SignatureSpec) -> RuleSpec {
        RuleSpec {
            name: "slow_op".to_string(),
            predicate: PredicateSpec::Contains {
                text: "took a long time".to_string(),
                ignore_case: false,
            },
            signature,
            fallback: None,
            measurement: Some(MeasurementSpec::Duration),
        }
    }

    #[test]
    fn test_compile_tokens_before() {
        let rule = spec(SignatureSpec::TokensBefore {
            phrase: "took a long time".to_string(),
            min_tokens: 1,
            max_tokens: 2,
        })
        .compile()
        .unwrap();
        assert_eq!(rule.name(), "slow_op");
    }

    #[test]
    fn test_reject_bad_token_bounds() {
        let err = spec(SignatureSpec::TokensBefore {
            phrase: "took a long time".to_string(),
            min_tokens: 3,
            max_tokens: 2,
        })
        .compile()
        .unwrap_err();
        assert!(matches!(err, RuleError::Invalid { ref rule, .. } if rule == "slow_op"));
    }

    #[test]
    fn test_reject_invalid_regex() {
        let err = spec(SignatureSpec::Capture {
            pattern: "(oops".to_string(),
        })
        .compile()
        .unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { .. }));
    }

    #[test]
    fn test_empty_rule_list() {
        assert!(matches!(compile_rules(&[]), Err(RuleError::EmptyRuleSet)));
    }
}
