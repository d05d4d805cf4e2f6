// Structural match predicates: does a rule claim this line?

use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
pub enum MatchPredicate {
    // plain substring; `needle` is stored lowercased when ignore_case is set
    Contains { needle: String, ignore_case: bool },
    // regex search, compiled case-insensitive
    Pattern(Regex),
}

impl MatchPredicate {
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains {
            needle: text.into(),
            ignore_case: false,
        }
    }

    /// ASCII case folding only, so byte offsets stay valid on the original line.
    pub fn contains_ignore_case(text: &str) -> Self {
        Self::Contains {
            needle: text.to_ascii_lowercase(),
            ignore_case: true,
        }
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        let re = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self::Pattern(re))
    }

    pub fn matches(&self, line: &str) -> bool {
        self.locate(line).is_some()
    }

    /// Byte offset just past the matched text, used to anchor value probing.
    pub fn locate(&self, line: &str) -> Option<usize> {
        match self {
            Self::Contains { needle, ignore_case: false } => {
                line.find(needle.as_str()).map(|at| at + needle.len())
            }
            Self::Contains { needle, ignore_case: true } => line
                .to_ascii_lowercase()
                .find(needle.as_str())
                .map(|at| at + needle.len()),
            Self::Pattern(re) => re.find(line).map(|m| m.end()),
        }
    }
}
