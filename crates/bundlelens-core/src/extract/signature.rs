// Signature templates: turn a claimed line into a short message class

use regex::Regex;

#[derive(Debug, Clone)]
pub enum SignatureSource {
    // constant signature, usually the rule name
    Fixed(String),
    // named group `sig`, else group 1, else the whole match
    Capture(Regex),
    // word tokens immediately preceding a fixed phrase
    TokensBefore {
        phrase: String,
        min_tokens: usize,
        max_tokens: usize,
    },
}

impl SignatureSource {
    pub fn fixed(name: impl Into<String>) -> Self {
        Self::Fixed(name.into())
    }

    pub fn capture(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Capture(Regex::new(pattern)?))
    }

    pub fn tokens_before(phrase: impl Into<String>, min_tokens: usize, max_tokens: usize) -> Self {
        Self::TokensBefore {
            phrase: phrase.into(),
            min_tokens,
            max_tokens,
        }
    }

    /// Extract a trimmed, non-empty signature, or None when the template does not capture.
    pub fn extract(&self, text: &str) -> Option<String> {
        let raw = match self {
            Self::Fixed(name) => name.as_str(),
            Self::Capture(re) => {
                let caps = re.captures(text)?;
                caps.name("sig")
                    .or_else(|| caps.get(1))
                    .or_else(|| caps.get(0))?
                    .as_str()
            }
            Self::TokensBefore {
                phrase,
                min_tokens,
                max_tokens,
            } => tokens_before(text, phrase, *min_tokens, *max_tokens)?,
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

// Walk backwards from the phrase collecting word tokens; the result is the
// original slice so inner spacing is preserved. The phrase is found with ASCII
// case folding, the same folding the predicates use.
fn tokens_before<'a>(text: &'a str, phrase: &str, min: usize, max: usize) -> Option<&'a str> {
    let at = text
        .to_ascii_lowercase()
        .find(&phrase.to_ascii_lowercase())?;
    let prefix = &text[..at];

    let spans = token_spans(prefix);
    let mut taken = 0;
    for &(start, end) in spans.iter().rev() {
        if taken == max || !is_word_token(&prefix[start..end]) {
            break;
        }
        taken += 1;
    }

    if taken == 0 || taken < min {
        return None;
    }
    let first = spans[spans.len() - taken].0;
    let last = spans[spans.len() - 1].1;
    Some(&prefix[first..last])
}

// (start, end) byte offsets of whitespace separated tokens
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

// identifiers like `compaction`, `Write`, `log-gc`, `op_42`; not timestamps or file:line refs
fn is_word_token(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}
