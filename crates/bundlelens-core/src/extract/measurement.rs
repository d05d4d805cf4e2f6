// Numeric probes: a duration or count associated with the matched phrase

use regex::Regex;

const DURATION_PATTERN: &str = r"(?P<value>\d+(?:\.\d+)?)\s*(?P<unit>ns|us|µs|ms|s|m|h)\b";
const COUNT_PATTERN: &str = r"\b(?P<value>\d+)\b";

#[derive(Debug, Clone)]
pub enum MeasurementExtractor {
    // number with a time unit, normalized to milliseconds
    Duration(Regex),
    // first bare integer
    Count(Regex),
    // custom pattern; group `value` (else 1), optional group `unit`
    Pattern(Regex),
}

impl MeasurementExtractor {
    pub fn duration() -> Self {
        Self::Duration(Regex::new(DURATION_PATTERN).expect("duration pattern is valid"))
    }

    pub fn count() -> Self {
        Self::Count(Regex::new(COUNT_PATTERN).expect("count pattern is valid"))
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Pattern(Regex::new(pattern)?))
    }

    /// Probe the text after `anchor` first, then the whole line.
    pub fn extract(&self, text: &str, anchor: usize) -> Option<f64> {
        let tail = text.get(anchor..).unwrap_or("");
        self.probe(tail).or_else(|| self.probe(text))
    }

    fn probe(&self, text: &str) -> Option<f64> {
        let re = match self {
            Self::Duration(re) | Self::Count(re) | Self::Pattern(re) => re,
        };
        let caps = re.captures(text)?;
        let value: f64 = caps
            .name("value")
            .or_else(|| caps.get(1))?
            .as_str()
            .parse()
            .ok()?;
        let scale = caps.name("unit").map(|u| unit_to_millis(u.as_str())).unwrap_or(1.0);
        Some(value * scale)
    }
}

fn unit_to_millis(unit: &str) -> f64 {
    match unit {
        "ns" => 1e-6,
        "us" | "µs" => 1e-3,
        "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        _ => 1.0,
    }
}
