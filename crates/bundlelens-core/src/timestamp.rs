// Line header timestamp parsing
// Supports glog headers (tserver/master/controller), postgres headers,
// ISO8601 and a bare wall clock. Lines without a header inherit the previous stamp.

use crate::LogLine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;

pub struct LineClock {
    // glog: I1231 10:30:45.123456 12345 file.cc:42] message
    glog_pattern: Regex,
    // ISO8601: 2024-02-23T10:23:45.123Z message
    iso_pattern: Regex,
    // postgres: 2024-02-23 10:23:45.123 UTC [1234] LOG: message
    postgres_pattern: Regex,
    // bare clock: 10:23:45 message
    clock_pattern: Regex,
    // glog headers carry no year
    year: i32,
    // day used for bare clock lines
    date: NaiveDate,
    last: Option<DateTime<Utc>>,
}

impl LineClock {
    /// Clock for glog lines of `year`; bare clock lines are placed on Jan 1 of that year.
    /// None when the year is outside the calendar chrono can represent.
    pub fn new(year: i32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, 1, 1).map(Self::with_date)
    }

    /// Clock anchored on `date`; glog lines take their year from it.
    pub fn with_date(date: NaiveDate) -> Self {
        use chrono::Datelike;

        Self {
            glog_pattern: Regex::new(
                r"^[IWEF](\d{2})(\d{2})\s+(\d{2}):(\d{2}):(\d{2})(?:\.(\d{1,9}))?(?:\s|$)",
            )
            .expect("glog header pattern is valid"),
            iso_pattern: Regex::new(
                r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)(?:\s|$)",
            )
            .expect("iso header pattern is valid"),
            postgres_pattern: Regex::new(
                r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?)(?:\s|$)",
            )
            .expect("postgres header pattern is valid"),
            clock_pattern: Regex::new(r"^(\d{2}):(\d{2}):(\d{2})(?:\.(\d{1,9}))?(?:\s|$)")
                .expect("clock header pattern is valid"),
            year: date.year(),
            date,
            last: None,
        }
    }

    /// Parse the header of a single line, without falling back to the previous stamp.
    pub fn parse_header(&self, raw: &str) -> Option<DateTime<Utc>> {
        if let Some(caps) = self.glog_pattern.captures(raw) {
            let month: u32 = caps.get(1)?.as_str().parse().ok()?;
            let day: u32 = caps.get(2)?.as_str().parse().ok()?;
            let date = NaiveDate::from_ymd_opt(self.year, month, day)?;
            let time = Self::time_from_caps(&caps, 3)?;
            return Some(NaiveDateTime::new(date, time).and_utc());
        }

        if let Some(caps) = self.iso_pattern.captures(raw) {
            let ts = caps.get(1)?.as_str();
            return DateTime::parse_from_rfc3339(ts)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|| {
                    // Try without timezone
                    NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                });
        }

        if let Some(caps) = self.postgres_pattern.captures(raw) {
            return NaiveDateTime::parse_from_str(caps.get(1)?.as_str(), "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc());
        }

        if let Some(caps) = self.clock_pattern.captures(raw) {
            let time = Self::time_from_caps(&caps, 1)?;
            return Some(NaiveDateTime::new(self.date, time).and_utc());
        }

        None
    }

    /// Stamp a line: its own header if it has one, else the previous line's stamp.
    /// Returns None only before the first stamped line.
    pub fn stamp(&mut self, raw: &str) -> Option<DateTime<Utc>> {
        if let Some(ts) = self.parse_header(raw) {
            self.last = Some(ts);
        }
        self.last
    }

    pub fn last(&self) -> Option<DateTime<Utc>> {
        self.last
    }

    // hour, minute, second, optional fraction starting at capture group `first`
    fn time_from_caps(caps: &regex::Captures<'_>, first: usize) -> Option<NaiveTime> {
        let hour: u32 = caps.get(first)?.as_str().parse().ok()?;
        let minute: u32 = caps.get(first + 1)?.as_str().parse().ok()?;
        let second: u32 = caps.get(first + 2)?.as_str().parse().ok()?;
        let nanos = caps
            .get(first + 3)
            .map(|m| fraction_to_nanos(m.as_str()))
            .unwrap_or(0);
        NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)
    }
}

// ".123" -> 123_000_000, ".123456" -> 123_456_000
fn fraction_to_nanos(digits: &str) -> u32 {
    let mut padded: String = digits.chars().take(9).collect();
    while padded.len() < 9 {
        padded.push('0');
    }
    padded.parse().unwrap_or(0)
}

/// Split one file's text into stamped lines, preserving order.
/// Blank lines and lines before the first parseable header are skipped.
pub fn lines_from_text(
    node: &str,
    process_type: &str,
    text: &str,
    clock: &mut LineClock,
) -> Vec<LogLine> {
    let mut lines = Vec::new();
    let mut unstamped = 0usize;

    for raw in text.lines() {
        if raw.trim().is_empty() {
            continue;
        }
        match clock.stamp(raw) {
            Some(ts) => lines.push(LogLine::new(node, process_type, ts, raw)),
            None => unstamped += 1,
        }
    }

    if unstamped > 0 {
        tracing::debug!(node, process_type, unstamped, "Skipped lines before first timestamp");
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_glog_header() {
        let clock = LineClock::new(2024).unwrap();
        let ts = clock
            .parse_header("I1231 10:30:45.123456 12345 tablet.cc:42] Flush took a long time")
            .unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 12, 31));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (10, 30, 45));
        assert_eq!(ts.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_postgres_header() {
        let clock = LineClock::new(2024).unwrap();
        let ts = clock
            .parse_header("2023-12-31 10:30:45.123 UTC [4321] LOG:  connection received")
            .unwrap();
        assert_eq!(ts.year(), 2023);
        assert_eq!(ts.nanosecond(), 123_000_000);
    }

    #[test]
    fn test_iso_header() {
        let clock = LineClock::new(2024).unwrap();
        let ts = clock
            .parse_header("2024-02-23T10:23:45.5+02:00 controller started")
            .unwrap();
        assert_eq!(ts.hour(), 8);
    }

    #[test]
    fn test_bare_clock_uses_anchor_date() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let clock = LineClock::with_date(date);
        let ts = clock.parse_header("12:00:01 compaction took a long time").unwrap();
        assert_eq!(ts.date_naive(), date);
        assert_eq!(ts.second(), 1);
    }

    #[test]
    fn test_unrepresentable_year_is_rejected() {
        assert!(LineClock::new(400_000).is_none());
        assert!(LineClock::new(-400_000).is_none());
    }

    #[test]
    fn test_invalid_glog_date_is_rejected() {
        let clock = LineClock::new(2023).unwrap();
        assert!(clock.parse_header("I0230 10:30:45.000000 1 x.cc:1] bad day").is_none());
    }

    #[test]
    fn test_continuation_lines_inherit_previous_stamp() {
        let text = "stack frame before any header\n\
                    W0101 00:00:05.000000 1 a.cc:1] first\n\
                    \x20   @ 0x7f00 continuation\n\
                    \n\
                    E0101 00:01:00.000000 1 a.cc:2] second\n";
        let mut clock = LineClock::new(2024).unwrap();
        let lines = lines_from_text("n1", "tserver", text, &mut clock);

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].timestamp, lines[0].timestamp);
        assert!(lines[2].timestamp > lines[1].timestamp);
        assert_eq!(lines[0].node, "n1");
        assert_eq!(lines[2].process_type, "tserver");
    }
}
