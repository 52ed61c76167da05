//! Timestamp normalization for incoming log lines
//!
//! Every stored line starts with a `YYYY-MM-DD HH:MM:SS` prefix. Lines that
//! already carry one keep it verbatim; the rest are stamped with the ingestion
//! time and their inferred severity.

use std::fmt;

use chrono::{NaiveDateTime, Timelike};

use super::level::{classify, Severity};

/// chrono format of the canonical timestamp prefix
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Byte length of a rendered [`TIMESTAMP_FORMAT`] prefix
const TIMESTAMP_LEN: usize = 19;

/// Separator between the synthesized prefix fields and the message
const SEPARATOR: &str = " - ";

/// A normalized log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Timestamp from the line's prefix, second precision
    pub timestamp: NaiveDateTime,
    /// Severity inferred from the line's text
    pub severity: Severity,
    /// Everything after the timestamp prefix
    pub text: String,
}

impl LogLine {
    /// Create a line stamped with `now`, tagging it with its inferred severity
    pub fn stamped(message: &str, now: NaiveDateTime) -> Self {
        let severity = classify(message);
        Self {
            timestamp: truncate_to_seconds(now),
            severity,
            text: format!("{SEPARATOR}{severity}{SEPARATOR}{message}"),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.timestamp.format(TIMESTAMP_FORMAT), self.text)
    }
}

/// Parse a leading canonical timestamp, returning it and the remainder of the line
fn split_timestamp(line: &str) -> Option<(NaiveDateTime, &str)> {
    let prefix = line.get(..TIMESTAMP_LEN)?;
    let timestamp = NaiveDateTime::parse_from_str(prefix, TIMESTAMP_FORMAT).ok()?;
    // chrono tolerates unpadded fields; only the exact canonical rendering counts
    if timestamp.format(TIMESTAMP_FORMAT).to_string() != prefix {
        return None;
    }
    Some((timestamp, &line[TIMESTAMP_LEN..]))
}

fn truncate_to_seconds(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_nanosecond(0).unwrap_or(dt)
}

/// Normalize a single physical line
///
/// Returns `None` for blank lines.
pub fn normalize_line(raw: &str, now: NaiveDateTime) -> Option<LogLine> {
    let line = raw.trim_end();
    if line.trim_start().is_empty() {
        return None;
    }

    match split_timestamp(line) {
        Some((timestamp, rest)) => Some(LogLine {
            timestamp,
            severity: classify(rest),
            text: rest.to_string(),
        }),
        None => Some(LogLine::stamped(line, now)),
    }
}

/// Normalize possibly multi-line input into one [`LogLine`] per non-blank line
pub fn normalize(raw: &str, now: NaiveDateTime) -> Vec<LogLine> {
    raw.lines()
        .filter_map(|line| normalize_line(line, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 21)
            .unwrap()
            .and_hms_milli_opt(14, 30, 45, 678)
            .unwrap()
    }

    #[test]
    fn test_stamps_untimestamped_line() {
        let line = normalize_line("ERROR: boom", now()).unwrap();
        assert_eq!(line.severity, Severity::Error);
        assert_eq!(line.to_string(), "2026-01-21 14:30:45 - ERROR - ERROR: boom");
    }

    #[test]
    fn test_stamped_line_defaults_to_info() {
        let line = normalize_line("server started", now()).unwrap();
        assert_eq!(line.to_string(), "2026-01-21 14:30:45 - INFO - server started");
    }

    #[test]
    fn test_preserves_existing_timestamp() {
        let raw = "2025-12-31 23:59:59,123 - app - WARNING - cache cold";
        let line = normalize_line(raw, now()).unwrap();
        assert_eq!(line.to_string(), raw);
        assert_eq!(line.severity, Severity::Warning);
        assert_eq!(line.text, ",123 - app - WARNING - cache cold");
        assert_eq!(
            line.timestamp,
            NaiveDate::from_ymd_opt(2025, 12, 31)
                .unwrap()
                .and_hms_opt(23, 59, 59)
                .unwrap()
        );
    }

    #[test]
    fn test_invalid_date_prefix_is_stamped() {
        let raw = "2025-13-45 99:00:00 not a real time";
        let line = normalize_line(raw, now()).unwrap();
        assert_eq!(line.to_string(), format!("2026-01-21 14:30:45 - INFO - {raw}"));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let first = normalize_line("WARNING low disk", now()).unwrap();
        let later = now() + chrono::Duration::hours(3);
        let second = normalize_line(&first.to_string(), later).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_multiline_split_and_blank_lines_dropped() {
        let lines = normalize("first\n\n   \nsecond\r\nERROR third\n", now());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].to_string().ends_with(" - INFO - first"));
        assert!(lines[1].to_string().ends_with(" - INFO - second"));
        assert_eq!(lines[2].severity, Severity::Error);
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize("", now()).is_empty());
        assert!(normalize_line("   ", now()).is_none());
    }

    #[test]
    fn test_multibyte_text_shorter_than_prefix() {
        let line = normalize_line("日志", now()).unwrap();
        assert!(line.to_string().ends_with(" - INFO - 日志"));
    }
}
