//! Severity classification for free-text log lines
//!
//! Lines carry no structured level, so severity is inferred from the keywords
//! they contain.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Ordinal log importance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Keywords checked by [`classify`], highest priority first.
///
/// `WARN` and `FATAL` are aliases of `WARNING` and `CRITICAL`.
const KEYWORDS: &[(&str, Severity)] = &[
    ("CRITICAL", Severity::Critical),
    ("FATAL", Severity::Critical),
    ("ERROR", Severity::Error),
    ("WARNING", Severity::Warning),
    ("WARN", Severity::Warning),
    ("INFO", Severity::Info),
    ("DEBUG", Severity::Debug),
];

impl Severity {
    /// Get the canonical display name for this severity
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Directive for an `EnvFilter` that lets this severity and above through.
    ///
    /// tracing has no level above ERROR, so CRITICAL maps onto it.
    pub fn tracing_directive(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warn",
            Severity::Error | Severity::Critical => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a configured level name is not recognized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level '{0}' (expected DEBUG, INFO, WARNING, ERROR or CRITICAL)")]
pub struct ParseSeverityError(String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARNING" | "WARN" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            "CRITICAL" | "FATAL" => Ok(Severity::Critical),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

/// Infer the severity of a line from the keywords it contains.
///
/// Matching is case-insensitive and returns the highest-priority keyword found,
/// falling back to INFO.
pub fn classify(line: &str) -> Severity {
    let upper = line.to_ascii_uppercase();
    KEYWORDS
        .iter()
        .find(|(keyword, _)| upper.contains(*keyword))
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Info)
}

/// Check whether a line meets the minimum severity
pub fn admits(line: &str, threshold: Severity) -> bool {
    classify(line) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_defaults_to_info() {
        assert_eq!(classify("plain message"), Severity::Info);
        assert_eq!(classify(""), Severity::Info);
    }

    #[test]
    fn test_classify_keywords() {
        assert_eq!(classify("DEBUG cache miss"), Severity::Debug);
        assert_eq!(classify("some info message"), Severity::Info);
        assert_eq!(classify("Warning: disk almost full"), Severity::Warning);
        assert_eq!(classify("warn: retrying"), Severity::Warning);
        assert_eq!(classify("ERROR: boom"), Severity::Error);
        assert_eq!(classify("critical failure"), Severity::Critical);
        assert_eq!(classify("FATAL: out of memory"), Severity::Critical);
    }

    #[test]
    fn test_classify_picks_highest_priority() {
        assert_eq!(classify("INFO recovered from error"), Severity::Error);
        assert_eq!(classify("debug: warning suppressed"), Severity::Warning);
        assert_eq!(classify("ERROR escalated to CRITICAL"), Severity::Critical);
    }

    #[test]
    fn test_admits() {
        assert!(!admits("some info message", Severity::Warning));
        assert!(admits("ERROR: boom", Severity::Warning));
        assert!(admits("WARN: slow request", Severity::Warning));
        assert!(admits("anything at all", Severity::Debug));
        assert!(!admits("DEBUG details", Severity::Info));
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn test_parse_severity() {
        assert_eq!("info".parse::<Severity>().unwrap(), Severity::Info);
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!(" Fatal ".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("verbose".parse::<Severity>().is_err());
    }
}
