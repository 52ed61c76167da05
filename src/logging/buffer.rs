//! In-memory ring buffer of normalized log lines
//!
//! The buffer itself is not synchronized; [`LogSink`](super::LogSink) owns it
//! behind the same mutex that guards the flush bookkeeping.

use std::collections::VecDeque;

use super::normalize::LogLine;

/// Default number of lines kept in memory
pub const DEFAULT_MAX_LINES: usize = 1000;

/// Bounded, insertion-ordered sequence of log lines
#[derive(Debug)]
pub struct RingBuffer {
    /// Buffered lines, oldest first
    lines: VecDeque<LogLine>,
    /// Maximum lines to keep
    max_lines: usize,
}

impl RingBuffer {
    /// Create a new buffer holding at most `max_lines` lines (at least one)
    pub fn new(max_lines: usize) -> Self {
        let max_lines = max_lines.max(1);
        Self {
            lines: VecDeque::with_capacity(max_lines),
            max_lines,
        }
    }

    /// Append a line, evicting the oldest lines beyond capacity
    pub fn append(&mut self, line: LogLine) {
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    /// Copy of the last `min(n, len)` lines, oldest first
    pub fn snapshot_last(&self, n: usize) -> Vec<LogLine> {
        self.tail(n).cloned().collect()
    }

    /// Copy of every buffered line, oldest first
    pub fn snapshot_all(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }

    /// Borrowing view of the last `min(n, len)` lines
    pub(crate) fn tail(&self, n: usize) -> impl Iterator<Item = &LogLine> {
        let start = self.lines.len().saturating_sub(n);
        self.lines.range(start..)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Get the number of buffered lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn line(text: &str) -> LogLine {
        let now = NaiveDate::from_ymd_opt(2026, 1, 21)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        LogLine::stamped(text, now)
    }

    fn texts(lines: &[LogLine]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.text.rsplit(" - ").next().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_append_and_snapshot() {
        let mut buffer = RingBuffer::new(100);

        buffer.append(line("message 1"));
        buffer.append(line("message 2"));
        buffer.append(line("message 3"));

        assert_eq!(buffer.len(), 3);
        assert_eq!(
            texts(&buffer.snapshot_all()),
            vec!["message 1", "message 2", "message 3"]
        );
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buffer = RingBuffer::new(3);

        for i in 0..5 {
            buffer.append(line(&format!("msg {}", i)));
            assert!(buffer.len() <= 3);
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(texts(&buffer.snapshot_all()), vec!["msg 2", "msg 3", "msg 4"]);
    }

    #[test]
    fn test_snapshot_last() {
        let mut buffer = RingBuffer::new(10);
        for i in 0..6 {
            buffer.append(line(&format!("msg {}", i)));
        }

        assert_eq!(texts(&buffer.snapshot_last(2)), vec!["msg 4", "msg 5"]);
        assert_eq!(buffer.snapshot_last(100).len(), 6);
        assert!(buffer.snapshot_last(0).is_empty());
    }

    #[test]
    fn test_clear() {
        let mut buffer = RingBuffer::new(10);
        buffer.append(line("gone"));
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.snapshot_all().is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = RingBuffer::new(0);
        buffer.append(line("a"));
        buffer.append(line("b"));
        assert_eq!(buffer.max_lines(), 1);
        assert_eq!(texts(&buffer.snapshot_all()), vec!["b"]);
    }
}
