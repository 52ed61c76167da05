//! Log aggregation for linesink
//!
//! A bounded in-memory buffer of normalized lines that serves queries without
//! disk access, backed by a background worker that persists the same lines to
//! a rotating file.

mod buffer;
mod durability;
mod level;
mod normalize;
mod retention;
mod signals;
mod sink;
mod subscriber;
mod worker;

/// tracing target for the sink's own diagnostics
///
/// Events with this target go to stderr only, never back into the sink.
pub const SIDE_CHANNEL: &str = "linesink::side_channel";

pub use buffer::{RingBuffer, DEFAULT_MAX_LINES};
pub use durability::{
    archive_path, read_tail, DiskErrorKind, DurabilityState, FlushError, FlushOutcome,
    DEFAULT_MAX_FILE_LINES,
};
pub use level::{admits, classify, ParseSeverityError, Severity};
pub use normalize::{normalize, normalize_line, LogLine, TIMESTAMP_FORMAT};
pub use retention::{cleanup_rotated_logs, DEFAULT_RETENTION_DAYS};
pub use signals::{shutdown_signal, TerminationSignal};
pub use sink::{LogSink, SinkConfig, SinkStats, DEFAULT_FLUSH_THRESHOLD, DEFAULT_LOCK_TIMEOUT};
pub use subscriber::{init_logging, CanonicalTime, SinkMakeWriter};
pub use worker::{DurabilityWorker, FlushWaker, DEFAULT_FLUSH_INTERVAL, DEFAULT_JOIN_TIMEOUT};
