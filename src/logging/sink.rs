//! Process-wide log sink
//!
//! [`LogSink`] buffers normalized, severity-filtered lines in memory for
//! queries and persists them asynchronously through a [`DurabilityWorker`].
//! One mutex guards the buffer together with the flush bookkeeping; reads never
//! touch disk, and `add` never fails.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::buffer::{RingBuffer, DEFAULT_MAX_LINES};
use super::durability::{DurabilityState, FlushError, FlushOutcome, DEFAULT_MAX_FILE_LINES};
use super::level::Severity;
use super::normalize::{normalize, LogLine};
use super::worker::{DurabilityWorker, FlushWaker, DEFAULT_FLUSH_INTERVAL, DEFAULT_JOIN_TIMEOUT};
use super::SIDE_CHANNEL;

/// Default unwritten line count that triggers an early flush
pub const DEFAULT_FLUSH_THRESHOLD: usize = 50;

/// Default wait for the buffer lock before a flush cycle is skipped
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Construction-time settings of a [`LogSink`]
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Lines below this severity are dropped before buffering
    pub min_level: Severity,
    /// File the buffered lines are persisted to
    pub file_path: PathBuf,
    /// In-memory capacity
    pub max_lines: usize,
    /// Time between unconditional flushes
    pub flush_interval: Duration,
    /// Unwritten line count that wakes the worker early
    pub flush_threshold: usize,
    /// Line count at which the target file is rotated
    pub max_file_lines: usize,
    /// Wait for the buffer lock before a flush cycle is skipped
    pub lock_timeout: Duration,
    /// Bound on waiting for the worker to exit in `close`
    pub join_timeout: Duration,
}

impl SinkConfig {
    /// Defaults for everything except the target file
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            min_level: Severity::Info,
            file_path: file_path.into(),
            max_lines: DEFAULT_MAX_LINES,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            max_file_lines: DEFAULT_MAX_FILE_LINES,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

/// Point-in-time view of the sink's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub file_path: PathBuf,
    pub min_level: String,
    pub buffered: usize,
    pub capacity: usize,
    pub unwritten: usize,
    pub lines_written: usize,
    pub rolled_over: bool,
    pub last_flush: Option<NaiveDateTime>,
}

struct SinkState {
    buffer: RingBuffer,
    durability: DurabilityState,
}

/// State shared with the worker thread
struct Shared {
    state: Mutex<SinkState>,
    config: SinkConfig,
}

impl Shared {
    /// Lock the state, recovering from poisoning
    ///
    /// Every mutation leaves the state valid, so a panic elsewhere can't corrupt it.
    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, SinkState>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.state.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
            }
        }
    }

    /// Flush with the lock already held
    fn flush_locked(&self, state: &mut SinkState) -> Result<FlushOutcome, FlushError> {
        let SinkState { buffer, durability } = state;
        let result = durability.flush(buffer, self.config.max_file_lines, now());
        report_flush(&result);
        result
    }

    /// Flush, giving up if the lock isn't free within the configured timeout
    fn flush(&self) -> Result<FlushOutcome, FlushError> {
        match self.try_lock_for(self.config.lock_timeout) {
            Some(mut state) => self.flush_locked(&mut state),
            None => {
                debug!(target: SIDE_CHANNEL, "Log buffer busy, skipping flush cycle");
                Err(FlushError::LockTimeout)
            }
        }
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Report flush results on the side channel, never through the sink itself
fn report_flush(result: &Result<FlushOutcome, FlushError>) {
    match result {
        Ok(FlushOutcome::RolledOver { archive }) => info!(
            target: SIDE_CHANNEL,
            archive = %archive.display(),
            "Log file rotated, persistence paused until the sink is reopened"
        ),
        Ok(FlushOutcome::Suppressed { pending }) => debug!(
            target: SIDE_CHANNEL,
            pending,
            "Log file rolled over, keeping lines in memory only"
        ),
        Ok(FlushOutcome::Idle) | Ok(FlushOutcome::Written { .. }) => {}
        Err(FlushError::LockTimeout) => {}
        Err(e) => warn!(
            target: SIDE_CHANNEL,
            reason = e.disk_error_kind().map(|k| k.user_message()).unwrap_or_default(),
            "Log flush failed, will retry: {}",
            e
        ),
    }
}

/// Bounded in-memory log buffer with asynchronous file persistence
///
/// Construct one per process and share it through an `Arc` with every producer
/// and query endpoint.
pub struct LogSink {
    shared: Arc<Shared>,
    worker: Mutex<Option<DurabilityWorker>>,
    waker: FlushWaker,
    closed: AtomicBool,
}

impl LogSink {
    /// Create the sink and start its flush worker
    pub fn new(config: SinkConfig) -> Result<Self> {
        let state = SinkState {
            buffer: RingBuffer::new(config.max_lines),
            durability: DurabilityState::new(config.file_path.clone()),
        };
        let flush_interval = config.flush_interval;
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            config,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = DurabilityWorker::spawn(flush_interval, move || {
            // Errors were already reported; the next cycle retries
            let _ = worker_shared.flush();
        })?;

        Ok(Self {
            shared,
            waker: worker.waker(),
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SinkConfig {
        &self.shared.config
    }

    /// Minimum severity admitted into the buffer
    pub fn min_level(&self) -> Severity {
        self.shared.config.min_level
    }

    /// File currently targeted by flushes
    pub fn file_path(&self) -> PathBuf {
        self.shared.lock().durability.path().to_path_buf()
    }

    /// Ingest a message, possibly spanning several lines
    ///
    /// Lines below the minimum severity and blank lines are dropped silently.
    pub fn add(&self, message: &str) {
        let min_level = self.shared.config.min_level;
        let admitted: Vec<LogLine> = normalize(message, now())
            .into_iter()
            .filter(|line| line.severity >= min_level)
            .collect();
        if admitted.is_empty() {
            return;
        }

        let threshold_reached = {
            let mut state = self.shared.lock();
            let count = admitted.len();
            for line in admitted {
                state.buffer.append(line);
            }
            let buffered = state.buffer.len();
            state.durability.record_appended(count, buffered);
            state.durability.unwritten() >= self.shared.config.flush_threshold.max(1)
        };

        if threshold_reached {
            if self.is_closed() {
                // No worker left to wake
                let _ = self.shared.flush();
            } else {
                self.waker.wake();
            }
        }
    }

    /// Copy of the last `n` buffered lines, oldest first
    pub fn snapshot_last(&self, n: usize) -> Vec<LogLine> {
        self.shared.lock().buffer.snapshot_last(n)
    }

    /// Copy of every buffered line, oldest first
    pub fn snapshot_all(&self) -> Vec<LogLine> {
        self.shared.lock().buffer.snapshot_all()
    }

    /// The last `n` buffered lines joined with newlines
    pub fn get_last_n(&self, n: usize) -> String {
        join_lines(&self.snapshot_last(n))
    }

    /// Every buffered line joined with newlines
    pub fn get_all(&self) -> String {
        join_lines(&self.snapshot_all())
    }

    /// Empty the in-memory buffer
    ///
    /// Pending lines get one flush attempt first; whatever that can't persist is
    /// dropped with the buffer.
    pub fn clear(&self) {
        let mut state = self.shared.lock();
        let _ = self.shared.flush_locked(&mut state);
        state.buffer.clear();
        state.durability.discard_pending();
    }

    /// Flush pending lines now, on the calling thread
    pub fn flush_now(&self) -> Result<FlushOutcome, FlushError> {
        self.shared.flush()
    }

    /// Resume persistence after a rotation
    ///
    /// Starts a fresh file instance at `path`, or at the configured path when
    /// `None`. Lines still pending are written to the new file.
    pub fn reopen(&self, path: Option<PathBuf>) {
        let path = path.unwrap_or_else(|| self.shared.config.file_path.clone());
        let mut state = self.shared.lock();
        state.durability = state.durability.reopened(path);
    }

    pub fn stats(&self) -> SinkStats {
        let state = self.shared.lock();
        SinkStats {
            file_path: state.durability.path().to_path_buf(),
            min_level: self.shared.config.min_level.to_string(),
            buffered: state.buffer.len(),
            capacity: state.buffer.max_lines(),
            unwritten: state.durability.unwritten(),
            lines_written: state.durability.lines_written(),
            rolled_over: state.durability.rolled_over(),
            last_flush: state.durability.last_flush(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the worker and write everything still pending
    ///
    /// Safe to call more than once; only the first call does anything. The final
    /// flush waits up to `join_timeout` for the lock, so a worker stalled inside
    /// a flush can't hold shutdown hostage.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.shutdown(self.shared.config.join_timeout);
        }

        match self.shared.try_lock_for(self.shared.config.join_timeout) {
            Some(mut state) => {
                let _ = self.shared.flush_locked(&mut state);
            }
            None => warn!(
                target: SIDE_CHANNEL,
                "Log buffer still locked at close, final flush abandoned"
            ),
        }
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn join_lines(lines: &[LogLine]) -> String {
    lines
        .iter()
        .map(|line| line.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
