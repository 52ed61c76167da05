//! Background flush thread
//!
//! Runs a flush callback every `flush_interval`, or sooner when woken. Stopping
//! clears the running flag and wakes the thread; an in-flight flush always runs
//! to completion first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::SIDE_CHANNEL;

/// Default time between unconditional flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on waiting for the worker thread to exit
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Shortest wait between flushes, so a zero interval can't spin
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

const WORKER_THREAD_NAME: &str = "linesink-flush";

/// Cloneable handle that requests an early flush
#[derive(Debug, Clone)]
pub struct FlushWaker {
    tx: SyncSender<()>,
}

impl FlushWaker {
    /// Request a flush without blocking.
    ///
    /// A full channel means a wake-up is already queued, which covers this request.
    pub fn wake(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                debug!(target: SIDE_CHANNEL, "Flush worker already exited, wake ignored");
            }
        }
    }
}

/// Handle to the running flush thread
pub struct DurabilityWorker {
    running: Arc<AtomicBool>,
    waker: FlushWaker,
    handle: Option<JoinHandle<()>>,
    done_rx: Receiver<()>,
}

impl DurabilityWorker {
    /// Spawn the flush thread
    ///
    /// `flush` runs on the worker thread after every interval and every wake-up.
    pub fn spawn<F>(flush_interval: Duration, mut flush: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let flush_interval = flush_interval.max(MIN_FLUSH_INTERVAL);
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::sync_channel::<()>(1);
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                while thread_running.load(Ordering::SeqCst) {
                    match rx.recv_timeout(flush_interval) {
                        Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if !thread_running.load(Ordering::SeqCst) {
                        break;
                    }
                    flush();
                }
                // Receiver may be gone if shutdown already gave up on us
                let _ = done_tx.send(());
            })
            .context("Failed to spawn flush worker thread")?;

        Ok(Self {
            running,
            waker: FlushWaker { tx },
            handle: Some(handle),
            done_rx,
        })
    }

    /// Get a handle for requesting early flushes
    pub fn waker(&self) -> FlushWaker {
        self.waker.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the thread, waiting at most `join_timeout` for it to exit
    ///
    /// Returns false if the thread was still busy when the timeout expired; it
    /// is then detached and exits on its own once its flush returns.
    pub fn shutdown(mut self, join_timeout: Duration) -> bool {
        self.running.store(false, Ordering::SeqCst);
        self.waker.wake();

        match self.done_rx.recv_timeout(join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        warn!(target: SIDE_CHANNEL, "Flush worker panicked");
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    target: SIDE_CHANNEL,
                    timeout_ms = join_timeout.as_millis() as u64,
                    "Flush worker did not stop in time, detaching it"
                );
                false
            }
        }
    }
}
