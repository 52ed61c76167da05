//! Persistence of buffered lines to a rotating plain-text file
//!
//! [`DurabilityState`] tracks which buffered lines still have to reach disk.
//! Rotation is detected lazily: before each write the target file's line count
//! is scanned, and a full file is renamed to `<stem>_<YYYYMMDD_HHMMSS><ext>`.
//! After a rotation the state is rolled over and writes nothing until the sink
//! is reopened.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;

use super::buffer::RingBuffer;

/// Default line count at which the target file is rotated
pub const DEFAULT_MAX_FILE_LINES: usize = 10_000;

/// chrono format of the suffix inserted into rotated file names
pub const ARCHIVE_SUFFIX_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Categories of disk errors for side-channel messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

impl DiskErrorKind {
    /// Short description of the failure, phrased for operators
    pub fn user_message(&self) -> &'static str {
        match self {
            DiskErrorKind::DiskFull => "disk full, lines kept in memory until space frees up",
            DiskErrorKind::PermissionDenied => "permission denied on log file",
            DiskErrorKind::NotFound => "log file or directory not found",
            DiskErrorKind::Other => "log file I/O failed",
        }
    }
}

/// Categorize an IO error
pub fn categorize_io_error(e: &io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::WriteZero => DiskErrorKind::DiskFull,
        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
        ErrorKind::NotFound => DiskErrorKind::NotFound,
        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28, EDQUOT = 122 (Linux) / 69 (macOS)
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

/// Reasons a flush did not complete
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("timed out waiting for the log buffer lock")]
    LockTimeout,

    #[error("failed to count lines in {}: {source}", path.display())]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rotate {} to {}: {source}", from.display(), to.display())]
    Rotate {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FlushError {
    /// Disk error category, if the failure came from the filesystem
    pub fn disk_error_kind(&self) -> Option<DiskErrorKind> {
        match self {
            FlushError::LockTimeout => None,
            FlushError::Inspect { source, .. }
            | FlushError::Rotate { source, .. }
            | FlushError::Write { source, .. } => Some(categorize_io_error(source)),
        }
    }
}

/// What a successful flush did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending
    Idle,
    /// Pending lines were appended to the target file
    Written { lines: usize },
    /// The target file was full and has been renamed; this instance is now rolled over
    RolledOver { archive: PathBuf },
    /// The instance was already rolled over, so pending lines stay in memory only
    Suppressed { pending: usize },
}

/// Flush bookkeeping for one target file instance
#[derive(Debug)]
pub struct DurabilityState {
    /// Target file
    path: PathBuf,
    /// Lines appended to the buffer since the last successful write
    unwritten: usize,
    /// When lines were last written
    last_flush: Option<NaiveDateTime>,
    /// Lines this instance has written to the target file
    lines_written: usize,
    /// Set once the target file has been rotated away
    rolled_over: bool,
}

impl DurabilityState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            unwritten: 0,
            last_flush: None,
            lines_written: 0,
            rolled_over: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn unwritten(&self) -> usize {
        self.unwritten
    }

    pub fn last_flush(&self) -> Option<NaiveDateTime> {
        self.last_flush
    }

    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    pub fn rolled_over(&self) -> bool {
        self.rolled_over
    }

    /// Record `count` newly buffered lines.
    ///
    /// Lines evicted before they were written can no longer be persisted, so the
    /// count never exceeds what the buffer still holds.
    pub fn record_appended(&mut self, count: usize, buffered: usize) {
        self.unwritten = self.unwritten.saturating_add(count).min(buffered);
    }

    /// Forget pending lines, e.g. after the buffer was cleared
    pub fn discard_pending(&mut self) {
        self.unwritten = 0;
    }

    /// Successor instance targeting `path`, carrying over the pending count
    pub fn reopened(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            unwritten: self.unwritten,
            ..Self::new(path)
        }
    }

    /// Write the pending tail of `buffer` to the target file.
    ///
    /// On error the pending count is left untouched so the next flush retries.
    pub fn flush(
        &mut self,
        buffer: &RingBuffer,
        max_file_lines: usize,
        now: NaiveDateTime,
    ) -> Result<FlushOutcome, FlushError> {
        if self.unwritten == 0 {
            return Ok(FlushOutcome::Idle);
        }
        if self.rolled_over {
            return Ok(FlushOutcome::Suppressed {
                pending: self.unwritten,
            });
        }

        if let Some(archive) = self.rotate_if_full(max_file_lines, now)? {
            self.rolled_over = true;
            return Ok(FlushOutcome::RolledOver { archive });
        }

        let pending = self.unwritten.min(buffer.len());
        self.write_lines(buffer, pending)
            .map_err(|source| FlushError::Write {
                path: self.path.clone(),
                source,
            })?;

        self.unwritten = 0;
        self.lines_written += pending;
        self.last_flush = Some(now);
        Ok(FlushOutcome::Written { lines: pending })
    }

    fn write_lines(&self, buffer: &RingBuffer, count: usize) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for line in buffer.tail(count) {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()
    }

    /// Rename the target file if it already holds `max_file_lines` lines
    fn rotate_if_full(
        &self,
        max_file_lines: usize,
        now: NaiveDateTime,
    ) -> Result<Option<PathBuf>, FlushError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let lines = count_lines(&self.path).map_err(|source| FlushError::Inspect {
            path: self.path.clone(),
            source,
        })?;
        if lines < max_file_lines {
            return Ok(None);
        }

        let archive = archive_path(&self.path, now);
        fs::rename(&self.path, &archive).map_err(|source| FlushError::Rotate {
            from: self.path.clone(),
            to: archive.clone(),
            source,
        })?;
        Ok(Some(archive))
    }
}

/// Count lines in a file, including an unterminated last line
pub fn count_lines(path: &Path) -> io::Result<usize> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    let mut last = b'\n';

    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        count += chunk.iter().filter(|&&b| b == b'\n').count();
        last = chunk[chunk.len() - 1];
        let len = chunk.len();
        reader.consume(len);
    }

    if last != b'\n' {
        count += 1;
    }
    Ok(count)
}

/// Name a rotated file `<stem>_<YYYYMMDD_HHMMSS><ext>` next to the original.
///
/// A `-N` counter is added when an archive with that name already exists.
pub fn archive_path(path: &Path, now: NaiveDateTime) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let suffix = now.format(ARCHIVE_SUFFIX_FORMAT);

    let candidate = path.with_file_name(format!("{stem}_{suffix}{ext}"));
    if !candidate.exists() {
        return candidate;
    }

    (1..)
        .map(|n| path.with_file_name(format!("{stem}_{suffix}-{n}{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Read the last `n` lines of a persisted log file
pub fn read_tail(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut tail = VecDeque::with_capacity(n.min(1024));

    for line in reader.lines() {
        let line = line?;
        if n == 0 {
            continue;
        }
        if tail.len() == n {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Ok(tail.into())
}
