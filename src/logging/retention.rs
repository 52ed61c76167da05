//! Rotated archive retention
//!
//! Deletes archives produced by rotation once they are older than the retention
//! period. The active log file is never touched.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use chrono::NaiveDateTime;

use super::durability::ARCHIVE_SUFFIX_FORMAT;

/// Default retention period in days
pub const DEFAULT_RETENTION_DAYS: u64 = 7;

/// Check whether `name` is a rotated archive of the log file named `stem` + `ext`
///
/// Archives look like `<stem>_<YYYYMMDD_HHMMSS><ext>`, optionally with a `-N`
/// collision counter before the extension.
fn is_archive_name(name: &str, stem: &str, ext: &str) -> bool {
    let Some(middle) = name
        .strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(ext))
    else {
        return false;
    };

    let stamp = match middle.split_once('-') {
        Some((stamp, counter)) => {
            if counter.is_empty() || !counter.bytes().all(|b| b.is_ascii_digit()) {
                return false;
            }
            stamp
        }
        None => middle,
    };
    NaiveDateTime::parse_from_str(stamp, ARCHIVE_SUFFIX_FORMAT).is_ok()
}

/// Clean up archives of `log_path` older than the specified number of days
///
/// Returns the number of files deleted.
pub fn cleanup_rotated_logs(log_path: &Path, retention_days: u64) -> Result<usize> {
    let logs_dir = match log_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    if !logs_dir.exists() {
        return Ok(0);
    }

    let stem = log_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = log_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let retention_duration = Duration::from_secs(retention_days * 24 * 60 * 60);
    let cutoff = SystemTime::now()
        .checked_sub(retention_duration)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut deleted_count = 0;

    for entry in fs::read_dir(logs_dir)? {
        let entry = entry?;
        let path = entry.path();

        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) if is_archive_name(name, &stem, &ext) => {}
            _ => continue,
        }

        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                if modified < cutoff && fs::remove_file(&path).is_ok() {
                    deleted_count += 1;
                }
            }
        }
    }

    Ok(deleted_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        File::create(path).unwrap().write_all(b"test").unwrap();
    }

    #[test]
    fn test_is_archive_name() {
        assert!(is_archive_name("log_20260121_143045.txt", "log", ".txt"));
        assert!(is_archive_name("log_20260121_143045-2.txt", "log", ".txt"));
        assert!(is_archive_name("journal_20260121_143045", "journal", ""));

        assert!(!is_archive_name("log.txt", "log", ".txt"));
        assert!(!is_archive_name("log_20260121.txt", "log", ".txt"));
        assert!(!is_archive_name("log_20260121_143045-.txt", "log", ".txt"));
        assert!(!is_archive_name("other_20260121_143045.txt", "log", ".txt"));
        assert!(!is_archive_name("log_20260121_143045.log", "log", ".txt"));
    }

    #[test]
    fn test_cleanup_nonexistent_dir() {
        let path = Path::new("/nonexistent/path/for/testing/log.txt");
        let count = cleanup_rotated_logs(path, 0).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_cleanup_expired_archives_only() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("log.txt");

        let archive = temp_dir.path().join("log_20260101_000000.txt");
        let active = log_path.clone();
        let other = temp_dir.path().join("notes_20260101_000000.txt");
        touch(&archive);
        touch(&active);
        touch(&other);

        std::thread::sleep(Duration::from_millis(20));

        // Zero-day retention expires anything modified before now
        let count = cleanup_rotated_logs(&log_path, 0).unwrap();
        assert_eq!(count, 1);

        assert!(!archive.exists());
        assert!(active.exists());
        assert!(other.exists());
    }

    #[test]
    fn test_cleanup_keeps_recent_archives() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("log.txt");

        let archive = temp_dir.path().join("log_20260121_143045.txt");
        touch(&archive);

        let count = cleanup_rotated_logs(&log_path, DEFAULT_RETENTION_DAYS).unwrap();
        assert_eq!(count, 0);
        assert!(archive.exists());
    }
}
