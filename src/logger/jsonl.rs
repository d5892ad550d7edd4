//! Rotating structured log: one JSON object per line.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! tailing process never sees a torn record. When the file would exceed the
//! rotation threshold the writer shifts `cleanup.log.N` files up and starts
//! fresh. Logging failures degrade to stderr and then to silent discard —
//! the engine must never fail a cleanup because its log is unwritable.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{CleanerError, Result};

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One structured log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// ISO 8601 UTC timestamp.
    pub timestamp: String,
    pub level: LogLevel,
    /// Event identifier, e.g. `session_start`, `cleanup_complete`.
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// New record stamped with the current UTC time.
    #[must_use]
    pub fn new(level: LogLevel, event: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level,
            event: event.into(),
            session_id: None,
            message: message.into(),
            details: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

/// Append-only rotating JSONL writer.
pub struct CleanupLog {
    path: PathBuf,
    max_size_bytes: u64,
    max_rotated_files: u32,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
}

impl CleanupLog {
    /// Open (or create) the log at `path`. Falls back to stderr when the
    /// file cannot be opened.
    #[must_use]
    pub fn open(path: PathBuf, max_size_bytes: u64, max_rotated_files: u32) -> Self {
        let mut log = Self {
            path,
            max_size_bytes,
            max_rotated_files,
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
        };
        match open_append(&log.path) {
            Ok((file, size)) => {
                log.writer = Some(BufWriter::with_capacity(16 * 1024, file));
                log.state = WriterState::Normal;
                log.bytes_written = size;
            }
            Err(_) => {
                log.state = WriterState::Stderr;
                let _ = writeln!(
                    io::stderr(),
                    "[osxcleaner] log path unavailable, falling back to stderr"
                );
            }
        }
        log
    }

    /// Write one record as a single line.
    pub fn write(&mut self, record: &LogRecord) {
        let Ok(json) = serde_json::to_string(record) else {
            return;
        };
        let line = format!("{json}\n");
        self.write_line(&line);
    }

    /// Flush buffered lines.
    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }

    /// Current degradation state label (diagnostics).
    #[must_use]
    pub fn state(&self) -> &'static str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    fn write_line(&mut self, line: &str) {
        if self.state == WriterState::Normal
            && self.bytes_written + line.len() as u64 > self.max_size_bytes
        {
            self.rotate();
        }

        match self.state {
            WriterState::Normal => {
                if let Some(writer) = self.writer.as_mut() {
                    if writer.write_all(line.as_bytes()).is_err() {
                        self.degrade();
                        self.write_line(line);
                        return;
                    }
                    self.bytes_written += line.len() as u64;
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[osxcleaner] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        self.state = match self.state {
            WriterState::Normal => WriterState::Stderr,
            _ => WriterState::Discard,
        };
    }

    fn rotate(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
        self.writer = None;

        // Shift: .4 -> .5, ..., .1 -> .2, current -> .1; oldest falls off.
        let oldest = rotated_name(&self.path, self.max_rotated_files);
        let _ = fs::remove_file(&oldest);
        for index in (1..self.max_rotated_files).rev() {
            let from = rotated_name(&self.path, index);
            let to = rotated_name(&self.path, index + 1);
            let _ = rename(&from, &to);
        }
        let _ = rename(&self.path, rotated_name(&self.path, 1));

        match open_append(&self.path) {
            Ok((file, _)) => {
                self.writer = Some(BufWriter::with_capacity(16 * 1024, file));
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

impl Drop for CleanupLog {
    fn drop(&mut self) {
        self.flush();
    }
}

fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| CleanerError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| CleanerError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `cleanup.log` → `cleanup.log.3`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_small(dir: &Path, max: u64) -> (PathBuf, CleanupLog) {
        let path = dir.join("cleanup.log");
        let log = CleanupLog::open(path.clone(), max, 5);
        (path, log)
    }

    #[test]
    fn records_are_valid_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut log) = open_small(dir.path(), 1024 * 1024);

        log.write(
            &LogRecord::new(LogLevel::Info, "session_start", "scheduled cleanup")
                .with_session("abc-123")
                .with_detail("level", serde_json::json!("normal")),
        );
        log.write(&LogRecord::new(LogLevel::Error, "audit_degraded", "insert failed"));
        log.flush();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "session_start");
        assert_eq!(first["session_id"], "abc-123");
        assert_eq!(first["details"]["level"], "normal");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["level"], "error");
        // Absent session_id is omitted, not null.
        assert!(!lines[1].contains("session_id"));
    }

    #[test]
    fn rotation_shifts_files_and_keeps_cap() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut log) = open_small(dir.path(), 200);

        for i in 0..40 {
            log.write(&LogRecord::new(
                LogLevel::Info,
                "tick",
                format!("record number {i} with some padding text"),
            ));
        }
        log.flush();

        assert!(path.exists());
        assert!(rotated_name(&path, 1).exists());
        // Never more than max_rotated_files rotations.
        assert!(!rotated_name(&path, 6).exists());
    }

    #[test]
    fn write_at_exact_boundary_opens_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut log) = open_small(dir.path(), 512);

        // Fill to exactly the boundary, then one more write must rotate.
        let record = LogRecord::new(LogLevel::Info, "fill", "x");
        let line_len = serde_json::to_string(&record).unwrap().len() as u64 + 1;
        let mut written = 0;
        while written + line_len <= 512 {
            log.write(&record);
            written += line_len;
        }
        log.write(&record);
        log.flush();

        assert!(rotated_name(&path, 1).exists());
        let fresh = fs::read_to_string(&path).unwrap();
        assert_eq!(fresh.lines().count(), 1);
    }

    #[test]
    fn unwritable_path_degrades_without_panic() {
        let mut log = CleanupLog::open(
            PathBuf::from("/proc/definitely-not-writable/cleanup.log"),
            1024,
            3,
        );
        assert_ne!(log.state(), "normal");
        log.write(&LogRecord::new(LogLevel::Info, "tick", "still alive"));
    }
}
