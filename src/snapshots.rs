//! Local volume snapshot enumeration and deletion.
//!
//! Thin wrapper over a host-provided utility (`tmutil` on macOS). The
//! utility gets a hard wall-clock budget; past it the process is killed and
//! the invocation counts as a permanent failure. Snapshot sizes are not
//! reliably reported by the host tooling, so `size` stays optional and
//! callers must tolerate its absence.

#![allow(missing_docs)]

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::core::errors::{CleanerError, Result};

/// Default wall-clock budget for one utility invocation.
pub const UTILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// One local snapshot as reported by the host utility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Utility-native identifier, e.g.
    /// `com.apple.TimeMachine.2025-11-20-101500.local`.
    pub id: String,
    pub date: Option<DateTime<Utc>>,
    pub volume: String,
    /// Unknown unless the utility happens to report it.
    pub size: Option<u64>,
}

/// Host-utility wrapper.
#[derive(Debug, Clone)]
pub struct SnapshotService {
    utility: PathBuf,
    timeout: Duration,
}

impl Default for SnapshotService {
    fn default() -> Self {
        Self {
            utility: PathBuf::from("tmutil"),
            timeout: UTILITY_TIMEOUT,
        }
    }
}

impl SnapshotService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the utility binary (tests, alternate hosts).
    #[must_use]
    pub fn with_utility(mut self, utility: PathBuf) -> Self {
        self.utility = utility;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// List local snapshots of `volume`.
    pub fn list_snapshots(&self, volume: &str) -> Result<Vec<SnapshotInfo>> {
        let output = self.run(&["listlocalsnapshots", volume])?;
        Ok(parse_snapshot_lines(&output, volume))
    }

    /// Delete one snapshot by utility-native id or date token.
    pub fn delete_snapshot(&self, id_or_date: &str) -> Result<()> {
        let token = id_or_date
            .strip_prefix("com.apple.TimeMachine.")
            .and_then(|rest| rest.strip_suffix(".local"))
            .unwrap_or(id_or_date);
        self.run(&["deletelocalsnapshots", token]).map(|_| ())
    }

    /// Run the utility with a kill-on-timeout guard.
    fn run(&self, args: &[&str]) -> Result<String> {
        let mut child = Command::new(&self.utility)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| CleanerError::io(&self.utility, err))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let mut output = String::new();
                    if let Some(mut stdout) = child.stdout.take() {
                        let _ = stdout.read_to_string(&mut output);
                    }
                    if status.success() {
                        return Ok(output);
                    }
                    return Err(CleanerError::PermanentIo {
                        path: self.utility.clone(),
                        source: std::io::Error::other(format!(
                            "utility exited with {status}"
                        )),
                    });
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(CleanerError::UtilityTimeout {
                            utility: self.utility.to_string_lossy().into_owned(),
                            limit_secs: self.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(err) => return Err(CleanerError::io(&self.utility, err)),
            }
        }
    }
}

/// Parse `listlocalsnapshots` output lines into snapshot records.
fn parse_snapshot_lines(output: &str, volume: &str) -> Vec<SnapshotInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.contains("com.apple.TimeMachine."))
        .map(|line| SnapshotInfo {
            id: line.to_string(),
            date: parse_snapshot_date(line),
            volume: volume.to_string(),
            size: None,
        })
        .collect()
}

/// `com.apple.TimeMachine.2025-11-20-101500.local` → the embedded UTC time.
fn parse_snapshot_date(id: &str) -> Option<DateTime<Utc>> {
    let token = id
        .strip_prefix("com.apple.TimeMachine.")?
        .strip_suffix(".local")?;
    NaiveDateTime::parse_from_str(token, "%Y-%m-%d-%H%M%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
