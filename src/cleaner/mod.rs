//! Cleanup pipeline: request model, target expansion, retry policy, and the
//! executor that ties them to the audit substrate.

pub mod notify;
pub mod retry;
pub mod target;

#[cfg(feature = "sqlite")]
pub mod executor;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audit::event::EventResult;
use crate::core::cancel::CancelToken;
use crate::safety::level::CleanupLevel;

/// What initiated a cleanup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Manual,
    Scheduled,
    Monitor,
    Policy,
}

impl TriggerKind {
    /// Lowercase wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Monitor => "monitor",
            Self::Policy => "policy",
        }
    }

    /// Non-manual triggers run under an audit session.
    #[must_use]
    pub const fn is_sessioned(self) -> bool {
        !matches!(self, Self::Manual)
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cleanup request. Expanded into a target set by the executor.
#[derive(Debug, Clone)]
pub struct Request {
    pub level: CleanupLevel,
    pub include_system_caches: bool,
    pub include_developer_caches: bool,
    pub include_browser_caches: bool,
    pub include_logs: bool,
    pub dry_run: bool,
    /// Additional caller-chosen paths, processed as `Custom` targets.
    pub extra_paths: Vec<PathBuf>,
    pub trigger: TriggerKind,
    pub cancel: CancelToken,
}

impl Request {
    /// A request with nothing included; callers switch on what they want.
    #[must_use]
    pub fn new(level: CleanupLevel) -> Self {
        Self {
            level,
            include_system_caches: false,
            include_developer_caches: false,
            include_browser_caches: false,
            include_logs: false,
            dry_run: false,
            extra_paths: Vec::new(),
            trigger: TriggerKind::Manual,
            cancel: CancelToken::new(),
        }
    }
}

/// A single per-target failure surfaced in [`CleanResult::errors`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanErrorInfo {
    pub path: PathBuf,
    pub reason: String,
}

/// Aggregate outcome of one cleanup request.
#[derive(Debug, Clone)]
pub struct CleanResult {
    pub freed_bytes: u64,
    pub files_removed: u64,
    pub directories_removed: u64,
    pub errors: Vec<CleanErrorInfo>,
    pub duration: Duration,
    /// `Warning` after cooperative cancellation, `Success` otherwise.
    pub outcome: EventResult,
    pub targets_processed: u64,
    pub targets_skipped: u64,
    pub dry_run: bool,
}

impl CleanResult {
    /// Human-readable one-paragraph summary for CLI output and logs.
    #[must_use]
    pub fn summary(&self) -> String {
        let mode = if self.dry_run { " (dry-run)" } else { "" };
        format!(
            "freed {}{mode}: {} files, {} directories removed, {} skipped, {} errors in {:.2}s",
            format_size(self.freed_bytes),
            self.files_removed,
            self.directories_removed,
            self.targets_skipped,
            self.errors.len(),
            self.duration.as_secs_f64(),
        )
    }
}

/// Binary-unit size formatting (1 KiB = 1024 B).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_session_rule() {
        assert!(!TriggerKind::Manual.is_sessioned());
        assert!(TriggerKind::Scheduled.is_sessioned());
        assert!(TriggerKind::Monitor.is_sessioned());
        assert!(TriggerKind::Policy.is_sessioned());
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(3_670_016), "3.5 MiB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.0 GiB");
    }

    #[test]
    fn summary_mentions_dry_run() {
        let result = CleanResult {
            freed_bytes: 1024,
            files_removed: 0,
            directories_removed: 0,
            errors: Vec::new(),
            duration: Duration::from_millis(1500),
            outcome: EventResult::Success,
            targets_processed: 1,
            targets_skipped: 0,
            dry_run: true,
        };
        let text = result.summary();
        assert!(text.contains("dry-run"));
        assert!(text.contains("1.0 KiB"));
    }
}
