//! Aggregated counters persisted to `metrics_stats.json` for external
//! exposition. The engine only accumulates; scraping and serving the file is
//! someone else's job.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cleaner::{CleanResult, TriggerKind};
use crate::core::errors::{CleanerError, Result};

/// Monotonic counters across all cleanups on this host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsStats {
    pub cleanups_total: u64,
    pub cleanups_by_trigger: BTreeMap<String, u64>,
    pub freed_bytes_total: u64,
    pub files_removed_total: u64,
    pub directories_removed_total: u64,
    pub errors_total: u64,
    pub last_cleanup_at: Option<String>,
}

/// Load-modify-store recorder over the metrics file.
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    path: PathBuf,
}

impl MetricsRecorder {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Current counters; a missing or corrupt file reads as zeroes.
    #[must_use]
    pub fn load(&self) -> MetricsStats {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    /// Fold one cleanup result into the counters and persist atomically.
    pub fn record(&self, result: &CleanResult, trigger: TriggerKind) -> Result<MetricsStats> {
        let mut stats = self.load();
        stats.cleanups_total += 1;
        *stats
            .cleanups_by_trigger
            .entry(trigger.as_str().to_string())
            .or_insert(0) += 1;
        stats.freed_bytes_total += result.freed_bytes;
        stats.files_removed_total += result.files_removed;
        stats.directories_removed_total += result.directories_removed;
        stats.errors_total += result.errors.len() as u64;
        stats.last_cleanup_at = Some(
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        );
        self.store(&stats)?;
        Ok(stats)
    }

    fn store(&self, stats: &MetricsStats) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| CleanerError::WriteFailed {
                path: parent.to_path_buf(),
                details: err.to_string(),
            })?;
        }
        let content = serde_json::to_string_pretty(stats)?;
        let staged = self.path.with_extension("json.tmp");
        fs::write(&staged, content).map_err(|err| CleanerError::WriteFailed {
            path: staged.clone(),
            details: err.to_string(),
        })?;
        fs::rename(&staged, &self.path).map_err(|err| CleanerError::WriteFailed {
            path: self.path.clone(),
            details: err.to_string(),
        })?;
        Ok(())
    }

    /// Path to the metrics file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
