//! Configuration: resolved policy snapshot, engine settings, on-disk layout.
//!
//! The engine never loads team-policy documents itself — callers hand it a
//! resolved [`EffectivePolicy`]. The engine treats that snapshot as immutable
//! for the lifetime of a request.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{CleanerError, Result};
use crate::core::paths::home_dir;
use crate::safety::level::CleanupLevel;
use crate::scanner::ScanConfig;

/// Resolved, request-scoped view of user configuration, team-policy
/// overrides, and defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EffectivePolicy {
    /// Highest cleanup level this request may use.
    pub cleanup_level: CleanupLevel,
    /// When true, every request runs as dry-run regardless of its own flag.
    pub enforce_dry_run: bool,
    pub include_system_caches: bool,
    pub include_developer_caches: bool,
    pub include_browser_caches: bool,
    pub include_logs: bool,
    /// Exclusion globs: `**` crosses path separators, `*` does not.
    pub exclusion_globs: Vec<String>,
    /// Paths under a Safe root touched within this many days are promoted
    /// to Caution.
    pub age_days: u16,
}

impl Default for EffectivePolicy {
    fn default() -> Self {
        Self {
            cleanup_level: CleanupLevel::Normal,
            enforce_dry_run: false,
            include_system_caches: true,
            include_developer_caches: false,
            include_browser_caches: false,
            include_logs: true,
            exclusion_globs: Vec::new(),
            age_days: 7,
        }
    }
}

/// Full engine configuration model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub policy: EffectivePolicy,
    pub scanner: ScanConfig,
    pub audit: AuditConfig,
    pub log: LogConfig,
    pub paths: PathsConfig,
}

/// Audit store tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuditConfig {
    /// Events strictly older than this are pruned by retention.
    pub retention_days: u32,
    /// Compact the store after retention pruning.
    pub auto_vacuum: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: 365,
            auto_vacuum: false,
        }
    }
}

/// Rotating structured-log tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Rotation threshold in bytes.
    pub max_size_bytes: u64,
    /// Number of rotated files to keep.
    pub max_rotated_files: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 5,
        }
    }
}

/// Where persistent state lives. Everything sits under one data directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: home_dir().join(".config").join("osxcleaner"),
        }
    }
}

impl PathsConfig {
    pub fn audit_db(&self) -> PathBuf {
        self.data_dir.join("audit.db")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("logs").join("cleanup.log")
    }

    pub fn metrics_file(&self) -> PathBuf {
        self.data_dir.join("metrics_stats.json")
    }
}

impl Config {
    /// Load configuration from a TOML file. Missing keys fall back to
    /// defaults; a missing file is an error the caller decides about.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| CleanerError::io(path, source))?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        if self.audit.retention_days == 0 {
            return Err(CleanerError::InvalidConfig {
                details: "audit.retention_days must be at least 1".to_string(),
            });
        }
        if self.log.max_rotated_files == 0 {
            return Err(CleanerError::InvalidConfig {
                details: "log.max_rotated_files must be at least 1".to_string(),
            });
        }
        for glob in &self.policy.exclusion_globs {
            crate::safety::rules::validate_glob(glob)?;
        }
        Ok(())
    }
}
