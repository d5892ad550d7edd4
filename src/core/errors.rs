//! OXC-prefixed error types with structured error codes.
//!
//! Error *kind* is the stable, machine-parseable part (the variant plus its
//! `OXC-NNNN` code); user-facing formatting happens at the CLI edge.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, CleanerError>;

/// Top-level error type for the cleanup engine.
#[derive(Debug, Error)]
pub enum CleanerError {
    #[error("[OXC-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[OXC-1002] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[OXC-2001] protected path may never be deleted: {path}")]
    ProtectedPath { path: PathBuf },

    #[error("[OXC-2002] path excluded by policy pattern {pattern:?}: {path}")]
    PolicyExcluded { path: PathBuf, pattern: String },

    #[error("[OXC-2003] target set is empty after exclusion filtering")]
    EmptyTargetSet,

    #[error("[OXC-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[OXC-3001] transient IO failure at {path}: {source}")]
    TransientIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[OXC-3002] IO failure at {path}: {source}")]
    PermanentIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[OXC-3003] operation cancelled")]
    Cancelled,

    #[error("[OXC-3004] host utility {utility} exceeded {limit_secs}s and was killed")]
    UtilityTimeout { utility: String, limit_secs: u64 },

    #[error("[OXC-4001] audit store open failure at {path}: {details}")]
    AuditOpen { path: PathBuf, details: String },

    #[error("[OXC-4002] audit schema creation failure: {details}")]
    AuditSchema { details: String },

    #[error("[OXC-4003] audit insert failure: {details}")]
    AuditInsert { details: String },

    #[error("[OXC-4004] audit query failure: {details}")]
    AuditQuery { details: String },

    #[error("[OXC-4005] duplicate audit event id: {id}")]
    DuplicateEvent { id: String },

    #[error("[OXC-4006] audit store unavailable: {details}")]
    AuditUnavailable { details: String },

    #[error("[OXC-5001] export encoding failure: {details}")]
    EncodingFailed { details: String },

    #[error("[OXC-5002] export write failure at {path}: {details}")]
    WriteFailed { path: PathBuf, details: String },

    #[error("[OXC-5003] no events to export")]
    NoEventsToExport,
}

impl CleanerError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "OXC-1001",
            Self::ConfigParse { .. } => "OXC-1002",
            Self::ProtectedPath { .. } => "OXC-2001",
            Self::PolicyExcluded { .. } => "OXC-2002",
            Self::EmptyTargetSet => "OXC-2003",
            Self::Serialization { .. } => "OXC-2101",
            Self::TransientIo { .. } => "OXC-3001",
            Self::PermanentIo { .. } => "OXC-3002",
            Self::Cancelled => "OXC-3003",
            Self::UtilityTimeout { .. } => "OXC-3004",
            Self::AuditOpen { .. } => "OXC-4001",
            Self::AuditSchema { .. } => "OXC-4002",
            Self::AuditInsert { .. } => "OXC-4003",
            Self::AuditQuery { .. } => "OXC-4004",
            Self::DuplicateEvent { .. } => "OXC-4005",
            Self::AuditUnavailable { .. } => "OXC-4006",
            Self::EncodingFailed { .. } => "OXC-5001",
            Self::WriteFailed { .. } => "OXC-5002",
            Self::NoEventsToExport => "OXC-5003",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo { .. })
    }

    /// Classify an `io::Error` into `TransientIo` or `PermanentIo` for a path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if io_error_is_transient(&source) {
            Self::TransientIo { path, source }
        } else {
            Self::PermanentIo { path, source }
        }
    }
}

/// Transient conditions: resource busy, temporarily unavailable, interrupted
/// syscall, momentary lock contention. Everything else is permanent.
#[must_use]
pub fn io_error_is_transient(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::ResourceBusy
        | ErrorKind::WouldBlock
        | ErrorKind::Interrupted
        | ErrorKind::TimedOut => true,
        ErrorKind::NotFound
        | ErrorKind::PermissionDenied
        | ErrorKind::ReadOnlyFilesystem
        | ErrorKind::StorageFull
        | ErrorKind::InvalidInput => false,
        _ => {
            // Raw errno fallback for kinds std does not map on this platform.
            #[cfg(unix)]
            {
                matches!(
                    err.raw_os_error(),
                    Some(libc::EAGAIN | libc::EBUSY | libc::EINTR)
                )
            }
            #[cfg(not(unix))]
            {
                false
            }
        }
    }
}

impl From<serde_json::Error> for CleanerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for CleanerError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
