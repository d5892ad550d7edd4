//! Safety grades and cleanup levels.
//!
//! A [`SafetyGrade`] describes how risky deleting a path is; a
//! [`CleanupLevel`] is the ordinal authority grant capping which grades a
//! request may touch. `Danger` is never deletable, at any level.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Safety classification of a single path, ordered from harmless to
/// forbidden.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SafetyGrade {
    /// Routine: auto-regenerates (browser caches, trash).
    Safe = 1,
    /// Recreatable with cost (user caches, recent logs).
    Caution = 2,
    /// Requires re-download (device support, package caches).
    Warning = 3,
    /// Never delete: system damage risk.
    Danger = 4,
}

impl SafetyGrade {
    /// One step more dangerous, saturating at `Danger`.
    #[must_use]
    pub const fn escalate(self) -> Self {
        match self {
            Self::Safe => Self::Caution,
            Self::Caution => Self::Warning,
            Self::Warning | Self::Danger => Self::Danger,
        }
    }

    /// Whether deletion is ever permitted for this grade.
    #[must_use]
    pub const fn is_deletable(self) -> bool {
        !matches!(self, Self::Danger)
    }

    /// Lowercase wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

impl fmt::Display for SafetyGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authority grant for a cleanup request. Each level authorizes grades up to
/// its own ceiling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CleanupLevel {
    /// Safe only.
    Light = 1,
    /// Safe + Caution.
    Normal = 2,
    /// Up to Warning.
    Deep = 3,
    /// Up to Warning with system roots in scope (root privilege required).
    System = 4,
}

impl CleanupLevel {
    /// The highest grade deletable at this level. `Danger` is excluded even
    /// at `System`.
    #[must_use]
    pub const fn max_grade(self) -> SafetyGrade {
        match self {
            Self::Light => SafetyGrade::Safe,
            Self::Normal => SafetyGrade::Caution,
            Self::Deep | Self::System => SafetyGrade::Warning,
        }
    }

    /// Whether a path of the given grade may be deleted at this level.
    #[must_use]
    pub fn authorizes(self, grade: SafetyGrade) -> bool {
        grade.is_deletable() && grade <= self.max_grade()
    }

    /// Lowercase wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Normal => "normal",
            Self::Deep => "deep",
            Self::System => "system",
        }
    }
}

impl fmt::Display for CleanupLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
