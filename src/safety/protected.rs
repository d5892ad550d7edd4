//! The immutable protected-path set.
//!
//! These prefixes must never be deleted regardless of user intent or cleanup
//! level. Changing this list requires a code change, not configuration —
//! that is the point.

use std::path::{Path, PathBuf};

use crate::core::paths::expand_tilde;

/// Prefix patterns that always classify as `Danger`. `~/` entries are
/// expanded against `$HOME` when the set is compiled.
pub const PROTECTED_PREFIXES: &[&str] = &[
    "/System",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/usr/lib",
    "/usr/libexec",
    "/usr/share",
    "/etc",
    "/private/etc",
    "/var/db",
    "/Applications",
    "/Library/Application Support",
    "/Library/Keychains",
    "~/Library/Keychains",
    "~/Library/Preferences",
    "~/Library/Application Support",
    "~/Documents",
    "~/Desktop",
];

/// Compiled protected set: prefix matching at path-component boundaries.
#[derive(Debug, Clone)]
pub struct ProtectedSet {
    prefixes: Vec<PathBuf>,
}

impl Default for ProtectedSet {
    fn default() -> Self {
        Self::compiled()
    }
}

impl ProtectedSet {
    /// Expand the compile-time prefix list against the current `$HOME`.
    #[must_use]
    pub fn compiled() -> Self {
        Self {
            prefixes: PROTECTED_PREFIXES
                .iter()
                .map(|p| expand_tilde(p))
                .collect(),
        }
    }

    /// Whether `path` is the protected prefix itself or anything beneath it.
    #[must_use]
    pub fn is_protected(&self, path: &Path) -> bool {
        self.matching_prefix(path).is_some()
    }

    /// The protected prefix covering `path`, if any.
    #[must_use]
    pub fn matching_prefix(&self, path: &Path) -> Option<&Path> {
        self.prefixes
            .iter()
            .map(PathBuf::as_path)
            .find(|prefix| path.starts_with(prefix))
    }

    /// Number of compiled prefixes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Whether the set is empty (it never is for the compiled set).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}
