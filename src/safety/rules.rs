//! Category rules, exclusion globs, and the path classifier itself.
//!
//! Classification is a pure function of the path, the compiled protected
//! set, the policy exclusion snapshot, and the age heuristic. The rule table
//! is prefix-based; the longest (most specific) matching prefix wins, and
//! prefix rules always beat exclusion globs on specificity ties because the
//! protected/exclusion checks run first and short-circuit to `Danger`.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{CleanerError, Result};
use crate::core::paths::expand_tilde;
use crate::safety::level::SafetyGrade;
use crate::safety::process::RunningProcessProbe;
use crate::safety::protected::ProtectedSet;

// ──────────────────── categories ────────────────────

/// Semantic bucket of a cleanup target. A property of the *target*, not the
/// underlying bytes: the same file means different things reached through
/// different roots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SystemCache,
    DeveloperCache,
    BrowserCache,
    Logs,
    Downloads,
    Snapshots,
    CrashReports,
    Custom,
}

impl Category {
    /// Lowercase wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SystemCache => "system_cache",
            Self::DeveloperCache => "developer_cache",
            Self::BrowserCache => "browser_cache",
            Self::Logs => "logs",
            Self::Downloads => "downloads",
            Self::Snapshots => "snapshots",
            Self::CrashReports => "crash_reports",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────── category rules ────────────────────

struct CategoryRule {
    /// Prefix pattern; `~/` entries expand against `$HOME` at compile time
    /// of the classifier.
    prefix: &'static str,
    category: Category,
    grade: SafetyGrade,
    /// Whether this root is enumerated as a standard target when its
    /// category is requested.
    seed: bool,
}

const CATEGORY_RULES: &[CategoryRule] = &[
    // System and application caches.
    CategoryRule {
        prefix: "~/Library/Caches",
        category: Category::SystemCache,
        grade: SafetyGrade::Safe,
        seed: true,
    },
    CategoryRule {
        prefix: "/Library/Caches",
        category: Category::SystemCache,
        grade: SafetyGrade::Caution,
        seed: true,
    },
    CategoryRule {
        prefix: "/private/var/folders",
        category: Category::SystemCache,
        grade: SafetyGrade::Caution,
        seed: false,
    },
    CategoryRule {
        prefix: "/private/tmp",
        category: Category::SystemCache,
        grade: SafetyGrade::Safe,
        seed: false,
    },
    CategoryRule {
        prefix: "/tmp",
        category: Category::SystemCache,
        grade: SafetyGrade::Safe,
        seed: false,
    },
    // Browser stores. Longer prefixes than ~/Library/Caches, so they win.
    CategoryRule {
        prefix: "~/Library/Caches/com.apple.Safari",
        category: Category::BrowserCache,
        grade: SafetyGrade::Safe,
        seed: true,
    },
    CategoryRule {
        prefix: "~/Library/Caches/com.google.Chrome",
        category: Category::BrowserCache,
        grade: SafetyGrade::Safe,
        seed: true,
    },
    CategoryRule {
        prefix: "~/Library/Caches/Google/Chrome",
        category: Category::BrowserCache,
        grade: SafetyGrade::Safe,
        seed: true,
    },
    CategoryRule {
        prefix: "~/Library/Caches/org.mozilla.firefox",
        category: Category::BrowserCache,
        grade: SafetyGrade::Safe,
        seed: true,
    },
    CategoryRule {
        prefix: "~/Library/Caches/Firefox",
        category: Category::BrowserCache,
        grade: SafetyGrade::Safe,
        seed: true,
    },
    CategoryRule {
        prefix: "~/Library/Caches/BraveSoftware",
        category: Category::BrowserCache,
        grade: SafetyGrade::Safe,
        seed: true,
    },
    // Developer build detritus.
    CategoryRule {
        prefix: "~/Library/Developer/Xcode/DerivedData",
        category: Category::DeveloperCache,
        grade: SafetyGrade::Caution,
        seed: true,
    },
    CategoryRule {
        prefix: "~/Library/Developer/Xcode/iOS DeviceSupport",
        category: Category::DeveloperCache,
        grade: SafetyGrade::Warning,
        seed: true,
    },
    CategoryRule {
        prefix: "~/Library/Developer/CoreSimulator/Caches",
        category: Category::DeveloperCache,
        grade: SafetyGrade::Caution,
        seed: true,
    },
    CategoryRule {
        prefix: "~/Library/Caches/CocoaPods",
        category: Category::DeveloperCache,
        grade: SafetyGrade::Warning,
        seed: true,
    },
    CategoryRule {
        prefix: "~/.npm/_cacache",
        category: Category::DeveloperCache,
        grade: SafetyGrade::Warning,
        seed: true,
    },
    CategoryRule {
        prefix: "~/.cargo/registry/cache",
        category: Category::DeveloperCache,
        grade: SafetyGrade::Warning,
        seed: true,
    },
    CategoryRule {
        prefix: "~/.gradle/caches",
        category: Category::DeveloperCache,
        grade: SafetyGrade::Warning,
        seed: true,
    },
    CategoryRule {
        prefix: "~/.pub-cache",
        category: Category::DeveloperCache,
        grade: SafetyGrade::Warning,
        seed: false,
    },
    // Logs and diagnostic reports. DiagnosticReports is deliberately not a
    // seed: the ~/Library/Logs seed already covers that subtree.
    CategoryRule {
        prefix: "~/Library/Logs/DiagnosticReports",
        category: Category::CrashReports,
        grade: SafetyGrade::Safe,
        seed: false,
    },
    CategoryRule {
        prefix: "/Library/Logs/DiagnosticReports",
        category: Category::CrashReports,
        grade: SafetyGrade::Warning,
        seed: false,
    },
    CategoryRule {
        prefix: "~/Library/Logs",
        category: Category::Logs,
        grade: SafetyGrade::Safe,
        seed: true,
    },
    CategoryRule {
        prefix: "/Library/Logs",
        category: Category::Logs,
        grade: SafetyGrade::Warning,
        seed: false,
    },
    CategoryRule {
        prefix: "/var/log",
        category: Category::Logs,
        grade: SafetyGrade::Warning,
        seed: false,
    },
    CategoryRule {
        prefix: "/private/var/log",
        category: Category::Logs,
        grade: SafetyGrade::Warning,
        seed: false,
    },
    // Other buckets.
    CategoryRule {
        prefix: "~/Downloads",
        category: Category::Downloads,
        grade: SafetyGrade::Caution,
        seed: false,
    },
    CategoryRule {
        prefix: "/Volumes/com.apple.TimeMachine.localsnapshots",
        category: Category::Snapshots,
        grade: SafetyGrade::Warning,
        seed: false,
    },
];

/// Standard roots enumerated when `category` is requested in a cleanup.
#[must_use]
pub fn standard_paths(category: Category) -> Vec<PathBuf> {
    CATEGORY_RULES
        .iter()
        .filter(|rule| rule.seed && rule.category == category)
        .map(|rule| expand_tilde(rule.prefix))
        .collect()
}

/// Pure category lookup: longest matching rule prefix wins, no match is
/// `Custom`.
#[must_use]
pub fn category_of(path: &Path) -> Category {
    best_rule(path).map_or(Category::Custom, |rule| rule.category)
}

fn best_rule(path: &Path) -> Option<&'static CategoryRule> {
    let mut best: Option<(usize, &CategoryRule)> = None;
    for rule in CATEGORY_RULES {
        let prefix = expand_tilde(rule.prefix);
        if path.starts_with(&prefix) {
            let specificity = prefix.components().count();
            if best.is_none_or(|(depth, _)| specificity > depth) {
                best = Some((specificity, rule));
            }
        }
    }
    best.map(|(_, rule)| rule)
}

// ──────────────────── exclusion globs ────────────────────

#[derive(Debug, Clone)]
struct GlobPattern {
    original: String,
    compiled: Regex,
    /// For patterns ending in `/**`: the subtree base also matches, so a
    /// target equal to the base is dropped too (deleting the base would
    /// delete the excluded contents).
    base: Option<PathBuf>,
}

/// Compiled policy exclusion set.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    patterns: Vec<GlobPattern>,
}

impl ExclusionSet {
    /// Compile policy exclusion globs. `~/` expands against `$HOME`.
    pub fn new(globs: &[String]) -> Result<Self> {
        let patterns = globs
            .iter()
            .map(|glob| {
                let expanded = expand_tilde(glob).to_string_lossy().into_owned();
                let compiled = glob_to_regex(&expanded)?;
                let base = expanded
                    .strip_suffix("/**")
                    .map(PathBuf::from)
                    .filter(|b| !b.as_os_str().is_empty());
                Ok(GlobPattern {
                    original: glob.clone(),
                    compiled,
                    base,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// The original glob that excludes `path`, if any.
    ///
    /// The path itself and every ancestor are tested, so a pattern
    /// matching a directory shields everything beneath it.
    #[must_use]
    pub fn matching_glob(&self, path: &Path) -> Option<&str> {
        for pattern in &self.patterns {
            if pattern.base.as_deref() == Some(path) {
                return Some(&pattern.original);
            }
            let mut current = Some(path);
            while let Some(candidate) = current {
                let normalized = candidate.to_string_lossy().replace('\\', "/");
                if pattern.compiled.is_match(&normalized) {
                    return Some(&pattern.original);
                }
                current = candidate.parent();
            }
        }
        None
    }

    /// Whether any pattern excludes `path`.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        self.matching_glob(path).is_some()
    }

    /// Number of compiled patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Validate that a glob pattern can be compiled.
pub fn validate_glob(pattern: &str) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(CleanerError::InvalidConfig {
            details: "exclusion glob must not be empty".to_string(),
        });
    }
    glob_to_regex(pattern).map(|_| ())
}

/// Convert a shell-style glob pattern to a regex.
///
/// - `**/` matches any number of whole components (including none)
/// - `**`  matches anything, across separators
/// - `*`   matches anything except `/`
/// - `?`   matches a single character except `/`
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let normalized = pattern.replace('\\', "/");
    let mut regex_str = String::with_capacity(pattern.len() * 2);
    regex_str.push('^');

    let chars: Vec<char> = normalized.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                if i + 2 < chars.len() && chars[i + 2] == '/' {
                    regex_str.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    regex_str.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                regex_str.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                regex_str.push_str("[^/]");
                i += 1;
            }
            '.' | '+' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '$' | '|' | '\\' => {
                regex_str.push('\\');
                regex_str.push(chars[i]);
                i += 1;
            }
            c => {
                regex_str.push(c);
                i += 1;
            }
        }
    }

    regex_str.push('$');

    Regex::new(&regex_str).map_err(|err| CleanerError::InvalidConfig {
        details: format!("invalid glob pattern {pattern:?}: {err}"),
    })
}

// ──────────────────── classifier ────────────────────

/// Why a path is blocked outright, before any grade/level comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Empty or non-absolute input. Treated as dangerous.
    NotAbsolute,
    /// Covered by the compile-time protected set.
    Protected,
    /// Matched a policy exclusion glob (carries the original pattern).
    Excluded(String),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAbsolute => write!(f, "path is empty or not absolute"),
            Self::Protected => write!(f, "ProtectedPath"),
            Self::Excluded(glob) => write!(f, "PolicyExcluded({glob})"),
        }
    }
}

/// Full classification outcome for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub grade: SafetyGrade,
    pub category: Category,
    pub blocked: Option<BlockReason>,
}

/// Path classifier: protected set + policy exclusions + rule table + age
/// heuristic + optional running-process probe.
///
/// Pure and infallible: unknown inputs classify as `Custom`/`Caution`,
/// malformed inputs as `Danger`.
pub struct PathClassifier {
    protected: ProtectedSet,
    exclusions: ExclusionSet,
    age_days: u16,
    probe: Option<Arc<dyn RunningProcessProbe>>,
}

impl PathClassifier {
    /// Build a classifier from a policy snapshot.
    pub fn new(exclusion_globs: &[String], age_days: u16) -> Result<Self> {
        Ok(Self {
            protected: ProtectedSet::compiled(),
            exclusions: ExclusionSet::new(exclusion_globs)?,
            age_days,
            probe: None,
        })
    }

    /// Attach a running-process probe. Without one the running-app modifier
    /// is a no-op.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn RunningProcessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Classify a path: grade, category, and an optional hard-block reason.
    #[must_use]
    pub fn classify(&self, path: &Path) -> Classification {
        if path.as_os_str().is_empty() || !path.is_absolute() {
            return Classification {
                grade: SafetyGrade::Danger,
                category: Category::Custom,
                blocked: Some(BlockReason::NotAbsolute),
            };
        }

        let category = category_of(path);

        if self.protected.is_protected(path) {
            return Classification {
                grade: SafetyGrade::Danger,
                category,
                blocked: Some(BlockReason::Protected),
            };
        }

        if let Some(glob) = self.exclusions.matching_glob(path) {
            return Classification {
                grade: SafetyGrade::Danger,
                category,
                blocked: Some(BlockReason::Excluded(glob.to_string())),
            };
        }

        let mut grade = best_rule(path).map_or(SafetyGrade::Caution, |rule| rule.grade);

        // Recently touched Safe roots get a bump: an actively used cache is
        // not free to delete.
        if grade == SafetyGrade::Safe && self.recently_touched(path) {
            grade = SafetyGrade::Caution;
        }

        if let Some(probe) = &self.probe
            && let Some(bundle_id) = bundle_id_component(path)
            && probe.is_running(&bundle_id)
        {
            grade = grade.escalate();
        }

        Classification {
            grade,
            category,
            blocked: None,
        }
    }

    /// Grade only. Blocked paths grade as `Danger`.
    #[must_use]
    pub fn grade(&self, path: &Path) -> SafetyGrade {
        self.classify(path).grade
    }

    /// The compiled policy exclusion set (shared with target expansion).
    #[must_use]
    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    fn recently_touched(&self, path: &Path) -> bool {
        let Ok(meta) = std::fs::symlink_metadata(path) else {
            return false;
        };
        let Ok(modified) = meta.modified() else {
            return false;
        };
        within_age_window(modified, self.age_days)
    }
}

/// Whether `modified` falls inside the promotion window of `age_days`.
/// Future mtimes (clock skew) count as recent.
fn within_age_window(modified: SystemTime, age_days: u16) -> bool {
    let window = Duration::from_secs(u64::from(age_days) * 86_400);
    SystemTime::now()
        .duration_since(modified)
        .is_ok_and(|age| age < window)
        || modified > SystemTime::now()
}

/// The last path component that looks like a reverse-DNS bundle id
/// (`com.apple.Safari`), if any.
fn bundle_id_component(path: &Path) -> Option<String> {
    path.components().rev().find_map(|component| {
        let text = component.as_os_str().to_string_lossy();
        let segments: Vec<&str> = text.split('.').collect();
        let looks_like_bundle = segments.len() >= 3
            && segments.iter().all(|s| {
                !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            });
        looks_like_bundle.then(|| text.into_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::process::RunningProcessProbe;

    fn classifier() -> PathClassifier {
        PathClassifier::new(&[], 7).unwrap()
    }

    #[test]
    fn protected_paths_are_danger() {
        let c = classifier();
        let verdict = c.classify(Path::new("/System/Library/CoreServices"));
        assert_eq!(verdict.grade, SafetyGrade::Danger);
        assert_eq!(verdict.blocked, Some(BlockReason::Protected));
    }

    #[test]
    fn relative_and_empty_paths_are_danger() {
        let c = classifier();
        assert_eq!(c.grade(Path::new("")), SafetyGrade::Danger);
        assert_eq!(c.grade(Path::new("Library/Caches")), SafetyGrade::Danger);
    }

    #[test]
    fn excluded_glob_is_danger_with_pattern() {
        let globs = vec!["~/Library/Caches/com.apple.Safari/**".to_string()];
        let c = PathClassifier::new(&globs, 7).unwrap();
        let inside = expand_tilde("~/Library/Caches/com.apple.Safari/WebKitCache/blob");
        let verdict = c.classify(&inside);
        assert_eq!(verdict.grade, SafetyGrade::Danger);
        assert!(matches!(verdict.blocked, Some(BlockReason::Excluded(_))));

        // The subtree base itself is also dropped.
        let base = expand_tilde("~/Library/Caches/com.apple.Safari");
        assert!(c.classify(&base).blocked.is_some());

        // Siblings are untouched.
        let sibling = expand_tilde("~/Library/Caches/com.google.Chrome");
        assert!(c.classify(&sibling).blocked.is_none());
    }

    #[test]
    fn category_lookup_longest_prefix_wins() {
        assert_eq!(
            category_of(&expand_tilde("~/Library/Caches/com.apple.Safari/WebKitCache")),
            Category::BrowserCache
        );
        assert_eq!(
            category_of(&expand_tilde("~/Library/Caches/com.example.app")),
            Category::SystemCache
        );
        assert_eq!(
            category_of(&expand_tilde("~/Library/Logs/DiagnosticReports/Safari.ips")),
            Category::CrashReports
        );
        assert_eq!(
            category_of(&expand_tilde("~/Library/Logs/app.log")),
            Category::Logs
        );
        assert_eq!(
            category_of(&expand_tilde("~/Library/Caches/CocoaPods/Pods")),
            Category::DeveloperCache
        );
    }

    #[test]
    fn unknown_paths_are_custom_caution() {
        let c = classifier();
        let verdict = c.classify(Path::new("/data/projects/foo"));
        assert_eq!(verdict.category, Category::Custom);
        assert_eq!(verdict.grade, SafetyGrade::Caution);
        assert!(verdict.blocked.is_none());
    }

    #[test]
    fn age_window_promotes_fresh_and_ignores_stale() {
        let now = SystemTime::now();
        assert!(within_age_window(now, 7));
        assert!(within_age_window(now - Duration::from_secs(6 * 86_400), 7));
        assert!(!within_age_window(now - Duration::from_secs(8 * 86_400), 7));
        // Clock skew: a future mtime is treated as recent.
        assert!(within_age_window(now + Duration::from_secs(3600), 7));
    }

    #[test]
    fn nonexistent_safe_path_keeps_safe_grade() {
        let c = classifier();
        let gone = expand_tilde("~/Library/Caches/com.apple.Safari/never-existed-xyz");
        // No metadata => no age promotion.
        assert_eq!(c.grade(&gone), SafetyGrade::Safe);
    }

    #[test]
    fn standard_paths_per_category() {
        let browsers = standard_paths(Category::BrowserCache);
        assert!(browsers.contains(&expand_tilde("~/Library/Caches/com.apple.Safari")));
        assert!(browsers.len() >= 4);

        let logs = standard_paths(Category::Logs);
        assert_eq!(logs, vec![expand_tilde("~/Library/Logs")]);

        // CrashReports intentionally has no seeds (covered by the Logs root).
        assert!(standard_paths(Category::CrashReports).is_empty());
        assert!(standard_paths(Category::Custom).is_empty());
    }

    struct EverythingRuns;
    impl RunningProcessProbe for EverythingRuns {
        fn is_running(&self, _bundle_id: &str) -> bool {
            true
        }
    }

    #[test]
    fn running_probe_escalates_one_step() {
        let globs: Vec<String> = Vec::new();
        let c = PathClassifier::new(&globs, 7)
            .unwrap()
            .with_probe(Arc::new(EverythingRuns));
        let path = expand_tilde("~/Library/Caches/com.apple.Safari/gone-subdir");
        // Safe (nonexistent => no age bump) escalated to Caution.
        assert_eq!(c.grade(&path), SafetyGrade::Caution);

        // Paths without a bundle-id component are untouched by the probe.
        let plain = expand_tilde("~/Library/Logs/missing.log");
        assert_eq!(c.grade(&plain), SafetyGrade::Safe);
    }

    #[test]
    fn bundle_id_detection() {
        assert_eq!(
            bundle_id_component(Path::new("/x/com.apple.Safari/Cache")),
            Some("com.apple.Safari".to_string())
        );
        assert_eq!(bundle_id_component(Path::new("/x/Google/Chrome")), None);
        assert_eq!(bundle_id_component(Path::new("/x/archive.tar.gz")), None);
    }

    #[test]
    fn glob_star_does_not_cross_separators() {
        let set = ExclusionSet::new(&["/data/*/cache".to_string()]).unwrap();
        assert!(set.matches(Path::new("/data/app/cache")));
        assert!(!set.matches(Path::new("/data/app/deep/cache")));
    }

    #[test]
    fn glob_double_star_crosses_separators() {
        let set = ExclusionSet::new(&["/data/**/cache".to_string()]).unwrap();
        assert!(set.matches(Path::new("/data/app/cache")));
        assert!(set.matches(Path::new("/data/app/deep/cache")));
        assert!(set.matches(Path::new("/data/cache")));
        assert!(!set.matches(Path::new("/data/app/cache2")));
    }

    #[test]
    fn empty_glob_rejected() {
        assert!(validate_glob("").is_err());
        assert!(validate_glob("  ").is_err());
        assert!(validate_glob("/ok/*").is_ok());
    }

    #[test]
    fn brackets_in_glob_are_literal() {
        let set = ExclusionSet::new(&["/tmp/[build]".to_string()]).unwrap();
        assert!(set.matches(Path::new("/tmp/[build]")));
        assert!(!set.matches(Path::new("/tmp/b")));
    }
}
