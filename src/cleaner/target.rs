//! Target expansion: request flags + standard category roots + extra paths,
//! filtered through policy exclusions and ordered deepest-first.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::cleaner::Request;
use crate::core::paths::normalize_absolute;
use crate::safety::rules::{Category, ExclusionSet, standard_paths};

/// A path the executor intends to process, with the reason it was collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub path: PathBuf,
    pub category: Category,
    pub intent: String,
}

impl Target {
    fn standard(path: PathBuf, category: Category) -> Self {
        Self {
            path,
            category,
            intent: format!("{category} inclusion requested"),
        }
    }

    fn custom(path: PathBuf) -> Self {
        Self {
            path,
            category: Category::Custom,
            intent: "explicit extra path".to_string(),
        }
    }
}

/// Expand a request into its target set.
///
/// Standard roots whose path matches an exclusion glob are dropped here,
/// before classification — they were engine-chosen, so there is nothing to
/// report. Caller-supplied extra paths are kept and surface later as
/// `Skipped` events so the caller sees why nothing happened.
#[must_use]
pub fn build_targets(request: &Request, exclusions: &ExclusionSet) -> Vec<Target> {
    let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
    let mut targets = Vec::new();

    let mut push = |target: Target| {
        if seen.insert(target.path.clone()) {
            targets.push(target);
        }
    };

    let flags = [
        (request.include_system_caches, Category::SystemCache),
        (request.include_developer_caches, Category::DeveloperCache),
        (request.include_browser_caches, Category::BrowserCache),
        (request.include_logs, Category::Logs),
    ];
    for (included, category) in flags {
        if !included {
            continue;
        }
        for path in standard_paths(category) {
            if exclusions.matches(&path) {
                continue;
            }
            push(Target::standard(path, category));
        }
    }

    for extra in &request.extra_paths {
        push(Target::custom(normalize_absolute(extra)));
    }

    order_deepest_first(&mut targets);
    targets
}

/// Deepest paths first, so a subtree target always completes before any
/// target that is its prefix; equal depths order lexicographically for
/// determinism.
pub fn order_deepest_first(targets: &mut [Target]) {
    targets.sort_by(|a, b| {
        depth(&b.path)
            .cmp(&depth(&a.path))
            .then_with(|| a.path.cmp(&b.path))
    });
}

fn depth(path: &Path) -> usize {
    path.components().count()
}
