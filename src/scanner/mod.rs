//! Parallel directory scanner: apparent-size accounting, per-category
//! aggregates, and deterministic top-N rankings.

pub mod top_n;
pub mod walker;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::core::cancel::CancelToken;
use crate::safety::{Category, category_of};
use crate::scanner::top_n::{AgeKey, BoundedTopN, SizeKey, age_key, size_key};

/// Scanner behavior and filters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    /// Files smaller than this are ignored entirely.
    pub min_size: u64,
    /// Include dot-files and dot-directories.
    pub include_hidden: bool,
    /// Maximum traversal depth below the root; `None` is unbounded.
    pub max_depth: Option<usize>,
    /// Follow symlinks during traversal.
    pub follow_symlinks: bool,
    /// Cross filesystem boundaries.
    pub cross_mounts: bool,
    /// Capacity of the top-N rankings.
    pub top_n: usize,
    /// Worker count; 0 means one per available core.
    pub parallelism: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_size: 0,
            include_hidden: false,
            max_depth: None,
            follow_symlinks: false,
            cross_mounts: false,
            top_n: 100,
            parallelism: 0,
        }
    }
}

/// One observed filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanItem {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub category: Option<Category>,
}

/// Per-category totals over the scanned set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryAggregate {
    pub size: u64,
    pub item_count: u64,
}

/// Aggregate outcome of one scan. Best-effort: unreadable entries land in
/// `errors` and contribute zero size.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub total_size: u64,
    pub file_count: u64,
    pub dir_count: u64,
    pub by_category: BTreeMap<Category, CategoryAggregate>,
    /// Largest files, size descending, path-lexicographic tiebreak.
    pub largest: Vec<ScanItem>,
    /// Oldest files, mtime ascending, path-lexicographic tiebreak.
    pub oldest: Vec<ScanItem>,
    pub errors: u64,
}

/// Per-worker partial aggregate, folded by the coordinator.
pub(crate) struct ScanAccumulator {
    total_size: u64,
    file_count: u64,
    dir_count: u64,
    by_category: BTreeMap<Category, CategoryAggregate>,
    largest: BoundedTopN<SizeKey>,
    oldest: BoundedTopN<AgeKey>,
    errors: u64,
}

impl ScanAccumulator {
    pub(crate) fn new(top_n: usize) -> Self {
        Self {
            total_size: 0,
            file_count: 0,
            dir_count: 0,
            by_category: BTreeMap::new(),
            largest: BoundedTopN::new(top_n),
            oldest: BoundedTopN::new(top_n),
            errors: 0,
        }
    }

    pub(crate) fn record_file(&mut self, path: &Path, size: u64, modified: Option<SystemTime>) {
        let category = category_of(path);
        self.total_size += size;
        self.file_count += 1;
        let slot = self.by_category.entry(category).or_default();
        slot.size += size;
        slot.item_count += 1;

        let item = ScanItem {
            path: path.to_path_buf(),
            size,
            modified,
            category: Some(category),
        };
        self.largest.push(size_key(&item), item.clone());
        if let Some(key) = age_key(&item) {
            self.oldest.push(key, item);
        }
    }

    pub(crate) fn record_dir(&mut self) {
        self.dir_count += 1;
    }

    pub(crate) fn record_error(&mut self) {
        self.errors += 1;
    }

    pub(crate) fn merge(&mut self, other: Self) {
        self.total_size += other.total_size;
        self.file_count += other.file_count;
        self.dir_count += other.dir_count;
        self.errors += other.errors;
        for (category, agg) in other.by_category {
            let slot = self.by_category.entry(category).or_default();
            slot.size += agg.size;
            slot.item_count += agg.item_count;
        }
        self.largest.merge(other.largest);
        self.oldest.merge(other.oldest);
    }

    pub(crate) fn finish(self) -> ScanResult {
        ScanResult {
            total_size: self.total_size,
            file_count: self.file_count,
            dir_count: self.dir_count,
            by_category: self.by_category,
            largest: self.largest.into_sorted(),
            oldest: self.oldest.into_sorted(),
            errors: self.errors,
        }
    }
}

/// Scan a directory tree under `root`.
///
/// A non-existent root yields an empty result rather than an error; a plain
/// file root is accounted as a single file.
#[must_use]
pub fn scan(root: &Path, config: &ScanConfig, cancel: &CancelToken) -> ScanResult {
    walker::walk(root, config, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(path: &Path, bytes: usize) {
        fs::write(path, vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn nonexistent_root_yields_empty_result() {
        let result = scan(
            Path::new("/definitely/does/not/exist"),
            &ScanConfig::default(),
            &CancelToken::new(),
        );
        assert_eq!(result.total_size, 0);
        assert_eq!(result.file_count, 0);
        assert_eq!(result.dir_count, 0);
        assert!(result.largest.is_empty());
    }

    #[test]
    fn counts_files_dirs_and_sizes() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        write_file(&tmp.path().join("a/x.bin"), 1000);
        write_file(&tmp.path().join("a/b/y.bin"), 2000);
        write_file(&tmp.path().join("z.bin"), 500);

        let result = scan(tmp.path(), &ScanConfig::default(), &CancelToken::new());
        assert_eq!(result.file_count, 3);
        assert_eq!(result.dir_count, 2);
        assert_eq!(result.total_size, 3500);
        assert_eq!(result.errors, 0);
    }

    #[test]
    fn category_sums_equal_totals() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        for (name, size) in [("a.bin", 100), ("nested/b.bin", 250), ("nested/c.bin", 50)] {
            write_file(&tmp.path().join(name), size);
        }

        let result = scan(tmp.path(), &ScanConfig::default(), &CancelToken::new());
        let cat_size: u64 = result.by_category.values().map(|a| a.size).sum();
        let cat_count: u64 = result.by_category.values().map(|a| a.item_count).sum();
        assert_eq!(cat_size, result.total_size);
        assert_eq!(cat_count, result.file_count);
    }

    #[test]
    fn min_size_filter_drops_small_files() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(&tmp.path().join("small.bin"), 10);
        write_file(&tmp.path().join("large.bin"), 10_000);

        let config = ScanConfig {
            min_size: 1000,
            ..Default::default()
        };
        let result = scan(tmp.path(), &config, &CancelToken::new());
        assert_eq!(result.file_count, 1);
        assert_eq!(result.total_size, 10_000);
    }

    #[test]
    fn hidden_entries_skipped_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join(".hidden_dir")).unwrap();
        write_file(&tmp.path().join(".hidden_dir/inside.bin"), 100);
        write_file(&tmp.path().join(".dotfile"), 100);
        write_file(&tmp.path().join("visible.bin"), 100);

        let result = scan(tmp.path(), &ScanConfig::default(), &CancelToken::new());
        assert_eq!(result.file_count, 1);
        assert_eq!(result.dir_count, 0);

        let config = ScanConfig {
            include_hidden: true,
            ..Default::default()
        };
        let all = scan(tmp.path(), &config, &CancelToken::new());
        assert_eq!(all.file_count, 3);
        assert_eq!(all.dir_count, 1);
    }

    #[test]
    fn max_depth_bounds_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("l1/l2/l3")).unwrap();
        write_file(&tmp.path().join("l1/one.bin"), 10);
        write_file(&tmp.path().join("l1/l2/two.bin"), 20);
        write_file(&tmp.path().join("l1/l2/l3/three.bin"), 30);

        let config = ScanConfig {
            max_depth: Some(2),
            ..Default::default()
        };
        let result = scan(tmp.path(), &config, &CancelToken::new());
        // Depth 1 = l1 and its files; depth 2 = l2 and its files. three.bin
        // sits at depth 3 and is out of reach.
        assert_eq!(result.file_count, 2);
        assert_eq!(result.total_size, 30);
    }

    #[test]
    fn file_root_counts_as_single_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("lone.bin");
        write_file(&file, 4096);

        let result = scan(&file, &ScanConfig::default(), &CancelToken::new());
        assert_eq!(result.file_count, 1);
        assert_eq!(result.total_size, 4096);
        assert_eq!(result.dir_count, 0);
    }

    #[test]
    fn top_n_is_deterministic_across_scans() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("d")).unwrap();
        // Several equal-sized files force the lexicographic tiebreak.
        for name in ["b.bin", "a.bin", "d/c.bin", "d/e.bin"] {
            write_file(&tmp.path().join(name), 777);
        }
        write_file(&tmp.path().join("big.bin"), 9999);

        let config = ScanConfig {
            top_n: 3,
            ..Default::default()
        };
        let first = scan(tmp.path(), &config, &CancelToken::new());
        let second = scan(tmp.path(), &config, &CancelToken::new());

        let a: Vec<&PathBuf> = first.largest.iter().map(|i| &i.path).collect();
        let b: Vec<&PathBuf> = second.largest.iter().map(|i| &i.path).collect();
        assert_eq!(a, b);
        assert_eq!(first.largest[0].path, tmp.path().join("big.bin"));
        assert_eq!(first.largest.len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_not_followed_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        let real = tmp.path().join("real");
        fs::create_dir_all(&real).unwrap();
        write_file(&real.join("data.bin"), 100);
        std::os::unix::fs::symlink(&real, tmp.path().join("link")).unwrap();

        let result = scan(tmp.path(), &ScanConfig::default(), &CancelToken::new());
        // data.bin reached once via "real", not twice via the symlink.
        assert_eq!(result.file_count, 1);
        assert_eq!(result.dir_count, 1);
    }

    #[test]
    fn cancelled_scan_returns_partial_quickly() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(&tmp.path().join("x.bin"), 10);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = scan(tmp.path(), &ScanConfig::default(), &cancel);
        // Already-cancelled scan discovers nothing new.
        assert_eq!(result.file_count, 0);
    }
}
