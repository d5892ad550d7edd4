//! Bounded top-N tracking with deterministic tiebreaks.
//!
//! Two rankings are kept during a scan: largest files by apparent size and
//! oldest files by mtime. Ties always break on lexicographic path order so
//! two scans of the same immutable tree produce identical sequences.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::scanner::ScanItem;

/// Ranking key: larger key = better (kept earlier in the final list).
pub type SizeKey = (u64, Reverse<PathBuf>);
/// Ranking key for oldest-first: smaller mtime ranks higher.
pub type AgeKey = (Reverse<SystemTime>, Reverse<PathBuf>);

/// Key for the largest-by-size ranking.
#[must_use]
pub fn size_key(item: &ScanItem) -> SizeKey {
    (item.size, Reverse(item.path.clone()))
}

/// Key for the oldest-by-mtime ranking, absent when the entry carries no
/// usable mtime.
#[must_use]
pub fn age_key(item: &ScanItem) -> Option<AgeKey> {
    item.modified
        .map(|mtime| (Reverse(mtime), Reverse(item.path.clone())))
}

struct Entry<K: Ord> {
    key: K,
    item: ScanItem,
}

impl<K: Ord> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl<K: Ord> Eq for Entry<K> {}
impl<K: Ord> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<K: Ord> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

/// Fixed-capacity collection of the N best-ranked items.
///
/// Internally a min-heap over the ranking key: the worst kept item sits at
/// the top and is evicted when something better arrives.
pub struct BoundedTopN<K: Ord> {
    capacity: usize,
    heap: BinaryHeap<Reverse<Entry<K>>>,
}

impl<K: Ord> BoundedTopN<K> {
    /// New collection keeping at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1)),
        }
    }

    /// Offer an item; it is kept only if it ranks inside the top N.
    pub fn push(&mut self, key: K, item: ScanItem) {
        if self.capacity == 0 {
            return;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(Entry { key, item }));
            return;
        }
        if let Some(Reverse(worst)) = self.heap.peek()
            && key > worst.key
        {
            self.heap.pop();
            self.heap.push(Reverse(Entry { key, item }));
        }
    }

    /// Fold another collection into this one (coordinator merge).
    pub fn merge(&mut self, other: Self) {
        for Reverse(entry) in other.heap {
            self.push(entry.key, entry.item);
        }
    }

    /// Consume into the final best-first ordering.
    #[must_use]
    pub fn into_sorted(self) -> Vec<ScanItem> {
        let mut entries: Vec<Entry<K>> = self.heap.into_iter().map(|Reverse(e)| e).collect();
        entries.sort_by(|a, b| b.key.cmp(&a.key));
        entries.into_iter().map(|e| e.item).collect()
    }

    /// Number of currently kept items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
