//! Optional notification seam.
//!
//! Delivery (notification center, mail, whatever) belongs to the host
//! integration; the engine only announces. Absence of a notifier is not an
//! error.

use crate::cleaner::CleanResult;

/// Receives engine announcements.
pub trait Notifier: Send + Sync {
    /// A cleanup request finished (including dry-run).
    fn cleanup_completed(&self, result: &CleanResult);

    /// Free space on a volume crossed a configured threshold.
    fn disk_threshold(&self, _volume: &str, _free_pct: f64) {}
}
