//! Structured logging sidecars: rotating JSONL log of automated sessions and
//! the aggregated metrics counters file.

pub mod jsonl;
pub mod metrics;

pub use jsonl::{CleanupLog, LogLevel, LogRecord};
pub use metrics::{MetricsRecorder, MetricsStats};
