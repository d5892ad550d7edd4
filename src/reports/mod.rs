//! Diagnostic-report analysis.

pub mod crash;

pub use crash::{AppCrashStats, CrashAnalysis, CrashReport, ReportType, parse_crash_reports};
