//! Crash-report filename parsing and per-application aggregation.
//!
//! Diagnostic report names come in two shapes:
//! `AppName_YYYY-MM-DD-HHMMSS_Machine.ext` and
//! `AppName-YYYY-MM-DD-HHMMSS.ext`. The parser looks for the date pattern
//! after a `_` or `-` delimiter; everything before the delimiter is the
//! application name. Names that match neither shape are not dropped — the
//! whole stem becomes the app name and the file's mtime stands in for the
//! report time.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

/// Report flavors by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReportType {
    Crash,
    Ips,
    Spin,
    Hang,
    Diag,
}

impl ReportType {
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "crash" => Some(Self::Crash),
            "ips" => Some(Self::Ips),
            "spin" => Some(Self::Spin),
            "hang" => Some(Self::Hang),
            "diag" => Some(Self::Diag),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crash => "crash",
            Self::Ips => "ips",
            Self::Spin => "spin",
            Self::Hang => "hang",
            Self::Diag => "diag",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One diagnostic report on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    pub path: PathBuf,
    pub app_name: String,
    pub timestamp: DateTime<Utc>,
    pub report_type: ReportType,
    pub size: u64,
}

/// Per-application crash histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCrashStats {
    pub count: u64,
    pub latest: DateTime<Utc>,
    pub oldest: DateTime<Utc>,
    pub total_bytes: u64,
    /// More than five reports for one app points at a recurring problem.
    pub has_repeated_crashes: bool,
}

/// Aggregate over a report directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrashAnalysis {
    pub by_app: BTreeMap<String, AppCrashStats>,
    pub total_reports: u64,
    pub total_size: u64,
    /// Reports older than 30 days: candidates for cleanup.
    pub old_reports: u64,
    pub old_bytes: u64,
}

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[_-](\d{4}-\d{2}-\d{2})(?:-(\d{6}))?").expect("static regex")
});

/// Parsed pieces of a report filename (before mtime fallback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub app_name: String,
    pub timestamp: Option<NaiveDateTime>,
    pub report_type: ReportType,
}

/// Parse one filename. Returns `None` only for unknown extensions.
#[must_use]
pub fn parse_filename(filename: &str) -> Option<ParsedName> {
    let (stem, ext) = filename.rsplit_once('.')?;
    let report_type = ReportType::from_extension(ext)?;

    let Some(captures) = DATE_PATTERN.captures(stem) else {
        return Some(ParsedName {
            app_name: stem.to_string(),
            timestamp: None,
            report_type,
        });
    };

    let full = captures.get(0).expect("whole match");
    let app_name = stem[..full.start()].to_string();
    if app_name.is_empty() {
        // Date with nothing before it: treat the stem as the name.
        return Some(ParsedName {
            app_name: stem.to_string(),
            timestamp: None,
            report_type,
        });
    }

    let date = captures.get(1).expect("date group").as_str();
    let timestamp = match captures.get(2) {
        Some(time) => NaiveDateTime::parse_from_str(
            &format!("{date}-{}", time.as_str()),
            "%Y-%m-%d-%H%M%S",
        )
        .ok(),
        None => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
    };

    Some(ParsedName {
        app_name,
        timestamp,
        report_type,
    })
}

/// Read a directory of diagnostic reports. Files with unknown extensions
/// are ignored; unreadable files are skipped.
#[must_use]
pub fn scan_reports(dir: &Path) -> Vec<CrashReport> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut reports = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let Some(parsed) = parse_filename(&filename) else {
            continue;
        };

        let timestamp = parsed
            .timestamp
            .map(|naive| Utc.from_utc_datetime(&naive))
            .or_else(|| meta.modified().ok().map(DateTime::<Utc>::from))
            .unwrap_or_else(Utc::now);

        reports.push(CrashReport {
            path,
            app_name: parsed.app_name,
            timestamp,
            report_type: parsed.report_type,
            size: meta.len(),
        });
    }

    // Deterministic order for downstream display.
    reports.sort_by(|a, b| a.path.cmp(&b.path));
    reports
}

/// Group reports per app and compute global totals.
#[must_use]
pub fn analyze(reports: &[CrashReport]) -> CrashAnalysis {
    let mut analysis = CrashAnalysis::default();
    let cutoff = Utc::now() - chrono::Duration::days(30);

    for report in reports {
        analysis.total_reports += 1;
        analysis.total_size += report.size;
        if report.timestamp < cutoff {
            analysis.old_reports += 1;
            analysis.old_bytes += report.size;
        }

        analysis
            .by_app
            .entry(report.app_name.clone())
            .and_modify(|stats| {
                stats.count += 1;
                stats.total_bytes += report.size;
                stats.latest = stats.latest.max(report.timestamp);
                stats.oldest = stats.oldest.min(report.timestamp);
                stats.has_repeated_crashes = stats.count > 5;
            })
            .or_insert_with(|| AppCrashStats {
                count: 1,
                latest: report.timestamp,
                oldest: report.timestamp,
                total_bytes: report.size,
                has_repeated_crashes: false,
            });
    }

    analysis
}

/// Library surface: scan a directory and aggregate in one step.
#[must_use]
pub fn parse_crash_reports(dir: &Path) -> CrashAnalysis {
    analyze(&scan_reports(dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_underscore_machine_form() {
        let parsed = parse_filename("Safari_2025-11-20-101500_Mac.ips").unwrap();
        assert_eq!(parsed.app_name, "Safari");
        assert_eq!(parsed.report_type, ReportType::Ips);
        let ts = parsed.timestamp.unwrap();
        assert_eq!(ts.to_string(), "2025-11-20 10:15:00");
    }

    #[test]
    fn parses_dash_form() {
        let parsed = parse_filename("Xcode-2025-01-05-120000.crash").unwrap();
        assert_eq!(parsed.app_name, "Xcode");
        assert_eq!(parsed.report_type, ReportType::Crash);
        assert_eq!(parsed.timestamp.unwrap().to_string(), "2025-01-05 12:00:00");
    }

    #[test]
    fn app_names_may_contain_delimiters() {
        let parsed = parse_filename("Google-Chrome-Helper_2025-03-01-090000_Mac.hang").unwrap();
        assert_eq!(parsed.app_name, "Google-Chrome-Helper");
        assert!(parsed.timestamp.is_some());
    }

    #[test]
    fn unparseable_stem_is_kept_whole() {
        let parsed = parse_filename("weirdreport.diag").unwrap();
        assert_eq!(parsed.app_name, "weirdreport");
        assert!(parsed.timestamp.is_none());
    }

    #[test]
    fn date_without_time_parses_at_midnight() {
        let parsed = parse_filename("App_2025-06-01.spin").unwrap();
        assert_eq!(parsed.app_name, "App");
        assert_eq!(parsed.timestamp.unwrap().to_string(), "2025-06-01 00:00:00");
    }

    #[test]
    fn unknown_extension_rejected() {
        assert!(parse_filename("Safari_2025-11-20-101500.txt").is_none());
        assert!(parse_filename("no-extension").is_none());
    }

    #[test]
    fn all_known_extensions_parse() {
        for ext in ["crash", "ips", "spin", "hang", "diag"] {
            assert!(parse_filename(&format!("App_2025-01-01-000000.{ext}")).is_some());
        }
    }

    #[test]
    fn scan_and_aggregate_matches_expected_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, kib: usize| {
            fs::write(dir.path().join(name), vec![0u8; kib * 1024]).unwrap();
        };
        write("Safari_2025-11-20-101500_Mac.ips", 50);
        write("Safari_2025-11-22-083000_Mac.ips", 60);
        write("Xcode-2025-01-05-120000.crash", 80);
        // Ignored: wrong extension.
        write("notes.txt", 5);

        let analysis = parse_crash_reports(dir.path());

        assert_eq!(analysis.total_reports, 3);
        assert_eq!(analysis.total_size, 192_560);
        assert_eq!(analysis.by_app.len(), 2);

        let safari = &analysis.by_app["Safari"];
        assert_eq!(safari.count, 2);
        assert_eq!(safari.total_bytes, 112_640);
        assert_eq!(
            safari.latest,
            Utc.with_ymd_and_hms(2025, 11, 22, 8, 30, 0).unwrap()
        );
        assert_eq!(
            safari.oldest,
            Utc.with_ymd_and_hms(2025, 11, 20, 10, 15, 0).unwrap()
        );
        assert!(!safari.has_repeated_crashes);

        let xcode = &analysis.by_app["Xcode"];
        assert_eq!(xcode.count, 1);
        assert_eq!(xcode.total_bytes, 81_920);
    }

    #[test]
    fn repeated_crashes_flagged_above_five() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..6 {
            fs::write(
                dir.path().join(format!("Flaky_2025-01-0{}-010101_Mac.crash", i + 1)),
                b"x",
            )
            .unwrap();
        }
        let analysis = parse_crash_reports(dir.path());
        assert!(analysis.by_app["Flaky"].has_repeated_crashes);
    }

    #[test]
    fn old_reports_bucketed_by_age() {
        let dir = tempfile::tempdir().unwrap();
        // Timestamps in the filename drive the age bucket.
        fs::write(dir.path().join("Old_2020-01-01-000000_Mac.crash"), vec![0u8; 100]).unwrap();
        let recent = Utc::now().format("Recent_%Y-%m-%d-%H%M%S_Mac.crash").to_string();
        fs::write(dir.path().join(recent), vec![0u8; 200]).unwrap();

        let analysis = parse_crash_reports(dir.path());
        assert_eq!(analysis.total_reports, 2);
        assert_eq!(analysis.old_reports, 1);
        assert_eq!(analysis.old_bytes, 100);
    }

    #[test]
    fn mtime_fallback_for_unparseable_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbled.crash");
        fs::write(&path, vec![0u8; 10]).unwrap();
        let old = std::time::SystemTime::now() - std::time::Duration::from_secs(90 * 86_400);
        filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(old)).unwrap();

        let reports = scan_reports(dir.path());
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].app_name, "garbled");

        // Still contributes to totals and lands in the old bucket.
        let analysis = analyze(&reports);
        assert_eq!(analysis.total_reports, 1);
        assert_eq!(analysis.old_reports, 1);
    }

    #[test]
    fn missing_directory_is_empty_analysis() {
        let analysis = parse_crash_reports(Path::new("/no/such/dir"));
        assert_eq!(analysis, CrashAnalysis::default());
    }
}
