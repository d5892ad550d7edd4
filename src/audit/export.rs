//! Audit export: JSON, JSONL, CSV, and a human-readable statistics report.
//!
//! Every format is UTF-8 and every file write is atomic: content is staged
//! to a sibling temp file and renamed into place, so a failed export never
//! leaves a partial file behind.

#![allow(missing_docs)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::audit::event::{Event, Statistics, hostname};
use crate::core::errors::{CleanerError, Result};

/// Supported export encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    JsonLines,
    Csv,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::JsonLines => "jsonl",
            Self::Csv => "csv",
        }
    }
}

/// Outcome of a successful export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub path: PathBuf,
    pub event_count: u64,
    pub bytes_written: u64,
}

/// Encode and atomically write `events` to `path`.
pub fn export(events: &[Event], format: ExportFormat, path: &Path) -> Result<ExportResult> {
    if events.is_empty() {
        return Err(CleanerError::NoEventsToExport);
    }
    let content = match format {
        ExportFormat::Json => to_json(events)?,
        ExportFormat::JsonLines => to_json_lines(events)?,
        ExportFormat::Csv => to_csv(events),
    };
    write_atomic(path, &content)?;
    Ok(ExportResult {
        path: path.to_path_buf(),
        event_count: events.len() as u64,
        bytes_written: content.len() as u64,
    })
}

/// Default export destination: `audit_<YYYYMMDD_HHMMSS>.<ext>` in the
/// exports directory.
#[must_use]
pub fn default_export_path(exports_dir: &Path, format: ExportFormat) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    exports_dir.join(format!("audit_{stamp}.{}", format.extension()))
}

// ──────────────────── JSON / JSONL ────────────────────

/// Single JSON object with sorted keys and RFC-3339 timestamps carrying
/// fractional seconds.
pub fn to_json(events: &[Event]) -> Result<String> {
    let encoded: Vec<Value> = events.iter().map(event_to_value).collect::<Result<_>>()?;
    // serde_json maps are BTree-backed, so object keys come out sorted.
    let document = serde_json::json!({
        "exportDate": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "hostname": hostname(),
        "eventCount": events.len(),
        "events": encoded,
    });
    serde_json::to_string_pretty(&document).map_err(|err| CleanerError::EncodingFailed {
        details: err.to_string(),
    })
}

/// One event per line, same per-event encoding as the JSON document.
pub fn to_json_lines(events: &[Event]) -> Result<String> {
    let mut out = String::new();
    for event in events {
        let value = event_to_value(event)?;
        let line = serde_json::to_string(&value).map_err(|err| CleanerError::EncodingFailed {
            details: err.to_string(),
        })?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Parse JSONL produced by [`to_json_lines`] back into events.
pub fn parse_json_lines(text: &str) -> Result<Vec<Event>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<Event>(line).map_err(|err| CleanerError::EncodingFailed {
                details: format!("bad JSONL line: {err}"),
            })
        })
        .collect()
}

fn event_to_value(event: &Event) -> Result<Value> {
    let mut value = serde_json::to_value(event)?;
    if let Value::Object(map) = &mut value {
        // Pin the timestamp to the sortable millisecond form; the derive
        // would otherwise emit variable sub-second precision.
        map.insert(
            "timestamp".to_string(),
            Value::String(event.timestamp_sortable()),
        );
    }
    Ok(value)
}

// ──────────────────── CSV ────────────────────

const CSV_HEADER: &str =
    "id,timestamp,category,action,actor,target,result,severity,session_id,hostname,username,metadata";

/// RFC-4180 CSV with the fixed 12-column header.
#[must_use]
pub fn to_csv(events: &[Event]) -> String {
    let mut out = String::with_capacity(events.len() * 128);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for event in events {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_else(|_| "{}".to_string());
        let fields = [
            event.id.to_string(),
            event.timestamp_sortable(),
            event.category.as_str().to_string(),
            event.action.clone(),
            event.actor.clone(),
            event.target.clone(),
            event.result.as_str().to_string(),
            event.severity.as_str().to_string(),
            event
                .session_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            event.hostname.clone(),
            event.username.clone(),
            metadata,
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_escape(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Quote a field when it contains a comma, quote, or line break; double
/// internal quotes.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// ──────────────────── statistics report ────────────────────

/// Fixed-width plain-text statistics report.
#[must_use]
pub fn statistics_report(stats: &Statistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:=^64}", " AUDIT STATISTICS ");
    let _ = writeln!(out);

    let _ = writeln!(out, "Period");
    let _ = writeln!(out, "------");
    let fmt_ts = |ts: Option<chrono::DateTime<Utc>>| {
        ts.map_or_else(
            || "-".to_string(),
            |t| t.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    };
    let _ = writeln!(out, "  {:<16}{}", "First event:", fmt_ts(stats.first_timestamp));
    let _ = writeln!(out, "  {:<16}{}", "Last event:", fmt_ts(stats.last_timestamp));
    let _ = writeln!(out);

    let _ = writeln!(out, "Summary");
    let _ = writeln!(out, "-------");
    let _ = writeln!(out, "  {:<16}{}", "Total events:", stats.total);
    let _ = writeln!(out, "  {:<16}{}", "Bytes freed:", stats.freed_bytes);
    let _ = writeln!(out);

    let _ = writeln!(out, "Events by category");
    let _ = writeln!(out, "------------------");
    for (category, count) in &stats.by_category {
        let pct = percentage(*count, stats.total);
        let _ = writeln!(out, "  {category:<16}{count:>8}  {pct:>5.1}%");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Events by result");
    let _ = writeln!(out, "----------------");
    for (result, count) in &stats.by_result {
        let pct = percentage(*count, stats.total);
        let _ = writeln!(out, "  {result:<16}{count:>8}  {pct:>5.1}%");
    }

    out
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

// ──────────────────── atomic write ────────────────────

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| CleanerError::WriteFailed {
        path: parent.to_path_buf(),
        details: err.to_string(),
    })?;

    let staged = path.with_extension(format!(
        "{}.tmp",
        path.extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));
    fs::write(&staged, content.as_bytes()).map_err(|err| CleanerError::WriteFailed {
        path: staged.clone(),
        details: err.to_string(),
    })?;
    fs::rename(&staged, path).map_err(|err| {
        let _ = fs::remove_file(&staged);
        CleanerError::WriteFailed {
            path: path.to_path_buf(),
            details: err.to_string(),
        }
    })?;
    Ok(())
}

// ──────────────────── tests ────────────────────
