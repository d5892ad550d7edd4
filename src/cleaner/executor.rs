//! The cleanup executor: expands a request into targets, classifies each,
//! deletes (or dry-run accounts) under retry, and records every terminal
//! action in the audit store.
//!
//! Per-target lifecycle:
//! `Pending → Classified → (Skipped | Measuring → (DryRunAccounted |
//! Deleting → (Deleted | Failed)))`. A target never re-enters
//! `Classified`.
//!
//! Targets are ordered deepest-first and subtrees are processed one at a
//! time, so a target is never deleted while an ancestor deletion could pull
//! its parent out from under it.

#![allow(missing_docs)]

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::audit::event::{Event, EventCategory, EventResult, Severity, username};
use crate::audit::store::AuditStore;
use crate::cleaner::notify::Notifier;
use crate::cleaner::retry::RetryPolicy;
use crate::cleaner::target::{Target, build_targets};
use crate::cleaner::{CleanErrorInfo, CleanResult, Request, TriggerKind};
use crate::core::cancel::CancelToken;
use crate::core::config::{Config, EffectivePolicy};
use crate::core::errors::{CleanerError, Result};
use crate::logger::jsonl::{CleanupLog, LogLevel, LogRecord};
use crate::logger::metrics::MetricsRecorder;
use crate::safety::level::CleanupLevel;
use crate::safety::RunningProcessProbe;
use crate::safety::rules::{BlockReason, PathClassifier};
use crate::scanner::{ScanConfig, ScanResult, scan};

/// The engine: policy snapshot, classifier, audit handle, and optional
/// sidecars. All handles are injected — process-wide singletons are the
/// caller's business, not ours.
pub struct CleanupEngine {
    policy: EffectivePolicy,
    classifier: PathClassifier,
    audit: Arc<AuditStore>,
    retry: RetryPolicy,
    notifier: Option<Arc<dyn Notifier>>,
    log: Option<Mutex<CleanupLog>>,
    metrics: Option<MetricsRecorder>,
}

impl CleanupEngine {
    /// Build an engine from a policy snapshot and an audit store handle.
    pub fn new(policy: EffectivePolicy, audit: Arc<AuditStore>) -> Result<Self> {
        let classifier = PathClassifier::new(&policy.exclusion_globs, policy.age_days)?;
        Ok(Self {
            policy,
            classifier,
            audit,
            retry: RetryPolicy::default(),
            notifier: None,
            log: None,
            metrics: None,
        })
    }

    /// Full wiring from an on-disk configuration: audit store, rotating
    /// log, and metrics recorder under the configured data directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        let audit = Arc::new(AuditStore::open(&config.paths.audit_db())?);
        let mut engine = Self::new(config.policy.clone(), audit)?;
        engine.log = Some(Mutex::new(CleanupLog::open(
            config.paths.log_file(),
            config.log.max_size_bytes,
            config.log.max_rotated_files,
        )));
        engine.metrics = Some(MetricsRecorder::new(config.paths.metrics_file()));
        Ok(engine)
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn RunningProcessProbe>) -> Self {
        self.classifier = self.classifier.with_probe(probe);
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The audit store this engine records into.
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditStore> {
        &self.audit
    }

    /// Size/analyze a tree without touching it.
    #[must_use]
    pub fn analyze(&self, path: &Path, config: &ScanConfig) -> ScanResult {
        scan(path, config, &CancelToken::new())
    }

    /// Execute one cleanup request.
    pub fn clean(&self, request: &Request) -> Result<CleanResult> {
        let start = Instant::now();
        let dry_run = request.dry_run || self.policy.enforce_dry_run;
        let level = request.level.min(self.policy.cleanup_level);
        let actor = actor_for(request.trigger);

        let session_id = request.trigger.is_sessioned().then(Uuid::new_v4);
        if let Some(sid) = session_id {
            self.open_session(request, sid, &actor, level, dry_run)?;
        }

        let targets = build_targets(request, self.classifier.exclusions());
        if targets.is_empty() {
            // A request that named nothing is a caller error; a request
            // whose every named root fell to exclusion filtering is an
            // empty success.
            let requested_any = request.include_system_caches
                || request.include_developer_caches
                || request.include_browser_caches
                || request.include_logs
                || !request.extra_paths.is_empty();
            if !requested_any {
                if let Some(sid) = session_id {
                    self.emit(
                        Event::new(EventCategory::System, "session_end", &actor, "session")
                            .with_session(sid)
                            .with_result(EventResult::Failure)
                            .with_metadata("reason", "EmptyTargetSet"),
                    );
                }
                return Err(CleanerError::EmptyTargetSet);
            }
        }

        let mut result = CleanResult {
            freed_bytes: 0,
            files_removed: 0,
            directories_removed: 0,
            errors: Vec::new(),
            duration: start.elapsed(),
            outcome: EventResult::Success,
            targets_processed: 0,
            targets_skipped: 0,
            dry_run,
        };

        for target in &targets {
            if request.cancel.is_cancelled() {
                result.outcome = EventResult::Warning;
                self.emit(
                    self.target_event(target, &actor, session_id)
                        .with_result(EventResult::Warning)
                        .with_severity(Severity::Warning)
                        .with_metadata("reason", "Cancelled"),
                );
                break;
            }

            self.process_target(target, &actor, session_id, level, dry_run, request, &mut result);
        }

        result.duration = start.elapsed();

        if let Some(sid) = session_id {
            self.close_session(&actor, sid, &result);
        }
        if let Some(metrics) = &self.metrics {
            let _ = metrics.record(&result, request.trigger);
        }
        if let Some(notifier) = &self.notifier {
            notifier.cleanup_completed(&result);
        }

        Ok(result)
    }

    // ──────────────────── per-target pipeline ────────────────────

    #[allow(clippy::too_many_arguments)]
    fn process_target(
        &self,
        target: &Target,
        actor: &str,
        session_id: Option<Uuid>,
        level: CleanupLevel,
        dry_run: bool,
        request: &Request,
        result: &mut CleanResult,
    ) {
        // Classified.
        let verdict = self.classifier.classify(&target.path);
        let base = || self.target_event(target, actor, session_id);

        match &verdict.blocked {
            Some(BlockReason::Protected) => {
                result.targets_skipped += 1;
                self.emit(
                    base()
                        .with_result(EventResult::Skipped)
                        .with_severity(Severity::Warning)
                        .with_metadata("reason", "ProtectedPath"),
                );
                return;
            }
            Some(BlockReason::Excluded(pattern)) => {
                result.targets_skipped += 1;
                self.emit(
                    base()
                        .with_result(EventResult::Skipped)
                        .with_metadata("reason", "PolicyExcluded")
                        .with_metadata("pattern", pattern.clone()),
                );
                return;
            }
            Some(BlockReason::NotAbsolute) => {
                result.targets_skipped += 1;
                self.emit(
                    base()
                        .with_result(EventResult::Skipped)
                        .with_severity(Severity::Warning)
                        .with_metadata("reason", "InvalidPath"),
                );
                return;
            }
            None => {}
        }

        // Re-running a request after the target vanished is not an error;
        // the second pass just records it as gone.
        let meta = match fs::symlink_metadata(&target.path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                result.targets_skipped += 1;
                self.emit(
                    base()
                        .with_result(EventResult::Skipped)
                        .with_severity(Severity::Debug)
                        .with_metadata("reason", "not present"),
                );
                return;
            }
            Err(err) => {
                result.targets_skipped += 1;
                self.emit(
                    base()
                        .with_result(EventResult::Skipped)
                        .with_severity(Severity::Warning)
                        .with_metadata("reason", format!("stat failed: {err}")),
                );
                return;
            }
        };

        if !level.authorizes(verdict.grade) {
            result.targets_skipped += 1;
            self.emit(
                base()
                    .with_result(EventResult::Skipped)
                    .with_metadata("reason", "GradeExceedsLevel")
                    .with_metadata("grade", verdict.grade.as_str())
                    .with_metadata("level", level.as_str()),
            );
            return;
        }

        // Measuring.
        let sizing = scan(&target.path, &sizing_config(), &request.cancel);

        if dry_run {
            // DryRunAccounted.
            result.freed_bytes += sizing.total_size;
            result.targets_processed += 1;
            self.emit(
                base()
                    .with_metadata("dry_run", "true")
                    .with_metadata("freed_bytes", sizing.total_size.to_string())
                    .with_metadata("grade", verdict.grade.as_str())
                    .with_metadata("category", verdict.category.as_str())
                    .with_action("dry_run"),
            );
            return;
        }

        // Deleting.
        let was_dir = meta.is_dir();
        match self.delete_with_retry(&target.path, was_dir, &request.cancel) {
            Ok(()) => {
                // Deleted.
                result.freed_bytes += sizing.total_size;
                result.files_removed += sizing.file_count;
                result.directories_removed += sizing.dir_count + u64::from(was_dir);
                result.targets_processed += 1;
                self.emit(
                    base()
                        .with_metadata("freed_bytes", sizing.total_size.to_string())
                        .with_metadata("files_removed", sizing.file_count.to_string())
                        .with_metadata("grade", verdict.grade.as_str())
                        .with_metadata("category", verdict.category.as_str()),
                );
            }
            Err(CleanerError::Cancelled) => {
                result.outcome = EventResult::Warning;
                self.emit(
                    base()
                        .with_result(EventResult::Warning)
                        .with_severity(Severity::Warning)
                        .with_metadata("reason", "Cancelled"),
                );
            }
            Err(err) => {
                // Failed. Peers continue.
                result.errors.push(CleanErrorInfo {
                    path: target.path.clone(),
                    reason: err.to_string(),
                });
                self.emit(
                    base()
                        .with_result(EventResult::Failure)
                        .with_severity(Severity::Error)
                        .with_metadata("error_code", err.code()),
                );
            }
        }
    }

    fn delete_with_retry(&self, path: &Path, was_dir: bool, cancel: &CancelToken) -> Result<()> {
        self.retry.execute(cancel, || {
            let removal = if was_dir {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };
            match removal {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(CleanerError::io(path, err)),
            }
            // Post-deletion verification.
            match fs::symlink_metadata(path) {
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                _ => Err(CleanerError::PermanentIo {
                    path: path.to_path_buf(),
                    source: std::io::Error::other("path still exists after deletion"),
                }),
            }
        })
    }

    // ──────────────────── sessions & events ────────────────────

    fn open_session(
        &self,
        request: &Request,
        sid: Uuid,
        actor: &str,
        level: CleanupLevel,
        dry_run: bool,
    ) -> Result<()> {
        let event = Event::new(EventCategory::System, "session_start", actor, "session")
            .with_session(sid)
            .with_metadata("trigger", request.trigger.as_str())
            .with_metadata("level", level.as_str())
            .with_metadata("dry_run", dry_run.to_string());

        self.audit.insert(&event).map_err(|err| {
            // A non-manual run that cannot persist its session start must
            // not proceed; leave a trace in the rotating log.
            self.log_record(
                LogRecord::new(LogLevel::Error, "audit_unavailable", err.to_string())
                    .with_session(sid.to_string()),
            );
            CleanerError::AuditUnavailable {
                details: err.to_string(),
            }
        })?;

        self.log_record(
            LogRecord::new(LogLevel::Info, "session_start", "automated cleanup started")
                .with_session(sid.to_string())
                .with_detail("trigger", serde_json::json!(request.trigger.as_str()))
                .with_detail("level", serde_json::json!(level.as_str()))
                .with_detail("dry_run", serde_json::json!(dry_run)),
        );
        Ok(())
    }

    fn close_session(&self, actor: &str, sid: Uuid, result: &CleanResult) {
        self.emit(
            Event::new(EventCategory::System, "session_end", actor, "session")
                .with_session(sid)
                .with_result(result.outcome)
                .with_metadata("freed_bytes", result.freed_bytes.to_string())
                .with_metadata("files_removed", result.files_removed.to_string())
                .with_metadata(
                    "directories_removed",
                    result.directories_removed.to_string(),
                )
                .with_metadata("errors", result.errors.len().to_string()),
        );
        self.log_record(
            LogRecord::new(LogLevel::Info, "cleanup_complete", result.summary())
                .with_session(sid.to_string())
                .with_detail("freed_bytes", serde_json::json!(result.freed_bytes))
                .with_detail("errors", serde_json::json!(result.errors.len())),
        );
    }

    fn target_event(&self, target: &Target, actor: &str, session_id: Option<Uuid>) -> Event {
        let mut event = Event::new(
            EventCategory::Cleanup,
            "delete",
            actor,
            target.path.to_string_lossy(),
        )
        .with_metadata("intent", target.intent.clone());
        if let Some(sid) = session_id {
            event = event.with_session(sid);
        }
        event
    }

    /// Insert an event, degrading to the rotating log on failure. Only the
    /// non-manual `session_start` is allowed to abort a request.
    fn emit(&self, event: Event) {
        if let Err(err) = self.audit.insert(&event) {
            self.log_record(LogRecord::new(
                LogLevel::Error,
                "audit_degraded",
                format!("audit insert failed ({err}); event {} dropped", event.id),
            ));
        }
    }

    fn log_record(&self, record: LogRecord) {
        if let Some(log) = &self.log {
            let mut log = log.lock();
            log.write(&record);
            log.flush();
        }
    }
}

/// Sizing pass for dry-run accounting and freed-byte attribution: apparent
/// size of everything under the target, hidden files included.
fn sizing_config() -> ScanConfig {
    ScanConfig {
        min_size: 0,
        include_hidden: true,
        max_depth: None,
        follow_symlinks: false,
        cross_mounts: false,
        top_n: 0,
        parallelism: 2,
    }
}

fn actor_for(trigger: TriggerKind) -> String {
    match trigger {
        TriggerKind::Manual => username(),
        other => other.as_str().to_string(),
    }
}
