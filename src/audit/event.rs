//! The audit event model: the atomic record of everything the engine does.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse bucket of an audit event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Cleanup,
    Policy,
    Security,
    System,
    User,
}

impl EventCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cleanup => "cleanup",
            Self::Policy => "policy",
            Self::Security => "security",
            Self::System => "system",
            Self::User => "user",
        }
    }

    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "cleanup" => Some(Self::Cleanup),
            "policy" => Some(Self::Policy),
            "security" => Some(Self::Security),
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the audited operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EventResult {
    Success,
    Failure,
    Warning,
    Skipped,
}

impl EventResult {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Warning => "warning",
            Self::Skipped => "skipped",
        }
    }

    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "warning" => Some(Self::Warning),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for EventResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of the audited operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record: who did what to which target, with what outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    /// Free-form verb, e.g. `delete`, `session_start`, `retention`.
    pub action: String,
    /// Subject initiating the act (user name, `scheduler`, `policy`).
    pub actor: String,
    /// The object acted upon, usually a path.
    pub target: String,
    pub result: EventResult,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub hostname: String,
    pub username: String,
}

impl Event {
    /// New event stamped now, with host identity captured immediately.
    #[must_use]
    pub fn new(
        category: EventCategory,
        action: impl Into<String>,
        actor: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            category,
            action: action.into(),
            actor: actor.into(),
            target: target.into(),
            result: EventResult::Success,
            severity: Severity::Info,
            metadata: BTreeMap::new(),
            session_id: None,
            hostname: hostname(),
            username: username(),
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    #[must_use]
    pub fn with_result(mut self, result: EventResult) -> Self {
        self.result = result;
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Timestamp in the sortable textual form used by the store and the
    /// exporters: RFC-3339 UTC with millisecond precision.
    #[must_use]
    pub fn timestamp_sortable(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Conjunctive filter over the audit store.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub category: Option<EventCategory>,
    pub action_contains: Option<String>,
    pub target_contains: Option<String>,
    pub result: Option<EventResult>,
    pub severity: Option<Severity>,
    pub session_id: Option<Uuid>,
    pub actor: Option<String>,
    /// Timestamp ascending when true; default is newest-first.
    pub order_asc: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AuditQuery {
    /// Narrowest filter selecting a single event by id is expressed through
    /// `query` + client-side id check; the common helpers below cover the
    /// frequent cases.
    #[must_use]
    pub fn by_category(category: EventCategory) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn by_session(session_id: Uuid) -> Self {
        Self {
            session_id: Some(session_id),
            order_asc: true,
            ..Self::default()
        }
    }
}

/// Aggregate numbers over a query-selected event set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total: u64,
    pub by_category: BTreeMap<String, u64>,
    pub by_result: BTreeMap<String, u64>,
    /// Sum of `metadata.freed_bytes` over the set, unparseable values
    /// ignored.
    pub freed_bytes: u64,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

// ──────────────────── host identity ────────────────────

/// Hostname captured at event creation.
#[must_use]
pub fn hostname() -> String {
    #[cfg(unix)]
    {
        if let Ok(name) = nix::unistd::gethostname() {
            let text = name.to_string_lossy();
            if !text.is_empty() {
                return text.into_owned();
            }
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Username captured at event creation.
#[must_use]
pub fn username() -> String {
    if let Ok(user) = std::env::var("USER")
        && !user.is_empty()
    {
        return user;
    }
    if let Ok(user) = std::env::var("LOGNAME")
        && !user.is_empty()
    {
        return user;
    }
    #[cfg(unix)]
    {
        if let Ok(Some(user)) = nix::unistd::User::from_uid(nix::unistd::getuid()) {
            return user.name;
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_has_unique_id_and_identity() {
        let a = Event::new(EventCategory::Cleanup, "delete", "tester", "/tmp/x");
        let b = Event::new(EventCategory::Cleanup, "delete", "tester", "/tmp/x");
        assert_ne!(a.id, b.id);
        assert!(!a.hostname.is_empty());
        assert!(!a.username.is_empty());
        assert_eq!(a.result, EventResult::Success);
        assert_eq!(a.severity, Severity::Info);
    }

    #[test]
    fn sortable_timestamps_order_lexicographically() {
        let early = Event::new(EventCategory::System, "a", "t", "x");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let late = Event::new(EventCategory::System, "b", "t", "x");
        assert!(early.timestamp_sortable() < late.timestamp_sortable());
    }

    #[test]
    fn label_round_trips() {
        for category in [
            EventCategory::Cleanup,
            EventCategory::Policy,
            EventCategory::Security,
            EventCategory::System,
            EventCategory::User,
        ] {
            assert_eq!(EventCategory::parse(category.as_str()), Some(category));
        }
        for result in [
            EventResult::Success,
            EventResult::Failure,
            EventResult::Warning,
            EventResult::Skipped,
        ] {
            assert_eq!(EventResult::parse(result.as_str()), Some(result));
        }
        for severity in [
            Severity::Debug,
            Severity::Info,
            Severity::Warning,
            Severity::Error,
            Severity::Critical,
        ] {
            assert_eq!(Severity::parse(severity.as_str()), Some(severity));
        }
        assert_eq!(EventCategory::parse("nope"), None);
    }

    #[test]
    fn builder_composes() {
        let session = Uuid::new_v4();
        let event = Event::new(EventCategory::Cleanup, "delete", "tester", "/tmp/x")
            .with_result(EventResult::Skipped)
            .with_severity(Severity::Warning)
            .with_session(session)
            .with_metadata("reason", "ProtectedPath");
        assert_eq!(event.result, EventResult::Skipped);
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.session_id, Some(session));
        assert_eq!(event.metadata.get("reason").unwrap(), "ProtectedPath");
    }

    #[test]
    fn event_serde_round_trip() {
        let event = Event::new(EventCategory::Policy, "exclude", "policy", "/x")
            .with_metadata("pattern", "~/Library/**");
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
