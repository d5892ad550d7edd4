//! Audit substrate: persistent event record, indexed query, export.

pub mod event;
pub mod export;
#[cfg(feature = "sqlite")]
pub mod store;

pub use event::{AuditQuery, Event, EventCategory, EventResult, Severity, Statistics};
#[cfg(feature = "sqlite")]
pub use store::AuditStore;
