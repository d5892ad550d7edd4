//! Audit store round-trip, retention, and export scenarios.

use chrono::{Duration, TimeZone, Utc};
use osxcleaner::audit::event::{AuditQuery, Event, EventCategory};
use osxcleaner::audit::export;
use osxcleaner::audit::store::AuditStore;

fn temp_store() -> (tempfile::TempDir, AuditStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = AuditStore::open(&dir.path().join("audit.db")).unwrap();
    (dir, store)
}

/// Ten alternating events: counting, ordering, JSONL round-trip.
#[test]
fn audit_round_trip_with_export() {
    let (_dir, store) = temp_store();

    let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let mut inserted = Vec::new();
    for i in 0..10_i64 {
        let category = if i % 2 == 0 {
            EventCategory::Cleanup
        } else {
            EventCategory::System
        };
        let mut event = Event::new(category, "act", "tester", format!("/target/{i}"))
            .with_metadata("freed_bytes", (i * 100).to_string());
        event.timestamp = base + Duration::milliseconds(i * 250);
        store.insert(&event).unwrap();
        inserted.push(event);
    }

    // Count by category.
    let cleanup_query = AuditQuery::by_category(EventCategory::Cleanup);
    assert_eq!(store.count(&cleanup_query).unwrap(), 5);

    // Ascending timestamp order.
    let asc = store
        .query(&AuditQuery {
            category: Some(EventCategory::Cleanup),
            order_asc: true,
            ..Default::default()
        })
        .unwrap();
    let timestamps: Vec<_> = asc.iter().map(|e| e.timestamp).collect();
    let mut sorted = timestamps.clone();
    sorted.sort();
    assert_eq!(timestamps, sorted);

    // Export everything to JSONL and parse it back: identical fields.
    let everything = store
        .query(&AuditQuery {
            order_asc: true,
            ..Default::default()
        })
        .unwrap();
    let jsonl = export::to_json_lines(&everything).unwrap();
    let parsed = export::parse_json_lines(&jsonl).unwrap();
    assert_eq!(parsed.len(), 10);
    assert_eq!(parsed, everything);
    assert_eq!(parsed, inserted);
}

/// Every inserted event is found by the narrowest filter selecting it.
#[test]
fn narrowest_filter_finds_each_event() {
    let (_dir, store) = temp_store();

    let mut events = Vec::new();
    for i in 0..20 {
        let event = Event::new(
            EventCategory::Cleanup,
            format!("action-{i}"),
            "tester",
            format!("/unique/target/{i}"),
        );
        store.insert(&event).unwrap();
        events.push(event);
    }

    for event in &events {
        let hits = store
            .query(&AuditQuery {
                category: Some(event.category),
                action_contains: Some(event.action.clone()),
                target_contains: Some(event.target.clone()),
                ..Default::default()
            })
            .unwrap();
        assert!(
            hits.iter().any(|e| e.id == event.id),
            "event {} not found by its narrowest filter",
            event.id
        );
    }
}

/// Retention removes exactly the rows past the window, and nothing newer.
#[test]
fn retention_over_a_year_of_events() {
    let (_dir, store) = temp_store();

    // 100 events spanning 400 days, ending now.
    let mut expected_old = 0_u64;
    for i in 0..100_i64 {
        let days_ago = i * 4; // 0, 4, ..., 396
        let mut event = Event::new(EventCategory::Cleanup, "delete", "tester", format!("/t{i}"));
        event.timestamp = Utc::now() - Duration::days(days_ago);
        if days_ago > 365 {
            expected_old += 1;
        }
        store.insert(&event).unwrap();
    }

    let before = store.count(&AuditQuery::default()).unwrap();
    let removed = store.apply_retention(365, false).unwrap();
    let after = store.count(&AuditQuery::default()).unwrap();

    assert_eq!(removed, expected_old);
    assert_eq!(before - removed, after);

    let cutoff = Utc::now() - Duration::days(365);
    for event in store.query(&AuditQuery::default()).unwrap() {
        assert!(event.timestamp >= cutoff);
    }
}

/// The database materializes with schema on first insert into a fresh dir.
#[test]
fn store_bootstraps_in_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state/nested/audit.db");
    assert!(!db_path.exists());

    let store = AuditStore::open(&db_path).unwrap();
    store
        .insert(&Event::new(EventCategory::System, "boot", "tester", "-"))
        .unwrap();

    assert!(db_path.exists());
    assert_eq!(store.count(&AuditQuery::default()).unwrap(), 1);
    assert!(store.database_size() > 0);
}

/// CSV export of awkward targets is RFC-4180 parseable end to end.
#[test]
fn csv_export_survives_awkward_targets() {
    let (_dir, store) = temp_store();

    let event = Event::new(
        EventCategory::Cleanup,
        "delete",
        "tester",
        "/tmp/path,with \"quotes\"\nand newline",
    );
    store.insert(&event).unwrap();

    let events = store.query(&AuditQuery::default()).unwrap();
    let csv = export::to_csv(&events);

    // Two header-defined rows: header + one (multi-line) record.
    assert!(csv.starts_with("id,timestamp,"));
    assert!(csv.contains("\"/tmp/path,with \"\"quotes\"\"\nand newline\""));
}

/// Statistics over a filtered selection.
#[test]
fn statistics_select_only_matching_rows() {
    let (_dir, store) = temp_store();

    for i in 0..6 {
        let category = if i < 4 {
            EventCategory::Cleanup
        } else {
            EventCategory::Policy
        };
        store
            .insert(
                &Event::new(category, "delete", "tester", format!("/t{i}"))
                    .with_metadata("freed_bytes", "500"),
            )
            .unwrap();
    }

    let stats = store
        .statistics(&AuditQuery::by_category(EventCategory::Cleanup))
        .unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.freed_bytes, 2000);
    assert_eq!(stats.by_category.len(), 1);
}
