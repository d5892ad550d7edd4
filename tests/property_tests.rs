//! Property tests for the glob matcher, CSV quoting, and top-N ordering.

use std::path::{Path, PathBuf};

use proptest::prelude::*;

use osxcleaner::audit::event::{Event, EventCategory};
use osxcleaner::audit::export;
use osxcleaner::safety::rules::ExclusionSet;
use osxcleaner::scanner::ScanItem;
use osxcleaner::scanner::top_n::{BoundedTopN, size_key};

fn component() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,10}"
}

proptest! {
    /// `*` stays within one path component; a different first component
    /// never matches.
    #[test]
    fn single_star_stays_within_component(
        a in component(),
        b in component(),
        c in component(),
    ) {
        let set = ExclusionSet::new(&[format!("/{a}/*")]).unwrap();

        let p1 = format!("/{a}/{b}");
        prop_assert!(set.matches(Path::new(&p1)));
        // Subtree shielding: children of a matched directory are covered.
        let p2 = format!("/{a}/{b}/{c}");
        prop_assert!(set.matches(Path::new(&p2)));
        // A sibling root does not match.
        let p3 = format!("/{a}zz/{b}");
        prop_assert!(!set.matches(Path::new(&p3)));
        // The bare root itself does not match.
        let p4 = format!("/{a}");
        prop_assert!(!set.matches(Path::new(&p4)));
    }

    /// `**` crosses separators; `*` does not.
    #[test]
    fn double_star_crosses_separators(
        a in component(),
        b in component(),
        c in component(),
        tail in component(),
    ) {
        // Ancestor shielding would make these cases ambiguous.
        prop_assume!(b != tail && c != tail);
        prop_assume!(!b.ends_with(&tail));

        let double = ExclusionSet::new(&[format!("/{a}/**/{tail}")]).unwrap();
        let d1 = format!("/{a}/{tail}");
        prop_assert!(double.matches(Path::new(&d1)));
        let d2 = format!("/{a}/{b}/{tail}");
        prop_assert!(double.matches(Path::new(&d2)));
        let d3 = format!("/{a}/{b}/{c}/{tail}");
        prop_assert!(double.matches(Path::new(&d3)));
        let d4 = format!("/{a}/{b}/{tail}x");
        prop_assert!(!double.matches(Path::new(&d4)));

        let single = ExclusionSet::new(&[format!("/{a}/*{tail}")]).unwrap();
        let s1 = format!("/{a}/{b}{tail}");
        prop_assert!(single.matches(Path::new(&s1)));
        let s2 = format!("/{a}/{b}/x{tail}");
        prop_assert!(!single.matches(Path::new(&s2)));
    }

    /// CSV rows with arbitrary targets survive an RFC-4180 reader.
    #[test]
    fn csv_round_trips_awkward_targets(
        target in "[ -~\n\"]{0,60}",
    ) {
        let mut event = Event::new(EventCategory::Cleanup, "delete", "tester", "");
        event.target = target.clone();
        let csv = export::to_csv(std::slice::from_ref(&event));
        let body = csv.split_once('\n').unwrap().1;
        let fields = rfc4180_record(body);
        prop_assert_eq!(fields.len(), 12);
        prop_assert_eq!(&fields[5], &target);
    }

    /// Top-N output is independent of insertion order.
    #[test]
    fn top_n_order_independent(
        entries in proptest::collection::vec((0u64..1000, "[a-z]{1,8}"), 1..40),
    ) {
        let items: Vec<ScanItem> = entries
            .iter()
            .map(|(size, name)| ScanItem {
                path: PathBuf::from(format!("/{name}")),
                size: *size,
                modified: None,
                category: None,
            })
            .collect();

        let mut forward = BoundedTopN::new(5);
        for item in &items {
            forward.push(size_key(item), item.clone());
        }
        let mut reverse = BoundedTopN::new(5);
        for item in items.iter().rev() {
            reverse.push(size_key(item), item.clone());
        }

        let a: Vec<PathBuf> = forward.into_sorted().into_iter().map(|i| i.path).collect();
        let b: Vec<PathBuf> = reverse.into_sorted().into_iter().map(|i| i.path).collect();
        prop_assert_eq!(a, b);
    }

    /// JSONL round-trips arbitrary metadata values.
    #[test]
    fn jsonl_round_trips_metadata(
        key in "[a-z_]{1,12}",
        value in "[ -~]{0,40}",
    ) {
        let mut event = Event::new(EventCategory::Policy, "exclude", "tester", "/x")
            .with_metadata(key, value);
        event.timestamp = chrono::DateTime::from_timestamp_millis(1_750_000_000_123).unwrap();
        let text = export::to_json_lines(std::slice::from_ref(&event)).unwrap();
        let parsed = export::parse_json_lines(&text).unwrap();
        prop_assert_eq!(parsed, vec![event]);
    }
}

/// Minimal RFC-4180 reader for a single record (possibly spanning lines).
fn rfc4180_record(raw: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            '\n' if !in_quotes => break,
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}
