//! Label Merge Tests
//!
//! The merged label set decides what the scraper sees for every target, so the
//! precedence rules are pinned here.

use common::{merge_labels, Event, EventType, Labels, RouteSnapshot, NAMESPACE_LABEL};

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_merge_combines_all_sources() {
    let route = RouteSnapshot::new("a", "default", "a.example.com", labels(&[("env", "prod")]));
    let merged = merge_labels(&route, &labels(&[("team", "x")]));

    assert_eq!(
        merged,
        labels(&[("team", "x"), ("env", "prod"), ("Namespace", "default")])
    );
}

#[test]
fn test_source_labels_win_over_route_labels() {
    let route = RouteSnapshot::new("a", "default", "a.example.com", labels(&[("team", "y")]));
    let merged = merge_labels(&route, &labels(&[("team", "x")]));

    assert_eq!(merged.get("team").map(String::as_str), Some("x"));
}

#[test]
fn test_namespace_label_wins_over_everything() {
    let route = RouteSnapshot::new(
        "a",
        "payments",
        "a.example.com",
        labels(&[(NAMESPACE_LABEL, "spoofed")]),
    );
    let merged = merge_labels(&route, &labels(&[(NAMESPACE_LABEL, "also-spoofed")]));

    assert_eq!(
        merged.get(NAMESPACE_LABEL).map(String::as_str),
        Some("payments")
    );
}

#[test]
fn test_merge_with_no_labels_keeps_namespace_only() {
    let route = RouteSnapshot::new("a", "default", "a.example.com", Labels::new());
    let merged = merge_labels(&route, &Labels::new());

    assert_eq!(merged.len(), 1);
    assert_eq!(merged.get(NAMESPACE_LABEL).map(String::as_str), Some("default"));
}

#[test]
fn test_event_serializes_with_type() {
    let route = RouteSnapshot::new("a", "default", "a.example.com", Labels::new());
    let event = Event::new(route, EventType::Deleted, Labels::new());

    let json = serde_json::to_value(&event).expect("event should serialize");
    assert_eq!(json["event_type"], "Deleted");
    assert_eq!(event.host(), "a.example.com");
}
