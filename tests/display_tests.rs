mod common;

use common::{at, ids, prophecy, tap};
use livefeed::{should_show, Applied, DisplayList, Event, FilterPolicy, HIDDEN_EVENT_TYPES};
use serde_json::json;
use std::collections::BTreeSet;

#[test]
fn test_cap_keeps_most_recent() {
    let mut list = DisplayList::new(5);
    for i in 0..8 {
        list.apply(prophecy(&format!("p{i}"), i), None);
    }
    assert_eq!(list.len(), 5);
    assert_eq!(ids(list.events()), ["p7", "p6", "p5", "p4", "p3"]);
}

#[test]
fn test_equal_timestamps_keep_arrival_order() {
    let mut list = DisplayList::new(10);
    list.apply(prophecy("first", 0), None);
    list.apply(prophecy("second", 0), None);
    assert_eq!(ids(list.events()), ["first", "second"]);
}

#[test]
fn test_late_arrival_lands_in_place() {
    let mut list = DisplayList::new(10);
    list.apply(prophecy("a", 0), None);
    list.apply(prophecy("c", 20), None);
    list.apply(prophecy("b", 10), None);
    assert_eq!(ids(list.events()), ["c", "b", "a"]);
}

#[test]
fn test_replace_all_sorts_and_dedupes() {
    let mut list = DisplayList::new(10);
    list.apply(prophecy("stale", 100), None);
    list.replace_all([prophecy("a", 0), prophecy("b", 5), prophecy("a", 9)]);
    assert_eq!(ids(list.events()), ["b", "a"]);
}

#[test]
fn test_update_patches_in_place() {
    let mut list = DisplayList::new(10);
    list.apply(tap("1", 0, 3), None);
    assert!(list.update("1", |e| {
        e.payload.insert("urgency".into(), json!("low"));
    }));
    assert!(!list.update("missing", |_| {}));
    assert_eq!(list.get("1").unwrap().urgency(), Some("low"));
}

#[test]
fn test_zero_cap_is_treated_as_one() {
    let mut list = DisplayList::new(0);
    list.apply(prophecy("a", 0), None);
    assert_eq!(list.apply(prophecy("b", 1), None), Applied::Appended("b".into()));
    assert_eq!(ids(list.events()), ["b"]);
}

#[test]
fn test_heartbeat_hidden_unless_debug() {
    let heartbeat = Event::new("h", "heartbeat", json!({"ok": true})).at(at(0));
    let mut policy = FilterPolicy::default();
    assert!(!should_show(&heartbeat, &policy));

    policy.debug_mode = true;
    assert!(should_show(&heartbeat, &policy));
}

#[test]
fn test_every_hidden_type_is_hidden() {
    let policy = FilterPolicy::default();
    for event_type in HIDDEN_EVENT_TYPES {
        let event = Event::new("1", event_type, json!({"k": 1}));
        assert!(!should_show(&event, &policy), "{event_type} should be hidden");
    }
}

#[test]
fn test_filtering_disabled_shows_everything() {
    let policy = FilterPolicy {
        filtering_enabled: false,
        debug_mode: false,
        allowed_types: BTreeSet::from(["nft_minted".to_string()]),
    };
    assert!(should_show(&Event::new("1", "heartbeat", json!(null)), &policy));
    assert!(should_show(&Event::new("2", "tap_activity", json!({"earned": 1})), &policy));
}

#[test]
fn test_empty_payload_only_in_debug() {
    let empty = Event::new("1", "tap_activity", json!({}));
    let mut policy = FilterPolicy::default();
    assert!(!should_show(&empty, &policy));
    policy.debug_mode = true;
    assert!(should_show(&empty, &policy));
}

#[test]
fn test_allow_list_restricts_types() {
    let policy = FilterPolicy {
        allowed_types: BTreeSet::from(["mega_slap".to_string()]),
        ..FilterPolicy::default()
    };
    assert!(should_show(&Event::new("1", "mega_slap", json!({"earned": 1})), &policy));
    assert!(!should_show(&Event::new("2", "tap_activity", json!({"earned": 1})), &policy));
}
