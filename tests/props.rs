mod common;

use common::at;
use livefeed::{should_show, DisplayList, Event, FilterPolicy, ThrottleQueue, DEFAULT_WINDOW};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

fn arb_event_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("tap_activity".to_string()),
        Just("mega_slap".to_string()),
        Just("oracle_prophecy".to_string()),
        Just("nft_minted".to_string()),
        Just("heartbeat".to_string()),
    ]
}

fn arb_actor() -> impl Strategy<Value = Option<String>> {
    prop_oneof![Just(None), Just(Some("x".to_string())), Just(Some("y".to_string()))]
}

// (type, actor, seconds offset, earned)
fn arb_events() -> impl Strategy<Value = Vec<Event>> {
    proptest::collection::vec((arb_event_type(), arb_actor(), 0i64..600, 0i64..100), 0..80).prop_map(
        |specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (event_type, actor, secs, earned))| {
                    let mut event =
                        Event::new(format!("e{i}"), &event_type, json!({"earned": earned})).at(at(secs));
                    event.actor_address = actor;
                    event
                })
                .collect()
        },
    )
}

// For any sequence, the list never exceeds its cap.
proptest! {
    #[test]
    fn prop_cap_is_never_exceeded(events in arb_events(), cap in 1usize..20, aggregate in any::<bool>()) {
        let window = aggregate.then_some(DEFAULT_WINDOW);
        let mut list = DisplayList::new(cap);
        for event in events {
            list.apply(event, window);
            prop_assert!(list.len() <= cap);
        }
    }
}

// For any sequence, entries stay sorted newest first.
proptest! {
    #[test]
    fn prop_list_is_sorted_newest_first(events in arb_events(), aggregate in any::<bool>()) {
        let window = aggregate.then_some(DEFAULT_WINDOW);
        let mut list = DisplayList::new(25);
        for event in events {
            list.apply(event, window);
            let shown = list.events();
            prop_assert!(shown.windows(2).all(|w| w[0].timestamp_utc >= w[1].timestamp_utc));
        }
    }
}

// Merging k taps yields count k and the sum of their amounts.
proptest! {
    #[test]
    fn prop_merge_count_and_sum(amounts in proptest::collection::vec(0i64..1000, 1..30)) {
        let mut list = DisplayList::new(50);
        for (i, earned) in amounts.iter().enumerate() {
            let event = Event::new(format!("t{i}"), "tap_activity", json!({"earned": earned}))
                .with_actor("x")
                .with_session("s")
                .at(at(i as i64));
            list.apply(event, Some(DEFAULT_WINDOW));
        }
        prop_assert_eq!(list.len(), 1);
        let entry = &list.events()[0];
        prop_assert_eq!(entry.count(), amounts.len() as u64);
        prop_assert_eq!(entry.total_earned(), amounts.iter().sum::<i64>() as f64);
    }
}

// Every event is either kept or merged; nothing is duplicated.
proptest! {
    #[test]
    fn prop_ids_are_unique(events in arb_events()) {
        let mut list = DisplayList::new(100);
        for event in events {
            list.apply(event, Some(DEFAULT_WINDOW));
        }
        let ids: BTreeSet<_> = list.events().iter().map(|e| e.id.clone()).collect();
        prop_assert_eq!(ids.len(), list.len());
    }
}

// The filter is a pure function of event and policy.
proptest! {
    #[test]
    fn prop_filter_is_deterministic(
        events in arb_events(),
        filtering_enabled in any::<bool>(),
        debug_mode in any::<bool>(),
        restrict in any::<bool>(),
    ) {
        let allowed_types = if restrict {
            BTreeSet::from(["tap_activity".to_string()])
        } else {
            BTreeSet::new()
        };
        let policy = FilterPolicy { filtering_enabled, debug_mode, allowed_types };
        for event in &events {
            prop_assert_eq!(should_show(event, &policy), should_show(event, &policy));
        }
    }
}

// Releases are never closer together than the minimum interval,
// whatever the polling pattern.
proptest! {
    #[test]
    fn prop_throttle_spacing(
        rate in 1u32..50,
        pushes in 1usize..40,
        steps in proptest::collection::vec(1u64..120, 1..200),
    ) {
        let mut queue = ThrottleQueue::new(rate as f64);
        for i in 0..pushes {
            queue.push(Event::new(format!("e{i}"), "oracle_prophecy", json!({"i": i})));
        }
        let min = queue.min_interval();

        let mut now = Instant::now();
        let mut released = Vec::new();
        for step in steps {
            now += Duration::from_millis(step);
            if queue.poll(now).is_some() {
                released.push(now);
            }
        }
        for pair in released.windows(2) {
            prop_assert!(pair[1] - pair[0] >= min);
        }
    }
}
