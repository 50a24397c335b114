//! Merge-or-append decisions for rapid-fire events.
//!
//! Bursts of the same action by the same player in the same session are
//! collapsed into one displayed entry carrying a count and a running sum.

use crate::event::{keys, Event};
use chrono::TimeDelta;
use serde_json::{Number, Value};
use std::time::Duration;

/// Event types eligible for merging. Everything else is always appended.
pub const AGGREGATABLE_TYPES: &[&str] = &["tap_activity", "mega_slap", "giga_slap"];

/// Default aggregation window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

pub fn is_aggregatable(event_type: &str) -> bool {
    AGGREGATABLE_TYPES.contains(&event_type)
}

/// Index of the first entry in `recent` that `incoming` can merge into.
///
/// `recent` is scanned in order, so with a newest-first display list the
/// most recent compatible entry wins. An entry is compatible when type,
/// actor and session are all equal (two absent actors are equal) and the
/// `timestamp_utc` values are at most `window` apart, boundary included.
pub fn merge_candidate_position<'a, I>(recent: I, incoming: &Event, window: Duration) -> Option<usize>
where
    I: IntoIterator<Item = &'a Event>,
{
    if !is_aggregatable(&incoming.event_type) {
        return None;
    }
    let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
    recent.into_iter().position(|existing| {
        existing.event_type == incoming.event_type
            && existing.actor_address == incoming.actor_address
            && existing.session_id == incoming.session_id
            && (incoming.timestamp_utc - existing.timestamp_utc).abs() <= window
    })
}

/// The entry in `recent` that `incoming` should merge into, if any.
///
/// # Examples
///
/// ```
/// use livefeed::{find_merge_candidate, Event, DEFAULT_WINDOW};
/// use serde_json::json;
///
/// let shown = vec![Event::new("1", "tap_activity", json!({"earned": 5})).with_actor("x")];
/// let next = Event::new("2", "tap_activity", json!({"earned": 7})).with_actor("x");
/// assert_eq!(find_merge_candidate(&shown, &next, DEFAULT_WINDOW).unwrap().id, "1");
///
/// let prophecy = Event::new("3", "oracle_prophecy", json!({"text": "..."}));
/// assert!(find_merge_candidate(&shown, &prophecy, DEFAULT_WINDOW).is_none());
/// ```
pub fn find_merge_candidate<'a>(
    recent: &'a [Event],
    incoming: &Event,
    window: Duration,
) -> Option<&'a Event> {
    merge_candidate_position(recent, incoming, window).map(|i| &recent[i])
}

/// Fold `incoming` into `existing`, returning the replacement entry.
///
/// The result keeps the identity of `existing` (id, type, actor, session,
/// `created_at`) so it can replace it in place, and takes the timestamp of
/// `incoming`.
pub fn merge(existing: &Event, incoming: &Event) -> Event {
    let mut merged = existing.clone();

    for (key, value) in &incoming.payload {
        if is_narrative_key(key) && value.is_null() {
            continue;
        }
        merged.payload.insert(key.clone(), value.clone());
    }

    let count = existing.count() + 1;
    let total = existing.total_earned() + incoming.earned();
    let latest = incoming.earned();

    merged.payload.insert(keys::COUNT.into(), Value::from(count));
    merged.payload.insert(keys::TOTAL_EARNED.into(), amount(total));
    merged.payload.insert(keys::LATEST_EARNED.into(), amount(latest));
    merged.payload.insert(keys::AGGREGATED.into(), Value::Bool(true));
    merged.timestamp_utc = incoming.timestamp_utc;
    merged
}

fn is_narrative_key(key: &str) -> bool {
    key == keys::ORACLE_RESPONSE || key == keys::URGENCY
}

// Whole amounts stay integers in JSON so consumers see `21`, not `21.0`.
fn amount(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn tap(id: &str, secs: i64, earned: f64) -> Event {
        Event::new(id, "tap_activity", json!({"earned": earned}))
            .with_actor("x")
            .with_session("s")
            .at(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
    }

    #[test]
    fn merge_accumulates_count_and_sum() {
        let merged = merge(&tap("1", 0, 5.0), &tap("2", 10, 7.0));
        assert_eq!(merged.id, "1");
        assert_eq!(merged.count(), 2);
        assert_eq!(merged.total_earned(), 12.0);
        assert_eq!(merged.latest_earned(), Some(7.0));
        assert!(merged.is_aggregated());
        assert_eq!(merged.timestamp_utc, tap("2", 10, 7.0).timestamp_utc);
        assert_eq!(merged.payload["totalEarned"], json!(12));
    }

    #[test]
    fn narrative_fields_prefer_incoming_when_present() {
        let mut existing = tap("1", 0, 1.0);
        existing.payload.insert("oracleResponse".into(), json!("old"));
        existing.payload.insert("urgency".into(), json!("low"));

        let mut incoming = tap("2", 1, 1.0);
        incoming.payload.insert("urgency".into(), json!("high"));

        let merged = merge(&existing, &incoming);
        assert_eq!(merged.oracle_response(), Some("old"));
        assert_eq!(merged.urgency(), Some("high"));
    }

    #[test]
    fn other_payload_keys_are_overridden_by_incoming() {
        let mut existing = tap("1", 0, 1.0);
        existing.payload.insert("combo".into(), json!(2));
        existing.payload.insert("keep".into(), json!("me"));
        let mut incoming = tap("2", 1, 1.0);
        incoming.payload.insert("combo".into(), json!(3));

        let merged = merge(&existing, &incoming);
        assert_eq!(merged.payload["combo"], json!(3));
        assert_eq!(merged.payload["keep"], json!("me"));
    }

    #[test]
    fn candidate_requires_matching_session_and_actor() {
        let shown = vec![tap("1", 0, 1.0)];
        let other_session = tap("2", 1, 1.0).with_session("t");
        assert!(find_merge_candidate(&shown, &other_session, DEFAULT_WINDOW).is_none());

        let other_actor = tap("3", 1, 1.0).with_actor("y");
        assert!(find_merge_candidate(&shown, &other_actor, DEFAULT_WINDOW).is_none());
    }

    #[test]
    fn absent_actors_match_each_other() {
        let mut a = tap("1", 0, 1.0);
        a.actor_address = None;
        let mut b = tap("2", 5, 1.0);
        b.actor_address = None;
        assert_eq!(merge_candidate_position(&[a], &b, DEFAULT_WINDOW), Some(0));
    }

    #[test]
    fn most_recent_candidate_wins() {
        let shown = vec![tap("new", 30, 1.0), tap("old", 0, 1.0)];
        let incoming = tap("3", 40, 1.0);
        assert_eq!(find_merge_candidate(&shown, &incoming, DEFAULT_WINDOW).unwrap().id, "new");
    }

    #[test]
    fn window_is_inclusive() {
        let shown = vec![tap("1", 0, 1.0)];
        assert!(find_merge_candidate(&shown, &tap("2", 60, 1.0), DEFAULT_WINDOW).is_some());
        let late = tap("3", 60, 1.0).with_timestamp_utc(
            Utc.timestamp_opt(1_700_000_060, 1_000_000).unwrap(),
        );
        assert!(find_merge_candidate(&shown, &late, DEFAULT_WINDOW).is_none());
    }
}
