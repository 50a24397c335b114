#![allow(dead_code)]

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use livefeed::{AdminConfig, Event, RawRecord};
use serde_json::json;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    base_time() + TimeDelta::seconds(secs)
}

/// A tap by actor `x` in session `s`, `secs` after the base time.
pub fn tap(id: &str, secs: i64, earned: i64) -> Event {
    Event::new(id, "tap_activity", json!({"earned": earned}))
        .with_actor("x")
        .with_session("s")
        .at(at(secs))
}

pub fn tap_by(id: &str, secs: i64, earned: i64, actor: &str, session: &str) -> Event {
    Event::new(id, "tap_activity", json!({"earned": earned}))
        .with_actor(actor)
        .with_session(session)
        .at(at(secs))
}

pub fn prophecy(id: &str, secs: i64) -> Event {
    Event::new(id, "oracle_prophecy", json!({"text": format!("prophecy {id}")})).at(at(secs))
}

pub fn record(event: &Event) -> RawRecord {
    event.to_record()
}

pub fn ids(events: &[Event]) -> Vec<&str> {
    events.iter().map(|e| e.id.as_str()).collect()
}

/// Defaults with demo data off, so tests see only what they feed in.
pub fn plain_config() -> AdminConfig {
    AdminConfig {
        demo_data_enabled: false,
        ..AdminConfig::default()
    }
}

pub fn throttled_config(per_second: f64) -> AdminConfig {
    AdminConfig {
        performance_throttling: true,
        max_events_per_second: per_second,
        ..plain_config()
    }
}
