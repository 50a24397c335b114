//! Fixed sample events shown when no live data is available.

use crate::event::Event;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;

/// Prefix of every demo event id, so demo entries are recognizable in
/// debug output.
pub const DEMO_ID_PREFIX: &str = "demo-";

/// The demo set, stamped relative to `now` (newest first).
pub fn demo_events(now: DateTime<Utc>) -> Vec<Event> {
    let ago = |secs: i64| now - TimeDelta::seconds(secs);
    vec![
        Event::new(
            "demo-1",
            "tap_activity",
            json!({"taps": 12, "earned": 24, "count": 3, "totalEarned": 24, "aggregated": true}),
        )
        .with_actor("0x7a3f...c21e")
        .with_session("demo-session-1")
        .at(ago(5)),
        Event::new(
            "demo-2",
            "oracle_prophecy",
            json!({
                "oracleResponse": "The charts whisper of a great slap before sundown.",
                "urgency": "high"
            }),
        )
        .at(ago(20)),
        Event::new("demo-3", "mega_slap", json!({"earned": 150, "multiplier": 5}))
            .with_actor("0x19bd...44af")
            .with_session("demo-session-2")
            .at(ago(45)),
        Event::new("demo-4", "achievement_unlocked", json!({"achievement": "First Thousand"}))
            .with_actor("0x7a3f...c21e")
            .at(ago(90)),
        Event::new("demo-5", "giga_slap", json!({"earned": 1000, "multiplier": 20}))
            .with_actor("0xe02c...9b10")
            .with_session("demo-session-3")
            .at(ago(150)),
        Event::new("demo-6", "nft_minted", json!({"collection": "Oracle Relics", "rarity": "epic"}))
            .with_actor("0x19bd...44af")
            .at(ago(240)),
    ]
}

pub fn is_demo(event: &Event) -> bool {
    event.id.starts_with(DEMO_ID_PREFIX)
}
