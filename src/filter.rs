//! Admin-configurable visibility policy for incoming events.

use crate::event::Event;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Event types that are internal plumbing and only shown in debug mode.
pub const HIDDEN_EVENT_TYPES: &[&str] = &[
    "debug_event",
    "internal_state_change",
    "heartbeat",
    "connection_test",
];

/// The subset of the admin config that decides visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPolicy {
    pub filtering_enabled: bool,
    pub debug_mode: bool,
    /// Empty means every type is allowed.
    pub allowed_types: BTreeSet<String>,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        FilterPolicy {
            filtering_enabled: true,
            debug_mode: false,
            allowed_types: BTreeSet::new(),
        }
    }
}

/// Decide whether `event` should be displayed under `policy`.
///
/// Pure: the same event and policy always give the same answer.
///
/// # Examples
///
/// ```
/// use livefeed::{should_show, Event, FilterPolicy};
/// use serde_json::json;
///
/// let heartbeat = Event::new("1", "heartbeat", json!({"ok": true}));
/// let mut policy = FilterPolicy::default();
/// assert!(!should_show(&heartbeat, &policy));
///
/// policy.debug_mode = true;
/// assert!(should_show(&heartbeat, &policy));
/// ```
pub fn should_show(event: &Event, policy: &FilterPolicy) -> bool {
    if !policy.filtering_enabled {
        return true;
    }
    if is_hidden_type(&event.event_type) {
        return policy.debug_mode;
    }
    if event.payload.is_empty() {
        return policy.debug_mode;
    }
    if !policy.allowed_types.is_empty() {
        return policy.allowed_types.contains(&event.event_type);
    }
    true
}

pub fn is_hidden_type(event_type: &str) -> bool {
    HIDDEN_EVENT_TYPES.contains(&event_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, payload: serde_json::Value) -> Event {
        Event::new("id", event_type, payload)
    }

    #[test]
    fn disabled_filtering_shows_everything() {
        let policy = FilterPolicy {
            filtering_enabled: false,
            debug_mode: false,
            allowed_types: ["tap_activity".to_string()].into(),
        };
        assert!(should_show(&event("heartbeat", json!({})), &policy));
        assert!(should_show(&event("other", json!(null)), &policy));
    }

    #[test]
    fn empty_payload_only_in_debug_mode() {
        let mut policy = FilterPolicy::default();
        let e = event("tap_activity", json!({}));
        assert!(!should_show(&e, &policy));
        policy.debug_mode = true;
        assert!(should_show(&e, &policy));
    }

    #[test]
    fn allow_list_restricts_types() {
        let policy = FilterPolicy {
            allowed_types: ["mega_slap".to_string()].into(),
            ..FilterPolicy::default()
        };
        assert!(should_show(&event("mega_slap", json!({"earned": 1})), &policy));
        assert!(!should_show(&event("tap_activity", json!({"earned": 1})), &policy));
    }

    #[test]
    fn hidden_types_bypass_allow_list_in_debug_mode() {
        let policy = FilterPolicy {
            filtering_enabled: true,
            debug_mode: true,
            allowed_types: ["mega_slap".to_string()].into(),
        };
        assert!(should_show(&event("connection_test", json!({"a": 1})), &policy));
    }
}
