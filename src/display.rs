//! The capped, newest-first list of events handed to the UI.

use crate::aggregate::{self, merge_candidate_position};
use crate::event::Event;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_EVENTS: usize = 50;

/// What [`DisplayList::apply`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Folded into the existing entry with this id.
    Merged(String),
    /// Inserted as a new entry.
    Appended(String),
    /// The id is already displayed; nothing changed.
    Duplicate(String),
    /// Older than everything in a full list, so it would be evicted at once.
    Evicted(String),
}

/// Ordered, bounded collection of displayed events.
///
/// Entries are kept sorted by `timestamp_utc`, newest first; events with
/// equal timestamps keep arrival order (a later arrival sorts after). The
/// list never holds more than `max_events` entries and never holds two
/// entries with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayList {
    events: Vec<Event>,
    max_events: usize,
}

impl Default for DisplayList {
    fn default() -> Self {
        DisplayList::new(DEFAULT_MAX_EVENTS)
    }
}

impl DisplayList {
    /// A `max_events` of zero is treated as one.
    pub fn new(max_events: usize) -> Self {
        DisplayList {
            events: Vec::new(),
            max_events: max_events.max(1),
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    pub fn contains(&self, id: &str) -> bool {
        self.events.iter().any(|e| e.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Change the cap, truncating the oldest entries if it shrank.
    pub fn set_max_events(&mut self, max_events: usize) {
        self.max_events = max_events.max(1);
        self.events.truncate(self.max_events);
    }

    /// Merge `event` into a compatible entry or insert it as new.
    ///
    /// `window` is the aggregation window; `None` disables merging.
    /// Merged entries move to the position their new timestamp calls for.
    pub fn apply(&mut self, event: Event, window: Option<Duration>) -> Applied {
        if self.contains(&event.id) {
            return Applied::Duplicate(event.id);
        }

        if let Some(window) = window {
            if let Some(pos) = merge_candidate_position(&self.events, &event, window) {
                let merged = aggregate::merge(&self.events[pos], &event);
                self.events.remove(pos);
                let id = merged.id.clone();
                self.insert_sorted(merged);
                return Applied::Merged(id);
            }
        }

        let id = event.id.clone();
        if self.insert_sorted(event) {
            Applied::Appended(id)
        } else {
            Applied::Evicted(id)
        }
    }

    /// Whether `event` would merge into a displayed entry.
    pub fn has_merge_candidate(&self, event: &Event, window: Duration) -> bool {
        merge_candidate_position(&self.events, event, window).is_some()
    }

    /// Replace the whole list, e.g. with demo data or a fresh bulk load.
    ///
    /// Duplicated ids keep their first occurrence.
    pub fn replace_all(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.clear();
        for event in events {
            if !self.contains(&event.id) {
                self.insert_sorted(event);
            }
        }
    }

    /// Patch a displayed event in place. Returns `false` if it is not shown.
    ///
    /// The patch must not change `timestamp_utc`.
    pub fn update<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Event),
    {
        match self.events.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                f(event);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    // Returns false when the event fell off the end of a full list.
    fn insert_sorted(&mut self, event: Event) -> bool {
        let pos = self
            .events
            .partition_point(|e| e.timestamp_utc >= event.timestamp_utc);
        if pos >= self.max_events {
            return false;
        }
        self.events.insert(pos, event);
        self.events.truncate(self.max_events);
        true
    }
}

/// What the consumer should do after the list changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    ScrollToTop,
    Hold,
}

/// Headless model of the feed view's auto-scroll behaviour.
///
/// The view follows the newest entry until the user scrolls away from the
/// top (past `threshold` pixels) or pauses by hovering. While not
/// following, new entries still arrive but the view holds its position and
/// a "resume" affordance is offered.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoScroll {
    threshold: f64,
    user_scrolled: bool,
    hover_paused: bool,
    resume_available: bool,
}

impl Default for AutoScroll {
    fn default() -> Self {
        AutoScroll::new(50.0)
    }
}

impl AutoScroll {
    pub fn new(threshold: f64) -> Self {
        AutoScroll {
            threshold,
            user_scrolled: false,
            hover_paused: false,
            resume_available: false,
        }
    }

    /// Record the scroll offset from the top of the list.
    pub fn on_scroll(&mut self, offset_from_top: f64) {
        self.user_scrolled = offset_from_top > self.threshold;
        if !self.user_scrolled && !self.hover_paused {
            self.resume_available = false;
        }
    }

    pub fn on_hover(&mut self, hovering: bool) {
        self.hover_paused = hovering;
    }

    pub fn on_list_grew(&mut self) -> ScrollAction {
        if self.is_following() {
            ScrollAction::ScrollToTop
        } else {
            self.resume_available = true;
            ScrollAction::Hold
        }
    }

    /// The user asked to follow the feed again.
    pub fn resume(&mut self) -> ScrollAction {
        self.user_scrolled = false;
        self.hover_paused = false;
        self.resume_available = false;
        ScrollAction::ScrollToTop
    }

    pub fn is_following(&self) -> bool {
        !self.user_scrolled && !self.hover_paused
    }

    pub fn resume_available(&self) -> bool {
        self.resume_available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn ev(id: &str, secs: i64) -> Event {
        Event::new(id, "oracle_prophecy", json!({"text": id}))
            .at(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
    }

    #[test]
    fn out_of_order_arrivals_are_sorted() {
        let mut list = DisplayList::new(10);
        list.apply(ev("b", 2), None);
        list.apply(ev("a", 1), None);
        list.apply(ev("c", 3), None);
        let ids: Vec<_> = list.events().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }

    #[test]
    fn old_event_into_full_list_is_evicted() {
        let mut list = DisplayList::new(2);
        list.apply(ev("b", 2), None);
        list.apply(ev("c", 3), None);
        assert_eq!(list.apply(ev("a", 1), None), Applied::Evicted("a".into()));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        let mut list = DisplayList::new(5);
        list.apply(ev("a", 1), None);
        assert_eq!(list.apply(ev("a", 2), None), Applied::Duplicate("a".into()));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn shrinking_cap_truncates_oldest() {
        let mut list = DisplayList::new(5);
        for i in 0..5 {
            list.apply(ev(&i.to_string(), i), None);
        }
        list.set_max_events(2);
        let ids: Vec<_> = list.events().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["4", "3"]);
    }

    #[test]
    fn auto_scroll_holds_while_scrolled_away() {
        let mut scroll = AutoScroll::default();
        assert_eq!(scroll.on_list_grew(), ScrollAction::ScrollToTop);

        scroll.on_scroll(120.0);
        assert_eq!(scroll.on_list_grew(), ScrollAction::Hold);
        assert!(scroll.resume_available());

        assert_eq!(scroll.resume(), ScrollAction::ScrollToTop);
        assert!(!scroll.resume_available());
        assert!(scroll.is_following());
    }

    #[test]
    fn hover_pauses_auto_scroll() {
        let mut scroll = AutoScroll::default();
        scroll.on_hover(true);
        assert_eq!(scroll.on_list_grew(), ScrollAction::Hold);
        scroll.on_hover(false);
        assert_eq!(scroll.on_list_grew(), ScrollAction::ScrollToTop);
    }
}
