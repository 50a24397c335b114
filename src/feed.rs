//! The synchronous heart of a feed: filter, merge-or-append, throttle and
//! display, plus the data-source state machine.
//!
//! A [`FeedCore`] is owned by exactly one task. Every operation runs to
//! completion, so the merge lookup and the replace-or-insert that follows
//! form one atomic step per event.

use crate::config::AdminConfig;
use crate::demo;
use crate::display::{Applied, DisplayList};
use crate::error::Result;
use crate::event::{Event, RawRecord};
use crate::filter::{should_show, FilterPolicy};
use crate::state::{ChannelStatus, ConnectionStatus, FeedState, LoadOutcome};
use crate::throttle::ThrottleQueue;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::Instant;

const LOG_TARGET: &str = "livefeed::feed";

// Ids remembered per display slot. Merged records vanish from the list,
// so duplicates of them are caught here.
const SEEN_PER_SLOT: usize = 4;

/// Running counters for one feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    pub received: u64,
    pub malformed: u64,
    pub filtered: u64,
    pub duplicates: u64,
    pub merged: u64,
    pub appended: u64,
    pub evicted: u64,
    pub queued: u64,
    pub queue_dropped: u64,
    pub enriched: u64,
}

/// What happened to one incoming record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// Could not be normalized.
    Malformed,
    /// Hidden by the filter policy.
    Filtered,
    /// Already displayed or queued under this id.
    Duplicate(String),
    /// Folded into the displayed entry with this id.
    Merged(String),
    /// Inserted into the display list.
    Appended(String),
    /// Too old to make it into a full display list.
    Evicted(String),
    /// Waiting in the throttle queue.
    Queued(String),
    /// Folded into the queued entry with this id.
    MergedQueued(String),
}

/// Point-in-time view of a feed, as published to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub state: FeedState,
    pub status: ConnectionStatus,
    /// Newest first.
    pub events: Vec<Event>,
    pub queued: usize,
    pub stats: FeedStats,
}

/// Single-owner feed state.
#[derive(Debug, Clone)]
pub struct FeedCore {
    config: AdminConfig,
    policy: FilterPolicy,
    display: DisplayList,
    throttle: ThrottleQueue,
    state: FeedState,
    stats: FeedStats,
    seen: VecDeque<String>,
}

impl FeedCore {
    pub fn new(config: AdminConfig) -> Self {
        let throttle = ThrottleQueue::new(config.max_events_per_second)
            .with_max_depth(config.throttle_queue_cap);
        FeedCore {
            policy: config.filter_policy(),
            display: DisplayList::new(config.max_events),
            throttle,
            state: FeedState::AwaitingSource,
            stats: FeedStats::default(),
            seen: VecDeque::new(),
            config,
        }
    }

    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.connection_status()
    }

    pub fn events(&self) -> &[Event] {
        self.display.events()
    }

    pub fn queued(&self) -> usize {
        self.throttle.len()
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    /// A displayed or queued event by id.
    pub fn find(&self, id: &str) -> Option<&Event> {
        self.display.get(id).or_else(|| self.throttle.get(id))
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            state: self.state,
            status: self.status(),
            events: self.display.events().to_vec(),
            queued: self.throttle.len(),
            stats: self.stats.clone(),
        }
    }

    /// Apply a new admin config to subsequently processed events.
    ///
    /// A smaller `max_events` truncates the list at once; switching
    /// throttling off flushes the pending queue in arrival order.
    pub fn set_config(&mut self, config: AdminConfig) {
        self.policy = config.filter_policy();
        self.display.set_max_events(config.max_events);
        self.throttle.set_rate(config.max_events_per_second);
        self.throttle.set_max_depth(config.throttle_queue_cap);

        let flush = self.config.performance_throttling && !config.performance_throttling;
        self.config = config;
        if flush {
            let window = self.config.aggregation_window();
            for event in self.throttle.drain() {
                let applied = self.display.apply(event, window);
                self.count_applied(&applied);
            }
        }
    }

    /// A (re)connection is starting. Demo data is dropped once demo mode
    /// is off.
    pub fn begin_load(&mut self) {
        if self.state.shows_demo() && !self.config.demo_data_enabled {
            self.display.clear();
        }
        self.transition(self.state.on_reload());
    }

    /// Fold the result of the initial bulk load into the feed.
    ///
    /// A successful load replaces whatever is displayed (demo data
    /// included). Records are applied oldest first so bursts in history
    /// aggregate the same way live ones do. Queued events the load also
    /// delivered are dropped from the queue. Returns the displayable count.
    pub fn finish_initial_load(&mut self, result: Result<Vec<RawRecord>>) -> usize {
        let outcome = match result {
            Ok(records) => {
                self.display.clear();
                let window = self.config.aggregation_window();
                let now = Utc::now();
                let mut loaded = HashSet::new();
                for record in records.into_iter().rev() {
                    self.stats.received += 1;
                    let event = match record.normalize(now) {
                        Ok(event) => event,
                        Err(e) => {
                            self.stats.malformed += 1;
                            log::debug!(target: LOG_TARGET, "dropping record: {e}");
                            continue;
                        }
                    };
                    loaded.insert(event.id.clone());
                    if !self.passes_filter(&event) {
                        continue;
                    }
                    self.remember(&event.id);
                    let applied = self.display.apply(event, window);
                    self.count_applied(&applied);
                }
                let dropped = self.throttle.retain(|e| !loaded.contains(&e.id));
                if dropped > 0 {
                    self.stats.duplicates += dropped as u64;
                    log::debug!(target: LOG_TARGET, "load delivered {dropped} queued events, unqueued them");
                }
                LoadOutcome::Loaded(self.display.len())
            }
            Err(e) => {
                log::warn!(target: LOG_TARGET, "initial load failed: {e}");
                LoadOutcome::Failed
            }
        };
        let next = self.state.on_initial_load(outcome, self.config.demo_data_enabled);
        self.transition(next);
        match outcome {
            LoadOutcome::Loaded(n) => n,
            LoadOutcome::Failed => 0,
        }
    }

    /// React to a subscription status notification.
    pub fn on_channel_status(&mut self, status: ChannelStatus) {
        match status {
            ChannelStatus::Error | ChannelStatus::Timeout => {
                log::warn!(target: LOG_TARGET, "realtime channel reported {status:?}");
            }
            ChannelStatus::Subscribed | ChannelStatus::Closed => {
                log::debug!(target: LOG_TARGET, "realtime channel {status:?}");
            }
        }
        self.transition(self.state.on_channel_status(status));
    }

    /// Live delivery was switched off by an admin.
    pub fn on_realtime_disabled(&mut self) {
        self.transition(self.state.on_realtime_disabled(self.config.demo_data_enabled));
    }

    /// Normalize, filter and process one raw record from the source.
    pub fn ingest(&mut self, record: RawRecord, now: Instant) -> Ingested {
        self.stats.received += 1;
        let event = match record.normalize(Utc::now()) {
            Ok(event) => event,
            Err(e) => {
                self.stats.malformed += 1;
                log::debug!(target: LOG_TARGET, "dropping record: {e}");
                return Ingested::Malformed;
            }
        };
        self.ingest_normalized(event, now)
    }

    /// Process an already normalized event, applying the filter policy.
    pub fn ingest_event(&mut self, event: Event, now: Instant) -> Ingested {
        self.stats.received += 1;
        self.ingest_normalized(event, now)
    }

    /// Release at most one throttled event into the display list.
    pub fn tick(&mut self, now: Instant) -> Option<Applied> {
        let event = self.throttle.poll(now)?;
        let applied = self.display.apply(event, self.config.aggregation_window());
        self.count_applied(&applied);
        Some(applied)
    }

    /// Patch a displayed or queued event with narrative text.
    pub fn apply_enrichment(&mut self, id: &str, enrichment: &crate::Enrichment) -> bool {
        let patch = |event: &mut Event| crate::enrich::apply_enrichment(event, enrichment);
        let applied = self.display.update(id, patch) || self.throttle.update(id, patch);
        if applied {
            self.stats.enriched += 1;
        }
        applied
    }

    fn ingest_normalized(&mut self, event: Event, now: Instant) -> Ingested {
        if !self.passes_filter(&event) {
            return Ingested::Filtered;
        }
        self.process(event, now)
    }

    fn passes_filter(&mut self, event: &Event) -> bool {
        if should_show(event, &self.policy) {
            return true;
        }
        self.stats.filtered += 1;
        log::debug!(target: LOG_TARGET, "filtered {} ({})", event.id, event.event_type);
        false
    }

    fn process(&mut self, event: Event, now: Instant) -> Ingested {
        if self.was_seen(&event.id)
            || self.display.contains(&event.id)
            || self.throttle.contains(&event.id)
        {
            self.stats.duplicates += 1;
            log::debug!(target: LOG_TARGET, "duplicate delivery of {}", event.id);
            return Ingested::Duplicate(event.id);
        }

        if self.state.shows_demo() {
            log::info!(target: LOG_TARGET, "live data arrived, clearing demo events");
            self.display.clear();
        }
        self.transition(self.state.on_live_record());
        self.remember(&event.id);

        let window = self.config.aggregation_window();
        if !self.config.performance_throttling {
            let applied = self.display.apply(event, window);
            self.count_applied(&applied);
            return applied.into();
        }

        if let Some(w) = window {
            if self.display.has_merge_candidate(&event, w) {
                let applied = self.display.apply(event, window);
                self.count_applied(&applied);
                return applied.into();
            }
            if self.throttle.merge_pending(&event, w) {
                self.stats.merged += 1;
                return Ingested::MergedQueued(event.id);
            }
        }

        let id = event.id.clone();
        self.stats.queued += 1;
        if let Some(dropped) = self.throttle.push(event) {
            self.stats.queue_dropped += 1;
            log::warn!(target: LOG_TARGET, "throttle queue full, dropped {}", dropped.id);
        }
        Ingested::Queued(id)
    }

    fn remember(&mut self, id: &str) {
        self.seen.push_back(id.to_owned());
        let cap = self.config.max_events.saturating_mul(SEEN_PER_SLOT);
        while self.seen.len() > cap {
            self.seen.pop_front();
        }
    }

    fn was_seen(&self, id: &str) -> bool {
        self.seen.iter().any(|seen| seen == id)
    }

    fn count_applied(&mut self, applied: &Applied) {
        match applied {
            Applied::Merged(_) => self.stats.merged += 1,
            Applied::Appended(_) => self.stats.appended += 1,
            Applied::Duplicate(_) => self.stats.duplicates += 1,
            Applied::Evicted(_) => self.stats.evicted += 1,
        }
    }

    fn transition(&mut self, next: FeedState) {
        if next == self.state {
            return;
        }
        log::info!(target: LOG_TARGET, "feed state {:?} -> {:?}", self.state, next);
        if next.shows_demo() && !self.state.shows_demo() {
            self.display.replace_all(demo::demo_events(Utc::now()));
        }
        self.state = next;
    }
}

impl From<Applied> for Ingested {
    fn from(applied: Applied) -> Self {
        match applied {
            Applied::Merged(id) => Ingested::Merged(id),
            Applied::Appended(id) => Ingested::Appended(id),
            Applied::Duplicate(id) => Ingested::Duplicate(id),
            Applied::Evicted(id) => Ingested::Evicted(id),
        }
    }
}
