//! Rate-limited delivery buffer between the aggregator and the display list.

use crate::aggregate::{self, merge_candidate_position};
use crate::event::Event;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Recommended polling granularity for [`ThrottleQueue::poll`].
pub const THROTTLE_TICK: Duration = Duration::from_millis(50);

/// FIFO of pending events released at no more than `max_per_second`.
///
/// The queue does not run a timer itself. The owner calls
/// [`poll`](Self::poll) on a fixed tick (see [`THROTTLE_TICK`]); each call
/// releases at most one event, and never sooner than the minimum interval
/// after the previous release.
#[derive(Debug, Clone)]
pub struct ThrottleQueue {
    pending: VecDeque<Event>,
    last_released: Option<Instant>,
    min_interval: Duration,
    max_depth: Option<usize>,
    dropped: u64,
}

impl ThrottleQueue {
    /// Create a queue releasing at most `max_per_second` events per second.
    ///
    /// A rate of zero (or below) is clamped to one release per second.
    pub fn new(max_per_second: f64) -> Self {
        ThrottleQueue {
            pending: VecDeque::new(),
            last_released: None,
            min_interval: min_interval(max_per_second),
            max_depth: None,
            dropped: 0,
        }
    }

    /// Bound the number of pending events. When full, pushing evicts the
    /// oldest pending event.
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth.map(|d| d.max(1));
        self.enforce_depth();
        self
    }

    pub fn set_rate(&mut self, max_per_second: f64) {
        self.min_interval = min_interval(max_per_second);
    }

    pub fn set_max_depth(&mut self, max_depth: Option<usize>) {
        self.max_depth = max_depth.map(|d| d.max(1));
        self.enforce_depth();
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Enqueue an event. Returns the evicted event when the depth cap was hit.
    pub fn push(&mut self, event: Event) -> Option<Event> {
        self.pending.push_back(event);
        self.enforce_depth()
    }

    /// Merge `incoming` into a compatible pending event, newest first.
    ///
    /// Returns `true` when a merge happened; the caller should then not
    /// push `incoming`.
    pub fn merge_pending(&mut self, incoming: &Event, window: Duration) -> bool {
        let Some(rev_pos) = merge_candidate_position(self.pending.iter().rev(), incoming, window)
        else {
            return false;
        };
        let pos = self.pending.len() - 1 - rev_pos;
        let merged = aggregate::merge(&self.pending[pos], incoming);
        self.pending[pos] = merged;
        true
    }

    /// Release the oldest pending event if the minimum interval has passed
    /// since the previous release.
    pub fn poll(&mut self, now: Instant) -> Option<Event> {
        if let Some(last) = self.last_released {
            if now.saturating_duration_since(last) < self.min_interval {
                return None;
            }
        }
        let event = self.pending.pop_front()?;
        self.last_released = Some(now);
        Some(event)
    }

    /// Take every pending event in FIFO order, ignoring the rate.
    pub fn drain(&mut self) -> Vec<Event> {
        self.pending.drain(..).collect()
    }

    /// Patch a pending event in place. Returns `false` if it is not queued.
    pub fn update<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Event),
    {
        match self.pending.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                f(event);
                true
            }
            None => false,
        }
    }

    /// Keep only the pending events `keep` accepts. Returns how many were
    /// removed; removals do not count as dropped.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&Event) -> bool,
    {
        let before = self.pending.len();
        self.pending.retain(|e| keep(e));
        before - self.pending.len()
    }

    pub fn get(&self, id: &str) -> Option<&Event> {
        self.pending.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of events evicted by the depth cap so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn enforce_depth(&mut self) -> Option<Event> {
        let max = self.max_depth?;
        let mut evicted = None;
        while self.pending.len() > max {
            evicted = self.pending.pop_front();
            self.dropped += 1;
        }
        evicted
    }
}

fn min_interval(max_per_second: f64) -> Duration {
    let rate = if max_per_second.is_finite() && max_per_second > 0.0 {
        max_per_second
    } else {
        1.0
    };
    Duration::try_from_secs_f64(1.0 / rate).unwrap_or(Duration::MAX)
}
