//! Live event feed pipeline.
//!
//! Raw records from a realtime [`EventSource`] are normalized into
//! [`Event`]s, filtered by an admin [`FilterPolicy`], merged into recent
//! entries when they are part of a burst, optionally rate-limited by a
//! [`ThrottleQueue`], and folded into a capped, newest-first
//! [`DisplayList`]. A [`FeedPipeline`] runs all of this on one task and
//! publishes [`FeedSnapshot`]s for a UI to render.

mod aggregate;
pub mod config;
pub mod demo;
mod display;
mod enrich;
mod error;
mod event;
mod feed;
mod filter;
mod pipeline;
pub mod source;
mod state;
mod throttle;

pub use aggregate::{
    find_merge_candidate, is_aggregatable, merge, merge_candidate_position, AGGREGATABLE_TYPES,
    DEFAULT_WINDOW,
};
pub use config::{AdminConfig, ConfigStore};
pub use display::{Applied, AutoScroll, DisplayList, ScrollAction, DEFAULT_MAX_EVENTS};
pub use enrich::{apply_enrichment, enrich_with_timeout, Enricher, Enrichment};
pub use error::{FeedError, Result};
pub use event::{keys, Event, RawId, RawRecord};
pub use feed::{FeedCore, FeedSnapshot, FeedStats, Ingested};
pub use filter::{is_hidden_type, should_show, FilterPolicy, HIDDEN_EVENT_TYPES};
pub use pipeline::{FeedHandle, FeedPipeline};
pub use source::{ChannelSource, EventSource, JsonlSource, JsonlTable, SourceMessage, Subscription};
pub use state::{ChannelStatus, ConnectionStatus, FeedState, LoadOutcome};
pub use throttle::{ThrottleQueue, THROTTLE_TICK};
