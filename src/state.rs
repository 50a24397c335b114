//! Where the displayed data comes from, as a small explicit state machine.
//!
//! All transitions are pure functions of the current state and an input;
//! the pipeline applies them and logs every change.

use serde::{Deserialize, Serialize};

/// Source of the data currently on display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    /// Initial load or subscription setup in progress.
    #[default]
    AwaitingSource,
    /// Showing real data from the source.
    Live,
    /// Showing the synthesized demo set because there is no real data.
    Demo,
    /// Showing the demo set because the source failed.
    DemoFallback,
    /// The source failed and no fallback applies.
    Error,
}

/// Tri-state connection indicator shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Error,
}

/// Status notifications from a realtime subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Subscribed,
    Error,
    Timeout,
    Closed,
}

/// Outcome of the initial bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The query succeeded with this many displayable records.
    Loaded(usize),
    Failed,
}

impl FeedState {
    pub fn connection_status(self) -> ConnectionStatus {
        match self {
            FeedState::AwaitingSource => ConnectionStatus::Connecting,
            FeedState::Live | FeedState::Demo => ConnectionStatus::Connected,
            FeedState::Error | FeedState::DemoFallback => ConnectionStatus::Error,
        }
    }

    pub fn on_initial_load(self, outcome: LoadOutcome, demo_enabled: bool) -> FeedState {
        match outcome {
            LoadOutcome::Loaded(n) if n > 0 => FeedState::Live,
            LoadOutcome::Loaded(_) if demo_enabled => FeedState::Demo,
            LoadOutcome::Loaded(_) => FeedState::Live,
            LoadOutcome::Failed if demo_enabled => FeedState::DemoFallback,
            LoadOutcome::Failed => FeedState::Error,
        }
    }

    pub fn on_channel_status(self, status: ChannelStatus) -> FeedState {
        match (self, status) {
            (FeedState::AwaitingSource, ChannelStatus::Subscribed) => FeedState::Live,
            (state, ChannelStatus::Subscribed) => state,
            (
                FeedState::Demo | FeedState::DemoFallback,
                ChannelStatus::Error | ChannelStatus::Timeout,
            ) => FeedState::DemoFallback,
            (_, ChannelStatus::Error | ChannelStatus::Timeout) => FeedState::Error,
            (state, ChannelStatus::Closed) => state,
        }
    }

    /// A real record arrived and was accepted for display.
    pub fn on_live_record(self) -> FeedState {
        FeedState::Live
    }

    /// Real-time delivery was switched off by an admin.
    pub fn on_realtime_disabled(self, demo_enabled: bool) -> FeedState {
        if demo_enabled { FeedState::Demo } else { self }
    }

    /// A (re)load is starting.
    pub fn on_reload(self) -> FeedState {
        FeedState::AwaitingSource
    }

    /// Whether the next accepted live record must first clear demo data.
    pub fn shows_demo(self) -> bool {
        matches!(self, FeedState::Demo | FeedState::DemoFallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_load_falls_back_to_demo_only_when_enabled() {
        let s = FeedState::AwaitingSource;
        assert_eq!(s.on_initial_load(LoadOutcome::Loaded(0), true), FeedState::Demo);
        assert_eq!(s.on_initial_load(LoadOutcome::Loaded(0), false), FeedState::Live);
        assert_eq!(s.on_initial_load(LoadOutcome::Loaded(3), true), FeedState::Live);
    }

    #[test]
    fn failed_load_is_error_without_demo() {
        let s = FeedState::AwaitingSource;
        assert_eq!(s.on_initial_load(LoadOutcome::Failed, false), FeedState::Error);
        assert_eq!(s.on_initial_load(LoadOutcome::Failed, true), FeedState::DemoFallback);
        assert_eq!(FeedState::Error.connection_status(), ConnectionStatus::Error);
        assert_eq!(FeedState::DemoFallback.connection_status(), ConnectionStatus::Error);
        assert_eq!(FeedState::Demo.connection_status(), ConnectionStatus::Connected);
    }

    #[test]
    fn channel_errors_keep_demo_data() {
        assert_eq!(
            FeedState::Demo.on_channel_status(ChannelStatus::Timeout),
            FeedState::DemoFallback
        );
        assert_eq!(
            FeedState::DemoFallback.on_channel_status(ChannelStatus::Subscribed),
            FeedState::DemoFallback
        );
        assert_eq!(FeedState::Live.on_channel_status(ChannelStatus::Error), FeedState::Error);
        assert_eq!(
            FeedState::AwaitingSource.on_channel_status(ChannelStatus::Subscribed),
            FeedState::Live
        );
        assert_eq!(FeedState::Error.on_channel_status(ChannelStatus::Subscribed), FeedState::Error);
    }

    #[test]
    fn live_record_replaces_demo() {
        assert!(FeedState::Demo.shows_demo());
        assert!(FeedState::DemoFallback.shows_demo());
        assert_eq!(FeedState::Demo.on_live_record(), FeedState::Live);
        assert_eq!(FeedState::DemoFallback.on_live_record(), FeedState::Live);
    }
}
