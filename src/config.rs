//! Admin configuration and its observable store.
//!
//! The config is passed explicitly into each pipeline. Changes are
//! published through [`ConfigStore`] and take effect for events processed
//! after the change; already displayed entries are not reprocessed.
//!
//! The config file is plain JSON and can be edited by hand:
//!
//! ```text
//! $ cat feed-config.json
//! {
//!   "filtering_enabled": true,
//!   "debug_mode": false,
//!   "allowed_types": [],
//!   "performance_throttling": true,
//!   "max_events_per_second": 4.0,
//!   ...
//! }
//! ```

use crate::error::{FeedError, Result};
use crate::filter::FilterPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Slowest accepted throttle rate, in events per second.
pub const MIN_EVENTS_PER_SECOND: f64 = 1e-3;

/// Widest accepted aggregation window, in seconds.
pub const MAX_WINDOW_SECS: f64 = u32::MAX as f64;

/// Everything an admin can tune about a feed.
///
/// Missing keys in a config file take their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub filtering_enabled: bool,
    pub debug_mode: bool,
    pub allowed_types: BTreeSet<String>,
    /// Route events through the throttle queue.
    pub performance_throttling: bool,
    pub max_events_per_second: f64,
    pub real_time_enabled: bool,
    pub demo_data_enabled: bool,
    /// Display list cap.
    pub max_events: usize,
    pub aggregation_enabled: bool,
    pub aggregation_window_secs: f64,
    /// Bound on pending throttled events; `None` is unbounded.
    pub throttle_queue_cap: Option<usize>,
    /// How many records the initial bulk load asks for.
    pub initial_load_limit: usize,
    pub enrichment_timeout_ms: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        AdminConfig {
            filtering_enabled: true,
            debug_mode: false,
            allowed_types: BTreeSet::new(),
            performance_throttling: false,
            max_events_per_second: 10.0,
            real_time_enabled: true,
            demo_data_enabled: true,
            max_events: crate::display::DEFAULT_MAX_EVENTS,
            aggregation_enabled: true,
            aggregation_window_secs: crate::aggregate::DEFAULT_WINDOW.as_secs_f64(),
            throttle_queue_cap: None,
            initial_load_limit: 50,
            enrichment_timeout_ms: 3000,
        }
    }
}

impl AdminConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_events == 0 {
            return Err(FeedError::InvalidConfig("max_events must be at least 1".into()));
        }
        if !(self.max_events_per_second.is_finite()
            && self.max_events_per_second >= MIN_EVENTS_PER_SECOND)
        {
            return Err(FeedError::InvalidConfig(format!(
                "max_events_per_second must be at least {MIN_EVENTS_PER_SECOND}, got {}",
                self.max_events_per_second
            )));
        }
        if !(0.0..=MAX_WINDOW_SECS).contains(&self.aggregation_window_secs) {
            return Err(FeedError::InvalidConfig(format!(
                "aggregation_window_secs must be between 0 and {MAX_WINDOW_SECS}, got {}",
                self.aggregation_window_secs
            )));
        }
        if self.throttle_queue_cap == Some(0) {
            return Err(FeedError::InvalidConfig(
                "throttle_queue_cap must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        FilterPolicy {
            filtering_enabled: self.filtering_enabled,
            debug_mode: self.debug_mode,
            allowed_types: self.allowed_types.clone(),
        }
    }

    /// The aggregation window, or `None` when merging is off.
    pub fn aggregation_window(&self) -> Option<Duration> {
        self.aggregation_enabled.then(|| {
            Duration::try_from_secs_f64(self.aggregation_window_secs.max(0.0))
                .unwrap_or(Duration::MAX)
        })
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_millis(self.enrichment_timeout_ms)
    }
}

/// Save a config atomically to disk.
///
/// Writes to a `.tmp` file first, syncs, then renames to the final path.
/// If the process crashes mid-write, the old file survives intact.
pub fn save(path: &Path, config: &AdminConfig) -> Result<()> {
    config.validate()?;
    let tmp_path = path.with_extension("json.tmp");

    let json = serde_json::to_string_pretty(config)?;

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_data()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a config from disk.
///
/// A missing file yields the defaults; an unparseable or invalid file is
/// an error.
pub fn load(path: &Path) -> Result<AdminConfig> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!(target: "livefeed::config", "no config at {}, using defaults", path.display());
            return Ok(AdminConfig::default());
        }
        Err(e) => return Err(e.into()),
    };

    let config: AdminConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Shared, observable holder of the current [`AdminConfig`].
///
/// Cloning the store is cheap; all clones see the same value. Pipelines
/// call [`subscribe`](Self::subscribe) and react when it changes.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    tx: Arc<watch::Sender<AdminConfig>>,
}

impl ConfigStore {
    pub fn new(config: AdminConfig) -> Self {
        let (tx, _) = watch::channel(config);
        ConfigStore { tx: Arc::new(tx) }
    }

    /// Open a store backed by the file at `path` (defaults when absent).
    pub fn load(path: &Path) -> Result<Self> {
        Ok(ConfigStore::new(load(path)?))
    }

    pub fn get(&self) -> AdminConfig {
        self.tx.borrow().clone()
    }

    /// Replace the config and notify subscribers.
    pub fn set(&self, config: AdminConfig) -> Result<()> {
        config.validate()?;
        self.tx.send_replace(config);
        Ok(())
    }

    /// Modify the config in place and notify subscribers.
    ///
    /// The change is rejected, and nothing is published, when the result
    /// does not validate.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AdminConfig),
    {
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }

    pub fn subscribe(&self) -> watch::Receiver<AdminConfig> {
        self.tx.subscribe()
    }

    /// Persist the current value.
    pub fn save(&self, path: &Path) -> Result<()> {
        save(path, &self.get())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        ConfigStore::new(AdminConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AdminConfig::default().validate().unwrap();
    }

    #[test]
    fn invalid_update_is_not_published() {
        let store = ConfigStore::default();
        let rx = store.subscribe();
        let err = store.update(|c| c.max_events_per_second = 0.0).unwrap_err();
        assert!(matches!(err, FeedError::InvalidConfig(_)));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.get(), AdminConfig::default());
    }

    #[test]
    fn update_notifies_subscribers() {
        let store = ConfigStore::default();
        let mut rx = store.subscribe();
        store.update(|c| c.debug_mode = true).unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().debug_mode);
    }

    #[test]
    fn disabled_aggregation_has_no_window() {
        let config = AdminConfig {
            aggregation_enabled: false,
            ..AdminConfig::default()
        };
        assert_eq!(config.aggregation_window(), None);
        assert_eq!(
            AdminConfig::default().aggregation_window(),
            Some(Duration::from_secs(60))
        );
    }
}
