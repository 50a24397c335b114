//! Async driver running one feed: source subscription, throttle ticker,
//! config changes and enrichment, all serialized onto a single task.

use crate::config::{AdminConfig, ConfigStore};
use crate::enrich::{enrich_with_timeout, Enricher, Enrichment};
use crate::feed::{FeedCore, FeedSnapshot, Ingested};
use crate::source::{EventSource, SourceMessage, Subscription};
use crate::state::ChannelStatus;
use crate::throttle::THROTTLE_TICK;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};

const LOG_TARGET: &str = "livefeed::pipeline";

/// Builder for a running feed.
///
/// # Examples
///
/// ```no_run
/// use livefeed::{ChannelSource, ConfigStore, FeedPipeline};
///
/// # async fn run() {
/// let source = ChannelSource::new();
/// let config = ConfigStore::default();
/// let handle = FeedPipeline::new(source, config).spawn();
///
/// let mut updates = handle.subscribe();
/// while updates.changed().await.is_ok() {
///     let snapshot = updates.borrow_and_update().clone();
///     println!("{:?}: {} events", snapshot.status, snapshot.events.len());
/// }
/// # }
/// ```
pub struct FeedPipeline {
    source: Arc<dyn EventSource>,
    config: ConfigStore,
    enricher: Option<Arc<dyn Enricher>>,
}

impl FeedPipeline {
    pub fn new(source: impl EventSource + 'static, config: ConfigStore) -> Self {
        FeedPipeline {
            source: Arc::new(source),
            config,
            enricher: None,
        }
    }

    pub fn with_enricher(mut self, enricher: impl Enricher + 'static) -> Self {
        self.enricher = Some(Arc::new(enricher));
        self
    }

    /// Start the feed on the current tokio runtime.
    pub fn spawn(self) -> FeedHandle {
        let mut config_rx = self.config.subscribe();
        let config = config_rx.borrow_and_update().clone();
        let core = FeedCore::new(config);
        let (snapshot_tx, snapshot_rx) = watch::channel(core.snapshot());
        let (command_tx, command_rx) = mpsc::channel(8);

        let driver = Driver {
            core,
            source: self.source,
            enricher: self.enricher,
            subscription: None,
            enrichments: JoinSet::new(),
            snapshot_tx,
        };
        let task = tokio::spawn(driver.run(config_rx, command_rx));

        FeedHandle {
            snapshot_rx,
            command_tx,
            task: Some(task),
        }
    }
}

#[derive(Debug)]
enum Command {
    Reload,
}

/// Handle on a running feed.
///
/// Dropping the handle tears the feed down: the subscription is closed,
/// the ticker stops and pending enrichments are cancelled.
#[derive(Debug)]
pub struct FeedHandle {
    snapshot_rx: watch::Receiver<FeedSnapshot>,
    command_tx: mpsc::Sender<Command>,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// The latest published snapshot.
    pub fn snapshot(&self) -> FeedSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receive every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Redo the initial load and resubscribe, e.g. to recover from an
    /// error state.
    pub async fn reload(&self) {
        let _ = self.command_tx.send(Command::Reload).await;
    }

    /// Stop the feed and wait for its task to finish.
    ///
    /// An initial load still in flight is abandoned.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Driver {
    core: FeedCore,
    source: Arc<dyn EventSource>,
    enricher: Option<Arc<dyn Enricher>>,
    subscription: Option<Subscription>,
    enrichments: JoinSet<Option<(String, Enrichment)>>,
    snapshot_tx: watch::Sender<FeedSnapshot>,
}

impl Driver {
    async fn run(
        mut self,
        mut config_rx: watch::Receiver<AdminConfig>,
        mut command_rx: mpsc::Receiver<Command>,
    ) {
        self.connect().await;

        let mut ticker = time::interval(THROTTLE_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut config_open = true;

        loop {
            tokio::select! {
                message = next_message(&mut self.subscription) => {
                    self.on_message(message);
                }
                _ = ticker.tick(), if self.core.queued() > 0 => {
                    self.core.tick(Instant::now().into_std());
                }
                changed = config_rx.changed(), if config_open => {
                    match changed {
                        Ok(()) => {
                            let config = config_rx.borrow_and_update().clone();
                            self.on_config(config).await;
                        }
                        Err(_) => {
                            log::debug!(target: LOG_TARGET, "config store dropped, keeping last config");
                            config_open = false;
                        }
                    }
                }
                Some(done) = self.enrichments.join_next(), if !self.enrichments.is_empty() => {
                    if let Ok(Some((id, enrichment))) = done {
                        if !self.core.apply_enrichment(&id, &enrichment) {
                            log::debug!(target: LOG_TARGET, "enriched event {id} is no longer shown");
                        }
                    }
                }
                command = command_rx.recv() => {
                    match command {
                        Some(Command::Reload) => self.connect().await,
                        None => break,
                    }
                }
            }
            self.publish();
        }
    }

    // Subscribe before loading so nothing inserted during the load is
    // missed; overlap is removed by id.
    async fn connect(&mut self) {
        self.subscription = None;

        let realtime = self.core.config().real_time_enabled;
        if !realtime && self.core.config().demo_data_enabled {
            self.core.on_realtime_disabled();
            self.publish();
            return;
        }
        self.core.begin_load();
        self.publish();

        let subscribed = if realtime {
            Some(self.source.subscribe().await)
        } else {
            None
        };

        let limit = self.core.config().initial_load_limit;
        let loaded = self.source.load_recent(limit).await;
        let shown = self.core.finish_initial_load(loaded);
        log::info!(target: LOG_TARGET, "initial load displayed {shown} events");

        match subscribed {
            Some(Ok(subscription)) => self.subscription = Some(subscription),
            Some(Err(e)) => {
                log::warn!(target: LOG_TARGET, "subscribe failed: {e}");
                self.core.on_channel_status(ChannelStatus::Error);
            }
            None => {}
        }
        self.publish();
    }

    fn on_message(&mut self, message: Option<SourceMessage>) {
        match message {
            Some(SourceMessage::Record(record)) => {
                let outcome = self.core.ingest(record, Instant::now().into_std());
                if let Ingested::Appended(id) | Ingested::Queued(id) = outcome {
                    self.enrich(&id);
                }
            }
            Some(SourceMessage::Status(status)) => self.core.on_channel_status(status),
            None => {
                self.subscription = None;
                self.core.on_channel_status(ChannelStatus::Closed);
            }
        }
    }

    async fn on_config(&mut self, config: AdminConfig) {
        // Demo data left on screen after demo mode is switched off is
        // replaced by a fresh load.
        let stale_demo = !config.demo_data_enabled && self.core.state().shows_demo();
        let reconnect =
            stale_demo || config.real_time_enabled != self.core.config().real_time_enabled;
        self.core.set_config(config);
        if reconnect {
            self.connect().await;
        }
    }

    fn enrich(&mut self, id: &str) {
        let Some(enricher) = &self.enricher else {
            return;
        };
        let Some(event) = self.core.find(id).cloned() else {
            return;
        };
        if !enricher.wants(&event) {
            return;
        }
        let enricher = Arc::clone(enricher);
        let timeout = self.core.config().enrichment_timeout();
        self.enrichments.spawn(async move {
            let enrichment = enrich_with_timeout(enricher.as_ref(), &event, timeout).await?;
            Some((event.id, enrichment))
        });
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.core.snapshot());
    }
}

async fn next_message(subscription: &mut Option<Subscription>) -> Option<SourceMessage> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
