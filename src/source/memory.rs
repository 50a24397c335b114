use super::{EventSource, SourceMessage, Subscription};
use crate::error::{FeedError, Result};
use crate::event::RawRecord;
use crate::state::ChannelStatus;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

const BROADCAST_CAPACITY: usize = 1024;

/// In-memory event table with a broadcast change feed.
///
/// Every [`insert`](Self::insert) stores the row and delivers it to all
/// live subscribers. Clones share the same table.
///
/// # Examples
///
/// ```
/// use livefeed::{ChannelSource, Event, EventSource};
/// use serde_json::json;
///
/// # futures::executor::block_on(async {
/// let source = ChannelSource::new();
/// source.insert(Event::new("1", "mega_slap", json!({"earned": 3})).to_record());
/// let rows = source.load_recent(10).await.unwrap();
/// assert_eq!(rows.len(), 1);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ChannelSource {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    rows: Mutex<Vec<RawRecord>>,
    tx: broadcast::Sender<SourceMessage>,
    unavailable: AtomicBool,
}

impl ChannelSource {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        ChannelSource {
            inner: Arc::new(Inner {
                rows: Mutex::new(Vec::new()),
                tx,
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// A table pre-populated with `rows`, oldest first.
    pub fn with_records(rows: impl IntoIterator<Item = RawRecord>) -> Self {
        let source = ChannelSource::new();
        source.rows().extend(rows);
        source
    }

    /// Store a row and notify subscribers.
    pub fn insert(&self, record: RawRecord) {
        self.rows().push(record.clone());
        // No receivers is fine: nobody is subscribed yet.
        let _ = self.inner.tx.send(SourceMessage::Record(record));
    }

    /// Broadcast a channel status change to subscribers.
    pub fn push_status(&self, status: ChannelStatus) {
        let _ = self.inner.tx.send(SourceMessage::Status(status));
    }

    /// Make queries and new subscriptions fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }

    fn rows(&self) -> MutexGuard<'_, Vec<RawRecord>> {
        self.inner.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(FeedError::SourceUnavailable("channel source offline".into()));
        }
        Ok(())
    }
}

impl Default for ChannelSource {
    fn default() -> Self {
        ChannelSource::new()
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn load_recent(&self, limit: usize) -> Result<Vec<RawRecord>> {
        self.check_available()?;
        Ok(self.rows().iter().rev().take(limit).cloned().collect())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        self.check_available()?;
        let mut rx = self.inner.tx.subscribe();
        let (tx, subscription) = Subscription::channel();

        let task = tokio::spawn(async move {
            if tx.send(SourceMessage::Status(ChannelStatus::Subscribed)).await.is_err() {
                return;
            }
            loop {
                let message = match rx.recv().await {
                    Ok(message) => message,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!(target: "livefeed::source", "subscriber lagged, dropped {n} records");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = tx.send(SourceMessage::Status(ChannelStatus::Closed)).await;
                        break;
                    }
                };
                if tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        Ok(subscription.with_task(task))
    }
}
