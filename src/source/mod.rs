//! Realtime change sources feeding the pipeline.
//!
//! A source offers two things: a bulk query for the most recent rows, and a
//! subscription that yields one [`SourceMessage::Record`] per inserted row
//! plus a [`SourceMessage::Status`] whenever the channel state changes.
//! Dropping a [`Subscription`] unsubscribes.

mod jsonl;
mod memory;

pub use jsonl::{line_hash, JsonlIter, JsonlReader, JsonlSource, JsonlTable, LineError, DEFAULT_POLL_INTERVAL};
pub use memory::ChannelSource;

use crate::error::Result;
use crate::event::RawRecord;
use crate::state::ChannelStatus;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the per-subscription message buffer.
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// One message from a realtime subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceMessage {
    Status(ChannelStatus),
    Record(RawRecord),
}

/// A realtime change feed over an event table.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// The most recent `limit` records, newest first.
    async fn load_recent(&self, limit: usize) -> Result<Vec<RawRecord>>;

    /// Start receiving newly inserted records.
    async fn subscribe(&self) -> Result<Subscription>;
}

#[async_trait]
impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    async fn load_recent(&self, limit: usize) -> Result<Vec<RawRecord>> {
        (**self).load_recent(limit).await
    }

    async fn subscribe(&self) -> Result<Subscription> {
        (**self).subscribe().await
    }
}

/// Live handle on a source subscription.
///
/// Yields messages until the source closes it. Dropping the handle stops
/// the background task delivering messages, if the source runs one.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<SourceMessage>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<SourceMessage>) -> Self {
        Subscription { rx, task: None }
    }

    /// Tie a delivery task to this subscription; it is aborted on drop.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// A subscription fed by the returned sender.
    pub fn channel() -> (mpsc::Sender<SourceMessage>, Subscription) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        (tx, Subscription::new(rx))
    }

    /// Wait for the next message. `None` once the source closed the feed.
    pub async fn recv(&mut self) -> Option<SourceMessage> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = SourceMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
