use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the feed pipeline and its sources.
///
/// Inside a running [`FeedPipeline`](crate::FeedPipeline) none of these
/// escape: they are turned into state transitions and log records. They are
/// returned directly by the synchronous building blocks (sources, config
/// persistence, record normalization).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FeedError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    /// The raw record cannot be turned into an [`Event`](crate::Event).
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[error("event source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("another writer holds the lock on {}", path.display())]
    Locked { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, FeedError>;
