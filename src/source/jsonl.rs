use super::{EventSource, SourceMessage, Subscription};
use crate::error::{FeedError, Result};
use crate::event::{RawId, RawRecord};
use crate::state::ChannelStatus;
use async_trait::async_trait;
use fs2::FileExt;
use notify::{RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

const TABLE_FILE: &str = "events.jsonl";

/// Fallback poll interval for tailing when no file notification arrives.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Compute xxh64 hash of raw line bytes (without trailing newline), hex-encoded.
pub fn line_hash(line: &[u8]) -> String {
    let hash = xxhash_rust::xxh64::xxh64(line, 0);
    format!("{:016x}", hash)
}

/// Writer side of an append-only JSON-lines event table.
///
/// The table lives in `<dir>/events.jsonl`, one [`RawRecord`] per line.
/// Only one writer may hold a directory at a time; the exclusive lock is
/// released when the table is dropped.
#[derive(Debug)]
pub struct JsonlTable {
    file: File,
    reader: JsonlReader,
}

impl JsonlTable {
    /// Open or create a table in `dir` and take the writer lock.
    ///
    /// Fails with [`FeedError::Locked`] if another writer holds it.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(TABLE_FILE);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(FeedError::Locked { path });
        }

        Ok(JsonlTable {
            file,
            reader: JsonlReader::new(path),
        })
    }

    /// Append a record as a single line and flush it to disk.
    ///
    /// Returns the byte offset just past the written line.
    pub fn insert(&mut self, record: &RawRecord) -> Result<u64> {
        let json = serde_json::to_string(record)?;
        writeln!(self.file, "{json}")?;
        self.file.sync_data()?;
        Ok(self.file.seek(SeekFrom::End(0))?)
    }

    /// A reader over the same table. Readers take no lock.
    pub fn reader(&self) -> JsonlReader {
        self.reader.clone()
    }

    pub fn path(&self) -> &Path {
        self.reader.path()
    }
}

/// Read side of a [`JsonlTable`]; cheap to clone.
#[derive(Debug, Clone)]
pub struct JsonlReader {
    path: PathBuf,
}

impl JsonlReader {
    /// A reader for the table in `dir`, which need not exist yet.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        JsonlReader::new(dir.as_ref().join(TABLE_FILE))
    }

    fn new(path: PathBuf) -> Self {
        JsonlReader { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the table file in bytes (0 if it does not exist).
    pub fn size(&self) -> Result<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Read records starting at byte `offset`.
    ///
    /// Yields `(record, next_offset)` for each complete line. Empty lines
    /// and a trailing partial line (no newline yet) are skipped. A line
    /// that is not a valid record yields an error but does not stop the
    /// iteration. Records without an `id` get the hash of their line.
    pub fn read_from(&self, offset: u64) -> Result<JsonlIter> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(JsonlIter {
                    lines: None,
                    pos: offset,
                    file_len: 0,
                });
            }
            Err(e) => return Err(e.into()),
        };
        let file_len = file.metadata()?.len();
        file.seek(SeekFrom::Start(offset))?;

        Ok(JsonlIter {
            lines: Some(BufReader::new(file)),
            pos: offset,
            file_len,
        })
    }

    /// The last `limit` valid records, newest first, and the offset just
    /// past the last complete line.
    pub fn load_recent(&self, limit: usize) -> Result<(Vec<RawRecord>, u64)> {
        let mut records = VecDeque::with_capacity(limit.min(1024));
        let mut end = 0;
        for item in self.read_from(0)? {
            match item {
                Ok((record, next)) => {
                    if limit > 0 {
                        if records.len() == limit {
                            records.pop_front();
                        }
                        records.push_back(record);
                    }
                    end = next;
                }
                Err(LineError { next, error }) => {
                    log::warn!(target: "livefeed::source", "skipping bad line in {}: {error}", self.path.display());
                    end = next;
                }
            }
        }
        Ok((records.into_iter().rev().collect(), end))
    }
}

/// A line that could not be read as a record.
#[derive(Debug)]
pub struct LineError {
    /// Offset just past the bad line; reading can resume there.
    pub next: u64,
    pub error: FeedError,
}

/// Iterator returned by [`JsonlReader::read_from`].
#[derive(Debug)]
pub struct JsonlIter {
    lines: Option<BufReader<File>>,
    pos: u64,
    file_len: u64,
}

impl JsonlIter {
    /// Offset of the first byte not yet consumed.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Iterator for JsonlIter {
    type Item = std::result::Result<(RawRecord, u64), LineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.lines.as_mut()?;
        loop {
            let mut buf = Vec::new();
            let read = match reader.read_until(b'\n', &mut buf) {
                Ok(n) => n,
                Err(e) => {
                    self.lines = None;
                    return Some(Err(LineError {
                        next: self.pos,
                        error: e.into(),
                    }));
                }
            };
            if read == 0 {
                return None;
            }

            // A line reaching EOF without its newline is still being
            // written (or was cut by a crash); leave it for a later read.
            if buf.last() != Some(&b'\n') || self.pos + read as u64 > self.file_len {
                return None;
            }

            let next_pos = self.pos + read as u64;
            self.pos = next_pos;

            let line = &buf[..buf.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let mut record: RawRecord = match serde_json::from_slice(line) {
                Ok(r) => r,
                Err(e) => {
                    return Some(Err(LineError {
                        next: next_pos,
                        error: e.into(),
                    }));
                }
            };
            if record.id.is_none() {
                record.id = Some(RawId::Text(line_hash(line)));
            }
            return Some(Ok((record, next_pos)));
        }
    }
}

/// [`EventSource`] tailing a [`JsonlTable`] on disk.
///
/// New lines are picked up on file-change notifications, with a polling
/// fallback for filesystems that do not deliver them.
#[derive(Debug, Clone)]
pub struct JsonlSource {
    reader: JsonlReader,
    poll_interval: Duration,
}

impl JsonlSource {
    pub fn new(reader: JsonlReader) -> Self {
        JsonlSource {
            reader,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl EventSource for JsonlSource {
    async fn load_recent(&self, limit: usize) -> Result<Vec<RawRecord>> {
        let reader = self.reader.clone();
        let (records, _) = tokio::task::spawn_blocking(move || reader.load_recent(limit))
            .await
            .map_err(|e| FeedError::SourceUnavailable(format!("load task failed: {e}")))??;
        Ok(records)
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let reader = self.reader.clone();
        let poll_interval = self.poll_interval;
        let start = reader.size()?;
        let (tx, subscription) = Subscription::channel();

        // Capacity one: a pending wakeup already covers later changes.
        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        let watcher = watch_table(reader.path(), wake_tx);

        let task = tokio::spawn(async move {
            let _watcher = match watcher {
                Ok(w) => {
                    if tx.send(SourceMessage::Status(ChannelStatus::Subscribed)).await.is_err() {
                        return;
                    }
                    Some(w)
                }
                Err(e) => {
                    log::warn!(target: "livefeed::source", "cannot watch {}: {e}", reader.path().display());
                    if tx.send(SourceMessage::Status(ChannelStatus::Error)).await.is_err() {
                        return;
                    }
                    None
                }
            };

            let mut offset = start;
            loop {
                tokio::select! {
                    _ = wake_rx.recv() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = tx.closed() => break,
                }

                let tail = reader.clone();
                let read = tokio::task::spawn_blocking(move || read_tail(&tail, offset)).await;
                let (records, next) = match read {
                    Ok(Ok(batch)) => batch,
                    Ok(Err(e)) => {
                        log::warn!(target: "livefeed::source", "tail read failed: {e}");
                        continue;
                    }
                    Err(e) => {
                        log::warn!(target: "livefeed::source", "tail task failed: {e}");
                        continue;
                    }
                };
                offset = next;
                for record in records {
                    if tx.send(SourceMessage::Record(record)).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(subscription.with_task(task))
    }
}

fn watch_table(path: &Path, wake: mpsc::Sender<()>) -> Result<notify::RecommendedWatcher> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if res.is_ok() {
            let _ = wake.try_send(());
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

// Reads every complete line after `offset`. The file may have been
// truncated or replaced, in which case reading restarts from the top.
fn read_tail(reader: &JsonlReader, offset: u64) -> Result<(Vec<RawRecord>, u64)> {
    let offset = if reader.size()? < offset { 0 } else { offset };
    let mut iter = reader.read_from(offset)?;
    let mut records = Vec::new();
    for item in iter.by_ref() {
        match item {
            Ok((record, _)) => records.push(record),
            Err(LineError { error, .. }) => {
                log::warn!(target: "livefeed::source", "skipping bad line in {}: {error}", reader.path().display());
            }
        }
    }
    Ok((records, iter.position()))
}
