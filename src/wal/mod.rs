//! Write-Ahead Log
//!
//! Every mutation is appended to a segment file before it is applied to the
//! in-memory store. Writes are grouped into batches by [`batcher::Batcher`]
//! and fsynced together; callers get back a handle that resolves once their
//! record has actually hit disk.

pub mod batcher;
pub mod entry;
pub mod reader;
pub mod segment;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{oneshot, Mutex};
use tracing::info;

pub use batcher::{Batcher, BatcherFlushConfig, BatcherHandle};
pub use entry::{LogRecord, RecordCommand};
pub use reader::SegmentReader;
pub use segment::{list_segment_names, SegmentWriter, SEGMENT_NAME_LENGTH};

use crate::error::Result;

/// Monotonic-enough wall-clock nanosecond stamp used both as a record id
/// and, zero-padded, as a segment file name.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_nanos() as i64
}

/// Write-path facade: group-commits Set/Del through the batcher and exposes
/// the reader used for startup recovery and replication sync.
pub struct Wal {
    handle: BatcherHandle,
    reader: SegmentReader,
    data_dir: PathBuf,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Wal {
    pub fn open(data_dir: PathBuf, max_segment_size: u64, flush: BatcherFlushConfig) -> Result<Self> {
        let writer = SegmentWriter::new(data_dir.clone(), max_segment_size)?;
        let batcher = Batcher::new(flush, Box::new(writer));
        let handle = batcher.handle();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(batcher.run(shutdown_rx));

        Ok(Self {
            handle,
            reader: SegmentReader::new(data_dir.clone()),
            data_dir,
            shutdown: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
        })
    }

    pub fn reader(&self) -> &SegmentReader {
        &self.reader
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    /// Replays every segment on disk, in creation order, for startup recovery.
    pub fn recover(&self) -> Result<Vec<LogRecord>> {
        self.reader.read_all()
    }

    pub async fn set(&self, key: String, value: String) -> oneshot::Receiver<Result<()>> {
        self.handle.add(LogRecord::set(now_nanos(), key, value)).await
    }

    pub async fn del(&self, key: String) -> oneshot::Receiver<Result<()>> {
        self.handle.add(LogRecord::del(now_nanos(), key)).await
    }

    /// Flushes whatever is pending and stops the batcher task. Safe to call
    /// through a shared `Arc<Wal>`; a second call is a no-op.
    pub async fn close(&self) {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
        info!("WAL closed");
    }
}
