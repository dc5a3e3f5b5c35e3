//! In-memory key-value storage.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::info;

use crate::error::{Error, Result};
use crate::wal::{LogRecord, RecordCommand};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn get(&self, key: &str) -> Result<String> {
        self.data
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or(Error::KeyNotFound)
    }

    pub async fn set(&self, key: String, value: String) {
        self.data.write().await.insert(key, value);
    }

    pub async fn del(&self, key: &str) {
        self.data.write().await.remove(key);
    }

    /// Applies a single recovered or replicated record directly, bypassing
    /// the WAL (the record already came from one).
    pub async fn apply(&self, record: &LogRecord) {
        match record.command {
            RecordCommand::Set => {
                if let [key, value] = &record.args[..] {
                    self.set(key.clone(), value.clone()).await;
                }
            }
            RecordCommand::Del => {
                if let [key] = &record.args[..] {
                    self.del(key).await;
                }
            }
        }
    }

    pub async fn apply_batch(&self, records: &[LogRecord]) {
        for record in records {
            self.apply(record).await;
        }
    }
}

/// Drains batches of recovered/replicated records from `rx` and applies them
/// to `store`, in order, for as long as the channel stays open.
pub async fn run_recovery_consumer(
    store: Arc<InMemoryStore>,
    mut rx: mpsc::Receiver<Vec<LogRecord>>,
) {
    while let Some(batch) = rx.recv().await {
        info!(count = batch.len(), "applying recovered batch to store");
        store.apply_batch(&batch).await;
    }
}
