//! Routes a parsed query to the in-memory store, going through the WAL
//! first for mutations.

use std::sync::Arc;

use crate::compute::{Command, Compute};
use crate::error::{Error, Result};
use crate::replication::ReplicationNode;
use crate::store::InMemoryStore;
use crate::wal::Wal;

pub struct Dispatcher {
    store: Arc<InMemoryStore>,
    wal: Option<Arc<Wal>>,
    replication: Option<Arc<ReplicationNode>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<InMemoryStore>,
        wal: Option<Arc<Wal>>,
        replication: Option<Arc<ReplicationNode>>,
    ) -> Self {
        Self { store, wal, replication }
    }

    /// Parses and executes one query line, returning the response text.
    pub async fn dispatch(&self, line: &str) -> Result<String> {
        let query = Compute::new().handle_parse(line)?;

        match query.command {
            Command::Get => self.store.get(&query.key).await,
            Command::Set => {
                self.ensure_writable().await?;
                let wal = self.wal_or_err()?;
                let value = query
                    .arg
                    .ok_or_else(|| Error::Internal("SET query missing value".into()))?;
                wal.set(query.key.clone(), value.clone())
                    .await
                    .await
                    .map_err(|_| Error::Wal("batcher dropped the wait handle".into()))??;
                self.store.set(query.key, value).await;
                Ok(String::new())
            }
            Command::Del => {
                self.ensure_writable().await?;
                let wal = self.wal_or_err()?;
                wal.del(query.key.clone())
                    .await
                    .await
                    .map_err(|_| Error::Wal("batcher dropped the wait handle".into()))??;
                self.store.del(&query.key).await;
                Ok(String::new())
            }
        }
    }

    fn wal_or_err(&self) -> Result<&Arc<Wal>> {
        self.wal
            .as_ref()
            .ok_or_else(|| Error::Replication("this node is read-only".into()))
    }

    async fn ensure_writable(&self) -> Result<()> {
        if let Some(replication) = &self.replication {
            if !replication.is_leader().await {
                return Err(Error::Replication("writes must go to the leader".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::{BatcherFlushConfig, Wal};
    use std::time::Duration;

    async fn dispatcher_with_wal() -> (Dispatcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(
            dir.path().to_path_buf(),
            1024 * 1024,
            BatcherFlushConfig { size: 1, timeout: Duration::from_millis(50) },
        )
        .unwrap();
        let dispatcher = Dispatcher::new(InMemoryStore::new(), Some(Arc::new(wal)), None);
        (dispatcher, dir)
    }

    #[tokio::test]
    async fn set_returns_empty_and_get_sees_the_value() {
        let (dispatcher, _dir) = dispatcher_with_wal().await;
        assert_eq!(dispatcher.dispatch("SET a 1").await.unwrap(), "");
        assert_eq!(dispatcher.dispatch("GET a").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn del_returns_empty_and_removes_the_key() {
        let (dispatcher, _dir) = dispatcher_with_wal().await;
        dispatcher.dispatch("SET a 1").await.unwrap();
        assert_eq!(dispatcher.dispatch("DEL a").await.unwrap(), "");
        assert!(dispatcher.dispatch("GET a").await.is_err());
    }

    #[tokio::test]
    async fn writes_without_a_wal_are_rejected() {
        let dispatcher = Dispatcher::new(InMemoryStore::new(), None, None);
        assert!(dispatcher.dispatch("SET a 1").await.is_err());
    }
}
