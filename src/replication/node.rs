//! Replication node: a one-shot, lowest-id-wins election followed by
//! either serving the WAL to followers (leader) or periodically pulling
//! missing segments from the leader (follower).
//!
//! Deliberately simpler than quorum-based consensus: there is no ongoing
//! re-election and no automatic failover once a role is decided.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::network::{RequestHandler, TcpClient};
use crate::wal::{LogRecord, SegmentReader, SegmentWriter};

use super::protocol::{
    decode_new_host_reply, decode_sync_segment_reply, encode_new_host_reply, encode_pong,
    encode_sync_segment_reply, is_pong, PeerRequest, SyncSegmentReply,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

/// Consecutive decode failures on the same segment before it is quarantined
/// (skipped) instead of retried forever.
const POISON_PILL_THRESHOLD: u32 = 2;

pub struct ReplicationNode {
    id: i64,
    host: String,
    peer_clients: Mutex<HashMap<String, Arc<TcpClient>>>,
    /// The elected master's client handle, as seen by a follower. `None` on
    /// a node that turned out to be the master itself, or before `elect()`
    /// has run.
    master: Mutex<Option<Arc<TcpClient>>>,
    role: RwLock<Role>,
    sync_interval: Duration,
    wal_reader: Arc<SegmentReader>,
    follower_writer: Mutex<SegmentWriter>,
    recovery_tx: mpsc::Sender<Vec<LogRecord>>,
    last_synced_segment: Mutex<Option<String>>,
    quarantine: Mutex<(Option<String>, u32)>,
    shutdown: watch::Sender<bool>,
}

impl ReplicationNode {
    pub fn new(
        id: i64,
        host: String,
        peers: Vec<String>,
        sync_interval: Duration,
        wal_reader: Arc<SegmentReader>,
        follower_writer: SegmentWriter,
        recovery_tx: mpsc::Sender<Vec<LogRecord>>,
    ) -> Self {
        let peer_clients = peers
            .into_iter()
            .map(|addr| {
                let client = Self::new_peer_client(&addr);
                (addr, client)
            })
            .collect();

        let (shutdown, _) = watch::channel(false);

        Self {
            id,
            host,
            peer_clients: Mutex::new(peer_clients),
            master: Mutex::new(None),
            role: RwLock::new(Role::Leader),
            sync_interval,
            wal_reader,
            follower_writer: Mutex::new(follower_writer),
            recovery_tx,
            last_synced_segment: Mutex::new(None),
            quarantine: Mutex::new((None, 0)),
            shutdown,
        }
    }

    fn new_peer_client(address: &str) -> Arc<TcpClient> {
        Arc::new(TcpClient::new(
            address.to_string(),
            Duration::from_secs(5),
            Duration::from_secs(5),
            3,
        ))
    }

    /// Remembers a peer that announced itself via `NewHost`, opening a
    /// client back to it if one is not already tracked.
    async fn remember_peer(&self, address: &str) -> Arc<TcpClient> {
        let mut peers = self.peer_clients.lock().await;
        peers
            .entry(address.to_string())
            .or_insert_with(|| Self::new_peer_client(address))
            .clone()
    }

    pub async fn role(&self) -> Role {
        *self.role.read().await
    }

    pub async fn is_leader(&self) -> bool {
        self.role().await == Role::Leader
    }

    /// Broadcasts this node's id to every peer and keeps whichever id is
    /// lowest, including its own. Peers that do not answer are simply not
    /// counted; there is no quorum requirement.
    pub async fn elect(self: &Arc<Self>) -> Role {
        let mut min_id = self.id;
        let mut master_addr: Option<String> = None;

        let peers: Vec<(String, Arc<TcpClient>)> = self
            .peer_clients
            .lock()
            .await
            .iter()
            .map(|(addr, client)| (addr.clone(), client.clone()))
            .collect();

        for (addr, client) in &peers {
            let request = PeerRequest::NewHost {
                id: self.id,
                address: self.host.clone(),
            };
            match client.send(&request.encode()).await {
                Ok(reply) => match decode_new_host_reply(&reply) {
                    Ok(peer_id) => {
                        debug!(peer = %addr, peer_id, "received NewHost reply");
                        if peer_id < min_id {
                            min_id = peer_id;
                            master_addr = Some(addr.clone());
                        }
                    }
                    Err(e) => warn!(peer = %addr, error = %e, "malformed NewHost reply"),
                },
                Err(e) => warn!(peer = %addr, error = %e, "NewHost broadcast failed"),
            }
        }

        let role = if min_id == self.id { Role::Leader } else { Role::Follower };
        *self.role.write().await = role;

        let master_client = master_addr
            .and_then(|addr| peers.iter().find(|(a, _)| a == &addr).map(|(_, c)| c.clone()));
        *self.master.lock().await = master_client;

        info!(id = self.id, ?role, "replication role decided");
        role
    }

    /// Starts the follower sync loop. No-op if this node turned out to be
    /// the leader.
    pub async fn run(self: Arc<Self>) {
        if self.is_leader().await {
            return;
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.sync_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_once().await {
                        warn!(error = %e, "segment sync failed");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn sync_once(&self) -> Result<()> {
        let master = match self.master.lock().await.clone() {
            Some(client) => client,
            None => return Ok(()), // no master known yet; nothing to sync against
        };

        let last = self.last_synced_segment.lock().await.clone();
        let request = PeerRequest::SyncSegment { last_segment_name: last };

        let reply = master.send(&request.encode()).await?;
        match decode_sync_segment_reply(&reply)? {
            SyncSegmentReply::UpToDate => Ok(()),
            SyncSegmentReply::Segment { name, payload } => self.ingest_segment(name, payload).await,
        }
    }

    async fn ingest_segment(&self, name: String, payload: Vec<u8>) -> Result<()> {
        let records = match self.wal_reader.decode(&payload) {
            Ok(records) => records,
            Err(e) => {
                let mut quarantine = self.quarantine.lock().await;
                if quarantine.0.as_deref() == Some(name.as_str()) {
                    quarantine.1 += 1;
                } else {
                    *quarantine = (Some(name.clone()), 1);
                }
                if quarantine.1 >= POISON_PILL_THRESHOLD {
                    warn!(segment = %name, "quarantining unreadable segment after repeated failures");
                    *self.last_synced_segment.lock().await = Some(name);
                    return Ok(());
                }
                return Err(e);
            }
        };

        self.follower_writer.lock().await.save_segment(&name, &payload)?;
        if !records.is_empty() {
            let _ = self.recovery_tx.send(records).await;
        }
        *self.last_synced_segment.lock().await = Some(name);
        *self.quarantine.lock().await = (None, 0);
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[async_trait]
impl RequestHandler for ReplicationNode {
    async fn handle(&self, request: Vec<u8>) -> Vec<u8> {
        let request = match PeerRequest::decode(&request) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed peer request");
                return Vec::new();
            }
        };

        match request {
            PeerRequest::Ping => encode_pong(),
            PeerRequest::NewHost { id, address } => {
                debug!(id, %address, "peer announced itself");
                if !address.is_empty() && address != self.host {
                    self.remember_peer(&address).await;
                }
                encode_new_host_reply(self.id)
            }
            PeerRequest::SyncSegment { last_segment_name } => {
                match self
                    .wal_reader
                    .next_segment_name(last_segment_name.as_deref())
                {
                    Ok(None) => encode_sync_segment_reply(&SyncSegmentReply::UpToDate),
                    Ok(Some(name)) => match self.wal_reader.read_segment(&name) {
                        Ok(payload) => {
                            encode_sync_segment_reply(&SyncSegmentReply::Segment { name, payload })
                        }
                        Err(e) => {
                            warn!(segment = %name, error = %e, "failed to read segment for sync");
                            encode_sync_segment_reply(&SyncSegmentReply::UpToDate)
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "failed to list segments for sync");
                        encode_sync_segment_reply(&SyncSegmentReply::UpToDate)
                    }
                }
            }
        }
    }
}

/// Pings a peer once, returning whether it answered. Kept separate from
/// [`ReplicationNode::elect`] as a lightweight liveness probe.
pub async fn ping(client: &TcpClient) -> bool {
    match client.send(&PeerRequest::Ping.encode()).await {
        Ok(reply) => is_pong(&reply),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn free_address() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    }

    async fn build_node(
        id: i64,
        host: String,
        peers: Vec<String>,
    ) -> (Arc<ReplicationNode>, tempfile::TempDir, mpsc::Receiver<Vec<LogRecord>>) {
        let dir = tempfile::tempdir().unwrap();
        let reader = Arc::new(SegmentReader::new(dir.path().to_path_buf()));
        let writer = SegmentWriter::new(dir.path().to_path_buf(), 1024 * 1024).unwrap();
        let (tx, rx) = mpsc::channel(8);
        let node = Arc::new(ReplicationNode::new(
            id,
            host,
            peers,
            Duration::from_millis(20),
            reader,
            writer,
            tx,
        ));
        (node, dir, rx)
    }

    async fn spawn_server(addr: String, node: Arc<ReplicationNode>) {
        let server = Arc::new(crate::network::TcpServer::new(addr, 4, node));
        tokio::spawn(async move {
            let _ = server.serve().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn lower_id_wins_election_and_follower_tracks_master() {
        let addr_a = free_address().await;
        let addr_b = free_address().await;

        let (node_a, _dir_a, _rx_a) = build_node(1, addr_a.clone(), vec![addr_b.clone()]).await;
        let (node_b, _dir_b, _rx_b) = build_node(2, addr_b.clone(), vec![addr_a.clone()]).await;

        spawn_server(addr_a.clone(), node_a.clone()).await;
        spawn_server(addr_b.clone(), node_b.clone()).await;

        assert_eq!(node_a.elect().await, Role::Leader);
        assert_eq!(node_b.elect().await, Role::Follower);

        let master = node_b
            .master
            .lock()
            .await
            .clone()
            .expect("follower should track the elected master's client handle");
        assert_eq!(master.address(), addr_a);
    }

    #[tokio::test]
    async fn follower_pulls_a_missing_segment_from_the_master_only() {
        let addr_a = free_address().await;
        let addr_b = free_address().await;

        let (node_a, dir_a, _rx_a) = build_node(1, addr_a.clone(), vec![addr_b.clone()]).await;
        let (node_b, _dir_b, mut rx_b) = build_node(2, addr_b.clone(), vec![addr_a.clone()]).await;

        // The leader has a segment on disk the follower has never seen.
        let mut leader_writer = SegmentWriter::new(dir_a.path().to_path_buf(), 1024 * 1024).unwrap();
        leader_writer
            .write_batch(&[LogRecord::set(1, "a".into(), "1".into())])
            .unwrap();

        spawn_server(addr_a.clone(), node_a.clone()).await;
        spawn_server(addr_b.clone(), node_b.clone()).await;

        node_a.elect().await;
        node_b.elect().await;

        node_b.sync_once().await.unwrap();

        let recovered = rx_b
            .recv()
            .await
            .expect("the synced segment's records should reach the recovery channel");
        assert_eq!(recovered, vec![LogRecord::set(1, "a".into(), "1".into())]);
    }
}
