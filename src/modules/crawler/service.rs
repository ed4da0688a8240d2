//! Long-lived crawler tasks: discovery, digestion and the liveness sweep.
//!
//! Discovery feeds peer-ids into a bounded channel; a single consumer
//! digests them; a slow periodic sweep re-pings known peers and clears the
//! listings of anything silent past the staleness threshold.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use super::digest::{Digester, PeerRecord};
use crate::bootstrap::config::Config;
use crate::modules::gateway::GatewayClient;
use crate::modules::store::ServiceStore;

pub struct CrawlerService {
    config: Config,
    gateway: Arc<GatewayClient>,
    store: Arc<ServiceStore>,
    digester: Arc<Digester>,
    self_id: Arc<RwLock<Option<String>>>,
}

impl CrawlerService {
    pub fn new(
        config: Config,
        gateway: Arc<GatewayClient>,
        store: Arc<ServiceStore>,
        digester: Arc<Digester>,
    ) -> Self {
        Self {
            config,
            gateway,
            store,
            digester,
            self_id: Arc::new(RwLock::new(None)),
        }
    }

    /// Shared handle to the gateway node's own peer-id, filled in once the
    /// gateway answers. The HTTP surface uses it for the empty-id fallback.
    pub fn self_id_handle(&self) -> Arc<RwLock<Option<String>>> {
        self.self_id.clone()
    }

    /// Launch the crawler's three activities. Tasks run until process
    /// exit; they have no external cancellation.
    pub async fn start(self: Arc<Self>) {
        info!("Starting crawler");

        if let Err(err) = tokio::fs::create_dir_all(self.store.images_dir()).await {
            warn!(error = %err, "Cannot create image cache directory");
        }

        self.hydrate_peer_map().await;

        let (tx, rx) = mpsc::channel::<String>(self.config.peer_channel_capacity);

        match self.gateway.self_id().await {
            Ok(Some(id)) => {
                debug!(peer = %id, "Resolved own peer id");
                *self.self_id.write().await = Some(id.clone());
                let _ = tx.send(id).await;
            }
            Ok(None) => debug!("Gateway did not report a peer id"),
            Err(err) => warn!(error = %err, "Gateway unreachable at startup"),
        }

        tokio::spawn(self.clone().discovery_loop(tx));
        tokio::spawn(self.clone().digest_loop(rx));
        tokio::spawn(self.liveness_loop());
    }

    /// Restore the peer-index map from the persisted peers collection.
    async fn hydrate_peer_map(&self) {
        let docs = self.store.peers.search("").into_documents();
        let mut entries = Vec::with_capacity(docs.len());
        for doc in docs {
            match doc.export::<PeerRecord>() {
                Ok(peer) => entries.push((peer.id, doc.id)),
                Err(err) => warn!(doc_id = %doc.id, error = %err, "Unreadable peer record"),
            }
        }
        let count = entries.len();
        self.store.pmap.hydrate(entries).await;
        info!(peers = count, "Peer map rehydrated");
    }

    /// Periodically pull the gateway's peer list, emit every peer onto the
    /// stream and expand its neighborhood under the semaphore bound.
    async fn discovery_loop(self: Arc<Self>, tx: mpsc::Sender<String>) {
        let semaphore = Arc::new(Semaphore::new(self.config.expansion_permits));
        let mut ticker = tokio::time::interval(self.config.discovery_interval);
        loop {
            ticker.tick().await;
            debug!("Looking for peers");
            let peers = match self.gateway.peers().await {
                Ok(peers) => peers,
                Err(err) => {
                    warn!(error = %err, "Cannot load gateway peers");
                    continue;
                }
            };
            for peer in peers {
                // A full channel makes this send wait, which throttles
                // discovery rather than dropping peers.
                if tx.send(peer.clone()).await.is_err() {
                    error!("Peer stream closed, stopping discovery");
                    return;
                }
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    return;
                };
                let service = self.clone();
                let neighbors_tx = tx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    // The watchdog releases the permit even if the fetch
                    // hangs past the gateway timeout.
                    let _ = tokio::time::timeout(
                        service.config.expansion_watchdog,
                        service.expand_neighbors(peer, neighbors_tx),
                    )
                    .await;
                });
            }
        }
    }

    async fn expand_neighbors(&self, peer: String, tx: mpsc::Sender<String>) {
        debug!(peer = %peer, "Retrieving closest peers");
        match self.gateway.closest_peers(&peer).await {
            Ok(neighbors) => {
                for neighbor in neighbors {
                    if tx.send(neighbor).await.is_err() {
                        return;
                    }
                }
            }
            Err(err) => debug!(peer = %peer, error = %err, "Closest-peers fetch failed"),
        }
    }

    /// Single consumer of the peer stream. Exhausted or already-digested
    /// peers are dropped; failures leave a tombstone so the crawler keeps
    /// making progress.
    async fn digest_loop(self: Arc<Self>, mut rx: mpsc::Receiver<String>) {
        while let Some(peer) = rx.recv().await {
            if self.digester.exhausted(&peer).await {
                debug!(peer = %peer, "Retry budget spent, dropping");
                continue;
            }
            if self.store.pmap.get(&peer).await.is_some() {
                debug!(peer = %peer, "Already digested, dropping");
                continue;
            }
            match self.digester.digest(&peer).await {
                Ok(record) => self.persist_digest(&peer, &record).await,
                Err(err) => {
                    warn!(peer = %peer, error = %err, "Digest failed, writing tombstone");
                    self.store.pmap.set(&peer, "").await;
                }
            }
        }
        error!("Digesting stopped");
    }

    async fn persist_digest(&self, peer: &str, record: &PeerRecord) {
        let value = match serde_json::to_value(record) {
            Ok(value) => value,
            Err(err) => {
                error!(peer = %peer, error = %err, "Peer record unserializable");
                self.store.pmap.set(peer, "").await;
                return;
            }
        };
        match self.store.peers.insert(&value) {
            Ok(doc_id) => {
                self.store.pmap.set(peer, &doc_id).await;
                self.store.listings.flush_se();
                self.store.peers.flush_se();
                if let Err(err) = self.store.listings.commit() {
                    error!(error = %err, "Listings commit failed");
                }
                if let Err(err) = self.store.peers.commit() {
                    error!(error = %err, "Peers commit failed");
                }
            }
            Err(err) => {
                error!(peer = %peer, error = %err, "Peer insert failed");
                self.store.pmap.set(peer, "").await;
            }
        }
    }

    /// Re-ping every known peer on a slow cadence; refresh the listings of
    /// live ones and clear the listings of peers silent past the
    /// staleness threshold.
    async fn liveness_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.liveness_interval);
        loop {
            ticker.tick().await;
            self.liveness_sweep().await;
        }
    }

    async fn liveness_sweep(&self) {
        let docs = self.store.peers.search("").into_documents();
        debug!(peers = docs.len(), "Liveness sweep");
        for doc in docs {
            let mut peer = match doc.export::<PeerRecord>() {
                Ok(peer) => peer,
                Err(err) => {
                    warn!(doc_id = %doc.id, error = %err, "Unreadable peer record");
                    continue;
                }
            };
            debug!(peer = %peer.id, "Pinging");
            if self.gateway.is_peer_online(&peer.id).await {
                peer.last_ping = Utc::now().timestamp();
                match serde_json::to_value(&peer) {
                    Ok(value) => {
                        if let Err(err) = self.store.peers.update(&doc.id, &value) {
                            warn!(peer = %peer.id, error = %err, "Ping persist failed");
                        }
                    }
                    Err(err) => warn!(peer = %peer.id, error = %err, "Peer record unserializable"),
                }
                match self.digester.digest(&peer.id).await {
                    Ok(_) => {
                        self.store.listings.flush_se();
                        if let Err(err) = self.store.listings.commit() {
                            error!(error = %err, "Listings commit failed");
                        }
                    }
                    Err(err) => debug!(peer = %peer.id, error = %err, "Refresh digest failed"),
                }
            }
            if Utc::now().timestamp() - peer.last_ping > self.config.stale_after_secs {
                if let Err(err) = self.digester.clear_listings(&peer.id).await {
                    warn!(peer = %peer.id, error = %err, "Stale listing GC failed");
                }
            }
        }
    }
}
