//! Process-wide peer-id → document-id mapping.
//!
//! The single source of truth for "have we already digested this peer".
//! An empty-string value is a tombstone: the peer was attempted and
//! failed, skip it unless a digest is explicitly forced.

use std::collections::HashMap;

use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct PeerIndexMap {
    inner: RwLock<HashMap<String, String>>,
}

impl PeerIndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the document id for a peer. Writes are serialized by the
    /// write lock; pass an empty string to record a tombstone.
    pub async fn set(&self, peer_id: &str, doc_id: &str) {
        self.inner
            .write()
            .await
            .insert(peer_id.to_string(), doc_id.to_string());
    }

    /// Current entry for a peer. `Some("")` is a tombstone; `None` means
    /// the peer has never been attempted.
    pub async fn get(&self, peer_id: &str) -> Option<String> {
        self.inner.read().await.get(peer_id).cloned()
    }

    /// Bulk load entries, used when rehydrating from the peers collection
    /// at startup.
    pub async fn hydrate(&self, entries: impl IntoIterator<Item = (String, String)>) {
        let mut inner = self.inner.write().await;
        for (peer_id, doc_id) in entries {
            inner.insert(peer_id, doc_id);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
