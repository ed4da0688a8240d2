//! The digest pipeline: fetch one peer's profile and listings, reconcile
//! them against what is already indexed, persist the result, and cache the
//! listing thumbnails.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::modules::gateway::{GatewayClient, GatewayError, ListingSummary, Thumbnail};
use crate::modules::store::{ServiceStore, StoreError};

/// Attempts after which a peer is permanently skipped until restart.
pub const MAX_RETRIES: u32 = 5;

#[derive(Debug, Error)]
pub enum DigestError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The gateway answered the profile request with `success: false`.
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The persisted record for one known peer. The raw profile bag is
/// flattened to the document root so the peers collection can index
/// `name` and `shortDescription` directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: String,

    #[serde(default, rename = "lastPing")]
    pub last_ping: i64,

    #[serde(flatten)]
    pub raw_profile: Map<String, Value>,
}

pub struct Digester {
    gateway: Arc<GatewayClient>,
    store: Arc<ServiceStore>,
    images_dir: PathBuf,
    retries: Mutex<HashMap<String, u32>>,
}

impl Digester {
    pub fn new(gateway: Arc<GatewayClient>, store: Arc<ServiceStore>) -> Self {
        let images_dir = store.images_dir();
        Self {
            gateway,
            store,
            images_dir,
            retries: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts recorded for a peer.
    pub async fn retries(&self, peer: &str) -> u32 {
        self.retries.lock().await.get(peer).copied().unwrap_or(0)
    }

    /// Whether the peer's retry budget is spent.
    pub async fn exhausted(&self, peer: &str) -> bool {
        self.retries(peer).await >= MAX_RETRIES
    }

    /// Fetch, reconcile and persist one peer. Returns the fresh peer
    /// record; listings are written to the listings collection as a side
    /// effect. Two consecutive digests of identical upstream content leave
    /// the store unchanged apart from timestamps.
    pub async fn digest(&self, peer: &str) -> Result<PeerRecord, DigestError> {
        debug!(peer, "Digesting peer");

        let (profile, summaries) = match self.fetch_peer_data(peer).await {
            Ok(data) => data,
            Err(err) => {
                let attempts = self.bump_retries(peer).await;
                warn!(peer, attempts, error = %err, "Peer fetch failed");
                return Err(err);
            }
        };

        if let Some(Value::Bool(false)) = profile.get("success") {
            let reason = profile
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("gateway rejected profile request")
                .to_string();
            return Err(DigestError::Rejected(reason));
        }

        // Drop previously indexed listings this peer no longer advertises
        // so slug renames and upstream removals cannot leave stale
        // documents. Listings whose hash is still advertised keep their
        // doc-ids and go through the update path below.
        let advertised: HashSet<String> =
            summaries.iter().map(|summary| summary.hash.clone()).collect();
        self.remove_peer_listings(peer, &advertised)?;

        for mut summary in summaries {
            summary.peer_slug = format!("{peer}:{}", summary.slug);
            summary.parent_peer = peer.to_string();

            let detail = match self.gateway.listing(peer, &summary.slug).await {
                Ok(detail) => detail,
                Err(err) => {
                    debug!(
                        peer_slug = %summary.peer_slug,
                        hash = %summary.hash,
                        error = %err,
                        "Listing detail unavailable, dropping local copy"
                    );
                    self.delete_by_hash(&summary.hash)?;
                    continue;
                }
            };

            let merged = merge_listing(detail, &summary);
            self.upsert_listing(&summary.hash, &merged)?;
            self.fetch_thumbnails(&summary.thumbnail).await;
        }

        let raw_profile = match profile {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("profile".to_string(), other);
                map
            }
        };

        info!(peer, "Peer digested");
        Ok(PeerRecord {
            id: peer.to_string(),
            last_ping: Utc::now().timestamp(),
            raw_profile,
        })
    }

    /// Delete every indexed listing whose `vendorID.peerID` matches the
    /// peer, then flush the search engine so the removals are visible.
    pub async fn clear_listings(&self, peer: &str) -> Result<(), StoreError> {
        self.remove_peer_listings(peer, &HashSet::new())
    }

    fn remove_peer_listings(
        &self,
        peer: &str,
        keep_hashes: &HashSet<String>,
    ) -> Result<(), StoreError> {
        let expr = format!("doc.vendorID.peerID == \"{peer}\"");
        let stale = self.store.listings.search("").filter(&expr);
        let mut removed = 0usize;
        for doc in stale.documents() {
            let hash = doc
                .content
                .get("hash")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !hash.is_empty() && keep_hashes.contains(hash) {
                continue;
            }
            self.store.listings.delete(&doc.id)?;
            removed += 1;
        }
        self.store.listings.flush_se();
        if removed > 0 {
            debug!(peer, removed, "Cleared stale listings");
        }
        Ok(())
    }

    async fn fetch_peer_data(
        &self,
        peer: &str,
    ) -> Result<(Value, Vec<ListingSummary>), DigestError> {
        let profile = self.gateway.profile(peer).await?;
        let summaries = self.gateway.listings(peer).await?;
        Ok((profile, summaries))
    }

    async fn bump_retries(&self, peer: &str) -> u32 {
        let mut retries = self.retries.lock().await;
        let count = retries.entry(peer.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Insert or update keyed by the listing's content hash. The index
    /// query is verified by exact hash match before an update is chosen.
    fn upsert_listing(&self, hash: &str, merged: &Value) -> Result<(), StoreError> {
        let existing = self
            .store
            .listings
            .search(hash)
            .into_documents()
            .into_iter()
            .find(|doc| doc.content.get("hash").and_then(Value::as_str) == Some(hash));

        match existing {
            Some(doc) => self.store.listings.update(&doc.id, merged),
            None => self.store.listings.insert(merged).map(|_| ()),
        }
    }

    fn delete_by_hash(&self, hash: &str) -> Result<(), StoreError> {
        if hash.is_empty() {
            return Ok(());
        }
        let hit = self
            .store
            .listings
            .search(hash)
            .into_documents()
            .into_iter()
            .find(|doc| doc.content.get("hash").and_then(Value::as_str) == Some(hash));
        if let Some(doc) = hit {
            self.store.listings.delete(&doc.id)?;
        }
        Ok(())
    }

    async fn fetch_thumbnails(&self, thumbnail: &Thumbnail) {
        for cid in [&thumbnail.tiny, &thumbnail.small, &thumbnail.medium] {
            self.download_image(cid).await;
        }
    }

    /// Cache one media object under `data/images/<cid>`. A file already on
    /// disk is authoritative; download failures are logged and skipped.
    async fn download_image(&self, cid: &str) {
        if cid.is_empty() {
            return;
        }
        let target = self.images_dir.join(cid);
        if target.exists() {
            return;
        }
        let bytes = match self.gateway.media(cid).await {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(cid, error = %err, "Thumbnail download failed");
                return;
            }
        };
        if let Err(err) = tokio::fs::create_dir_all(&self.images_dir).await {
            warn!(dir = %self.images_dir.display(), error = %err, "Cannot create image cache");
            return;
        }
        if let Err(err) = tokio::fs::write(&target, bytes).await {
            warn!(cid, error = %err, "Cannot write cached image");
        }
    }
}

/// Deep right-biased merge of the summary over the detail document. The
/// detail is the base; the summary overlay only replaces keys it actually
/// sets (null and empty-string overlay values are skipped), which is what
/// carries `peerSlug`, `parentPeer` and the marketplace metadata absent
/// from the detail.
pub fn merge_listing(detail: Value, summary: &ListingSummary) -> Value {
    let overlay = serde_json::to_value(summary).unwrap_or(Value::Null);
    merge_values(detail, overlay)
}

fn merge_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                if is_unset(&value) {
                    continue;
                }
                let merged = match base.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (base, overlay) => {
            if is_unset(&overlay) {
                base
            } else {
                overlay
            }
        }
    }
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.values().all(is_unset),
        _ => false,
    }
}
