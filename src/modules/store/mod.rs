//! Managed document storage.
//!
//! One RocksDB-backed collection per tenant (peers, listings, ratings)
//! plus the peer-index map. The store owns all document bytes; everything
//! else holds doc-ids and typed projections.

pub mod collection;
pub mod index;
pub mod path;
pub mod peer_map;
pub mod resultset;
pub mod transform;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

pub use collection::{Collection, CollectionConfig, Document};
pub use peer_map::PeerIndexMap;
pub use resultset::ResultSet;

use crate::modules::expr::FilterEngine;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("collection config missing at {0}")]
    MissingConfig(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

/// The service's managed storage: named collections plus the peer map.
pub struct ServiceStore {
    pub peers: Collection,
    pub listings: Collection,
    pub ratings: Collection,
    pub pmap: PeerIndexMap,
    data_dir: PathBuf,
}

impl ServiceStore {
    /// Open (or create) every collection under `data_dir` and install the
    /// filter engine on each. Failure here is fatal to startup.
    pub fn open(data_dir: &Path, engine: FilterEngine) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;

        let peers = open_collection(
            &data_dir.join("peers"),
            CollectionConfig {
                name: "peers".to_string(),
                index_paths: vec!["name".to_string(), "shortDescription".to_string()],
            },
        )?;
        let listings = open_collection(
            &data_dir.join("listings"),
            CollectionConfig {
                name: "listings".to_string(),
                index_paths: vec![
                    "description".to_string(),
                    "title".to_string(),
                    "hash".to_string(),
                ],
            },
        )?;
        let ratings = open_collection(
            &data_dir.join("ratings"),
            CollectionConfig {
                name: "ratings".to_string(),
                index_paths: vec!["orderId".to_string(), "targetPeer".to_string()],
            },
        )?;

        peers.override_eval_engine(engine.clone());
        listings.override_eval_engine(engine.clone());
        ratings.override_eval_engine(engine);

        info!(data_dir = %data_dir.display(), "Service store opened");
        Ok(Self {
            peers,
            listings,
            ratings,
            pmap: PeerIndexMap::new(),
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory for cached media; files already present are authoritative.
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }
}

fn open_collection(path: &Path, config: CollectionConfig) -> Result<Collection, StoreError> {
    if Collection::exists(path) {
        Collection::load(path)
    } else {
        Collection::new(path, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn open_creates_and_reopens_all_collections() {
        let dir = TempDir::new().unwrap();
        {
            let store = ServiceStore::open(dir.path(), FilterEngine::new()).unwrap();
            store.peers.insert(&json!({"name": "alice"})).unwrap();
            store.peers.commit().unwrap();
        }
        let store = ServiceStore::open(dir.path(), FilterEngine::new()).unwrap();
        assert_eq!(store.peers.search("").count(), 1);
        assert_eq!(store.listings.search("").count(), 0);
        assert_eq!(store.ratings.search("").count(), 0);
    }
}
