//! A named, persisted, searchable document collection over RocksDB.
//!
//! Documents are raw JSON values keyed by a minted doc-id; a monotonic
//! sequence number preserves insertion order across restarts. Full-text
//! search goes through the in-process inverted index, which only sees a
//! document after `flush_se` has run for it; the empty query bypasses the
//! index and scans everything.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use rocksdb::{IteratorMode, Options, DB};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::index::InvertedIndex;
use super::path as jsonpath;
use super::resultset::ResultSet;
use super::StoreError;
use crate::modules::expr::FilterEngine;

const META_CONFIG_KEY: &[u8] = b"__meta:config";
const META_SEQ_KEY: &[u8] = b"__meta:seq";
const DOC_PREFIX: &str = "doc:";

/// Static configuration persisted alongside the documents so a collection
/// can be reopened without repeating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Dotted paths whose string values feed the full-text index.
    pub index_paths: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct StoredDoc {
    seq: u64,
    content: Value,
}

/// A document handed out by the collection. `content` holds the persisted
/// JSON and can be projected into a typed record.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub seq: u64,
    pub content: Value,
}

impl Document {
    /// Project the raw content into a typed record.
    pub fn export<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.content.clone())
            .map_err(|err| StoreError::Serialization(err.to_string()))
    }

    /// The persisted bytes, re-serialized.
    pub fn content_string(&self) -> Result<String, StoreError> {
        serde_json::to_string(&self.content)
            .map_err(|err| StoreError::Serialization(err.to_string()))
    }
}

pub struct Collection {
    name: String,
    path: PathBuf,
    db: DB,
    index_paths: Vec<String>,
    engine: RwLock<FilterEngine>,
    index: RwLock<InvertedIndex>,
    pending: Mutex<Vec<String>>,
    seq: AtomicU64,
}

impl Collection {
    /// Whether a collection already lives at this path.
    pub fn exists(path: &Path) -> bool {
        path.join("CURRENT").exists()
    }

    /// Create a fresh collection at `path`.
    pub fn new(path: &Path, config: CollectionConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)?;
        let db = open_db(path)?;
        db.put(META_CONFIG_KEY, serde_json::to_vec(&config)?)?;

        info!(collection = %config.name, path = %path.display(), "Created collection");
        Ok(Self {
            name: config.name,
            path: path.to_path_buf(),
            db,
            index_paths: config.index_paths,
            engine: RwLock::new(FilterEngine::new()),
            index: RwLock::new(InvertedIndex::new()),
            pending: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
        })
    }

    /// Reopen a collection persisted at `path`, rebuilding the search
    /// index over everything already on disk.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let db = open_db(path)?;
        let config: CollectionConfig = match db.get(META_CONFIG_KEY)? {
            Some(raw) => serde_json::from_slice(&raw)?,
            None => return Err(StoreError::MissingConfig(path.display().to_string())),
        };
        let next_seq = match db.get(META_SEQ_KEY)? {
            Some(raw) => String::from_utf8_lossy(&raw).parse().unwrap_or(0),
            None => 0,
        };

        let collection = Self {
            name: config.name,
            path: path.to_path_buf(),
            db,
            index_paths: config.index_paths,
            engine: RwLock::new(FilterEngine::new()),
            index: RwLock::new(InvertedIndex::new()),
            pending: Mutex::new(Vec::new()),
            seq: AtomicU64::new(next_seq),
        };
        collection.rebuild_index()?;

        info!(
            collection = %collection.name,
            path = %path.display(),
            "Loaded collection"
        );
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Install the filter engine used by `ResultSet::filter`.
    pub fn override_eval_engine(&self, engine: FilterEngine) {
        *write_lock(&self.engine) = engine;
    }

    /// Persist a new document and queue it for the next search-engine
    /// flush. Returns the minted doc-id.
    pub fn insert(&self, content: &Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let stored = StoredDoc {
            seq,
            content: content.clone(),
        };
        self.db.put(doc_key(&id), serde_json::to_vec(&stored)?)?;
        self.db.put(META_SEQ_KEY, (seq + 1).to_string())?;
        lock(&self.pending).push(id.clone());

        debug!(collection = %self.name, doc_id = %id, seq, "Inserted document");
        Ok(id)
    }

    /// Replace a document in place, keeping its id and insertion order.
    pub fn update(&self, id: &str, content: &Value) -> Result<(), StoreError> {
        let existing = self.get(id)?;
        let stored = StoredDoc {
            seq: existing.seq,
            content: content.clone(),
        };
        self.db.put(doc_key(id), serde_json::to_vec(&stored)?)?;
        write_lock(&self.index).remove(id);
        lock(&self.pending).push(id.to_string());
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.db.delete(doc_key(id))?;
        write_lock(&self.index).remove(id);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Document, StoreError> {
        let raw = self
            .db
            .get(doc_key(id))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let stored: StoredDoc = serde_json::from_slice(&raw)?;
        Ok(Document {
            id: id.to_string(),
            seq: stored.seq,
            content: stored.content,
        })
    }

    /// Full-text search. An empty query matches every document in insertion
    /// order; a non-empty query is ranked by matched-term count with
    /// insertion order as the tie-break.
    pub fn search(&self, query: &str) -> ResultSet {
        let engine = read_lock(&self.engine).clone();

        if query.trim().is_empty() {
            let mut docs = self.scan_all();
            docs.sort_by_key(|doc| doc.seq);
            return ResultSet::new(docs, engine);
        }

        let scores = read_lock(&self.index).score(query);
        let mut hits: Vec<(usize, Document)> = Vec::with_capacity(scores.len());
        for (id, score) in scores {
            match self.get(&id) {
                Ok(doc) => hits.push((score, doc)),
                Err(err) => {
                    warn!(collection = %self.name, doc_id = %id, error = %err, "Indexed document missing")
                }
            }
        }
        hits.sort_by(|(sa, da), (sb, db)| sb.cmp(sa).then(da.seq.cmp(&db.seq)));
        ResultSet::new(hits.into_iter().map(|(_, doc)| doc).collect(), engine)
    }

    /// Durably flush pending writes.
    pub fn commit(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Merge recently written documents into the search index so
    /// subsequent queries can see them. Cheap when nothing is pending.
    pub fn flush_se(&self) {
        let pending: Vec<String> = {
            let mut pending = lock(&self.pending);
            let drained: Vec<String> = pending.drain(..).collect();
            drained
        };
        if pending.is_empty() {
            return;
        }

        let mut index = write_lock(&self.index);
        let mut merged = 0usize;
        for id in pending {
            match self.get(&id) {
                Ok(doc) => {
                    index.add(&id, &self.extract_fields(&doc.content));
                    merged += 1;
                }
                // Deleted between write and flush.
                Err(StoreError::NotFound(_)) => index.remove(&id),
                Err(err) => {
                    error!(collection = %self.name, doc_id = %id, error = %err, "Flush failed for document")
                }
            }
        }
        debug!(collection = %self.name, merged, "Search engine flushed");
    }

    fn extract_fields(&self, content: &Value) -> Vec<String> {
        self.index_paths
            .iter()
            .filter_map(|path| jsonpath::lookup(content, path))
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect()
    }

    fn rebuild_index(&self) -> Result<(), StoreError> {
        let docs = self.scan_all();
        let mut index = write_lock(&self.index);
        for doc in &docs {
            index.add(&doc.id, &self.extract_fields(&doc.content));
        }
        debug!(collection = %self.name, documents = docs.len(), "Search index rebuilt");
        Ok(())
    }

    fn scan_all(&self) -> Vec<Document> {
        let mut docs = Vec::new();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = match item {
                Ok(entry) => entry,
                Err(err) => {
                    error!(collection = %self.name, error = %err, "Iterator error");
                    break;
                }
            };
            let Some(id) = key
                .strip_prefix(DOC_PREFIX.as_bytes())
                .map(|raw| String::from_utf8_lossy(raw).to_string())
            else {
                continue;
            };
            match serde_json::from_slice::<StoredDoc>(&value) {
                Ok(stored) => docs.push(Document {
                    id,
                    seq: stored.seq,
                    content: stored.content,
                }),
                Err(err) => {
                    warn!(collection = %self.name, doc_id = %id, error = %err, "Unreadable document skipped")
                }
            }
        }
        docs
    }
}

fn open_db(path: &Path) -> Result<DB, StoreError> {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts.set_keep_log_file_num(5);
    DB::open(&opts, path).map_err(|err| StoreError::Storage(err.to_string()))
}

fn doc_key(id: &str) -> Vec<u8> {
    format!("{DOC_PREFIX}{id}").into_bytes()
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_lock<'a, T>(lock: &'a RwLock<T>) -> std::sync::RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<'a, T>(lock: &'a RwLock<T>) -> std::sync::RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn listings_collection(dir: &TempDir) -> Collection {
        Collection::new(
            &dir.path().join("listings"),
            CollectionConfig {
                name: "listings".to_string(),
                index_paths: vec![
                    "description".to_string(),
                    "title".to_string(),
                    "hash".to_string(),
                ],
            },
        )
        .unwrap()
    }

    #[test]
    fn insert_commit_flush_search_round_trip() {
        let dir = TempDir::new().unwrap();
        let col = listings_collection(&dir);

        let id = col
            .insert(&json!({"title": "Golden Age Comics", "hash": "QmH1"}))
            .unwrap();
        col.commit().unwrap();

        // Not yet flushed: the indexed query misses, the empty query scans.
        assert_eq!(col.search("golden").count(), 0);
        assert_eq!(col.search("").count(), 1);

        col.flush_se();
        let hits = col.search("golden");
        assert_eq!(hits.count(), 1);
        assert_eq!(hits.documents()[0].id, id);
        assert_eq!(col.search("QmH1").count(), 1);
    }

    #[test]
    fn update_keeps_id_and_order() {
        let dir = TempDir::new().unwrap();
        let col = listings_collection(&dir);

        let first = col.insert(&json!({"title": "alpha"})).unwrap();
        let second = col.insert(&json!({"title": "omega"})).unwrap();
        col.update(&first, &json!({"title": "beta"})).unwrap();
        col.flush_se();

        let all = col.search("");
        assert_eq!(all.count(), 2);
        assert_eq!(all.documents()[0].id, first);
        assert_eq!(all.documents()[1].id, second);
        assert_eq!(col.search("beta").count(), 1);
        // The replaced title no longer matches.
        assert_eq!(col.search("alpha").count(), 0);
    }

    #[test]
    fn delete_removes_from_scan_and_index() {
        let dir = TempDir::new().unwrap();
        let col = listings_collection(&dir);

        let id = col.insert(&json!({"title": "doomed"})).unwrap();
        col.flush_se();
        col.delete(&id).unwrap();

        assert_eq!(col.search("").count(), 0);
        assert_eq!(col.search("doomed").count(), 0);
        assert!(matches!(col.get(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn load_restores_documents_index_and_sequence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("listings");
        {
            let col = Collection::new(
                &path,
                CollectionConfig {
                    name: "listings".to_string(),
                    index_paths: vec!["title".to_string()],
                },
            )
            .unwrap();
            col.insert(&json!({"title": "persisted item"})).unwrap();
            col.flush_se();
            col.commit().unwrap();
        }

        assert!(Collection::exists(&path));
        let col = Collection::load(&path).unwrap();
        assert_eq!(col.search("").count(), 1);
        assert_eq!(col.search("persisted").count(), 1);

        // New inserts keep strictly increasing sequence numbers.
        col.insert(&json!({"title": "later item"})).unwrap();
        let all = col.search("");
        assert!(all.documents()[0].seq < all.documents()[1].seq);
    }
}
