//! Request and response shapes for the HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of the search endpoints. Missing fields default to zero/empty.
///
/// ```json
/// {
///   "query": "comics",
///   "filters": ["contains(doc.slug, \"golden\")"],
///   "limit": 5,
///   "transforms": [{"operation": "shift",
///                   "spec": {"title": "title", "owner": "parentPeer"}}]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdvancedSearchQuery {
    pub query: String,
    pub filters: Vec<String>,
    pub sort: String,
    pub limit: usize,
    pub start: usize,
    pub transforms: Vec<Value>,
    pub generous: bool,
}

/// List envelope returned by the search endpoints. `next_start` is the
/// offset of the following page, or −1 once the window reaches `count`.
#[derive(Debug, Serialize)]
pub struct ApiListResult {
    pub count: usize,
    pub limit: usize,
    #[serde(rename = "nextStart")]
    pub next_start: i64,
    pub data: Vec<Value>,
}
