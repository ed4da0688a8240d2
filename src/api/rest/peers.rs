//! Peer endpoints: cached reads, forced digests and peer search.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::Response;
use http::StatusCode;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{json_body, json_value, run_search};
use crate::api::app_state::AppState;
use crate::api::dto::AdvancedSearchQuery;

/// GET /djali/peers/listings — every indexed listing as a JSON array.
pub async fn all_listings(State(state): State<AppState>) -> Response {
    match state.store.listings.search("").export_json_array() {
        Ok(body) => json_body(StatusCode::OK, body),
        Err(_) => json_value(StatusCode::OK, json!({"error": "notFound"})),
    }
}

/// GET /djali/peers — every indexed peer record.
pub async fn all(State(state): State<AppState>) -> Response {
    match state.store.peers.search("").export_json_array() {
        Ok(body) => json_body(StatusCode::OK, body),
        Err(_) => json_value(StatusCode::OK, json!({"error": "notFound"})),
    }
}

/// GET /djali/peer/get?id=&force= — cached peer read, digesting on a miss
/// or when forced. The whole operation runs under the handler deadline;
/// the digest keeps running detached if the deadline fires so the retry
/// bookkeeping still lands.
pub async fn get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut peer = params.get("id").cloned().unwrap_or_default();
    if peer.is_empty() {
        peer = match resolve_self_id(&state).await {
            Some(id) => id,
            None => {
                return json_value(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "retrieve timeout"}),
                )
            }
        };
    }
    let force = params.get("force").map(String::as_str) == Some("true");

    let (tx, rx) = oneshot::channel();
    {
        let state = state.clone();
        let peer = peer.clone();
        tokio::spawn(async move {
            let outcome = fetch_peer(&state, &peer, force).await;
            let _ = tx.send(outcome);
        });
    }

    match tokio::time::timeout(state.config.handler_deadline, rx).await {
        Ok(Ok((status, body))) => json_body(status, body),
        _ => {
            warn!(peer = %peer, "Peer fetch deadline expired");
            json_value(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "retrieve timeout"}),
            )
        }
    }
}

/// GET /djali/peer/add?id= — force a digest under the handler deadline.
pub async fn add(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let peer = params.get("id").cloned().unwrap_or_default();
    if peer.is_empty() {
        return json_value(StatusCode::OK, json!({"result": "failed"}));
    }

    let (tx, rx) = oneshot::channel();
    {
        let state = state.clone();
        let peer = peer.clone();
        tokio::spawn(async move {
            let (status, _) = digest_and_persist(&state, &peer).await;
            let _ = tx.send(status);
        });
    }

    match tokio::time::timeout(state.config.handler_deadline, rx).await {
        Ok(Ok(status)) if status == StatusCode::OK => {
            json_value(StatusCode::OK, json!({"result": "success"}))
        }
        _ => json_value(StatusCode::OK, json!({"result": "failed"})),
    }
}

/// POST /djali/peer/search — the shared search pipeline over the peers
/// collection.
pub async fn search(State(state): State<AppState>, body: String) -> Response {
    let params: AdvancedSearchQuery = match serde_json::from_str(&body) {
        Ok(params) => params,
        Err(err) => {
            return json_value(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Failed to decode body", "goerror": err.to_string()}),
            )
        }
    };
    debug!(query = %params.query, "Peer search");

    let result = run_search(&state.store.peers, &params);
    match serde_json::to_string(&result) {
        Ok(body) => json_body(StatusCode::OK, body),
        Err(err) => json_value(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": err.to_string()}),
        ),
    }
}

async fn resolve_self_id(state: &AppState) -> Option<String> {
    if let Some(id) = state.self_id.read().await.clone() {
        return Some(id);
    }
    match state.gateway.self_id().await {
        Ok(Some(id)) => {
            *state.self_id.write().await = Some(id.clone());
            Some(id)
        }
        _ => None,
    }
}

/// Cache policy: a non-empty mapped doc-id answers directly unless the
/// fetch is forced; a tombstone without force is a cache hit on the
/// digest failure; everything else digests.
async fn fetch_peer(state: &AppState, peer: &str, force: bool) -> (StatusCode, String) {
    if !force {
        if let Some(doc_id) = state.store.pmap.get(peer).await {
            if doc_id.is_empty() {
                return (
                    StatusCode::NOT_FOUND,
                    json!({"error": "Not found and failed to digest"}).to_string(),
                );
            }
            return match state
                .store
                .peers
                .get(&doc_id)
                .and_then(|doc| doc.content_string())
            {
                Ok(body) => (StatusCode::OK, body),
                Err(err) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "failedToRetrievePeer", "details": err.to_string()})
                        .to_string(),
                ),
            };
        }
    }
    digest_and_persist(state, peer).await
}

/// Run a digest and persist its outcome: update the existing peer
/// document when one is mapped, insert otherwise, then make the new
/// listings searchable. Failure writes a tombstone.
pub(super) async fn digest_and_persist(state: &AppState, peer: &str) -> (StatusCode, String) {
    let record = match state.digester.digest(peer).await {
        Ok(record) => record,
        Err(err) => {
            warn!(peer = %peer, error = %err, "Digest failed");
            state.store.pmap.set(peer, "").await;
            return (
                StatusCode::NOT_FOUND,
                json!({"error": "Not found and failed to digest"}).to_string(),
            );
        }
    };

    let value = match serde_json::to_value(&record) {
        Ok(value) => value,
        Err(err) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": err.to_string()}).to_string(),
            )
        }
    };

    let mapped = state.store.pmap.get(peer).await.filter(|id| !id.is_empty());
    let persisted = match mapped {
        Some(doc_id) => state.store.peers.update(&doc_id, &value).map(|_| doc_id),
        None => state.store.peers.insert(&value),
    };
    let doc_id = match persisted {
        Ok(doc_id) => doc_id,
        Err(err) => {
            state.store.pmap.set(peer, "").await;
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": err.to_string()}).to_string(),
            );
        }
    };

    state.store.pmap.set(peer, &doc_id).await;
    state.store.listings.flush_se();
    state.store.peers.flush_se();
    if let Err(err) = state.store.listings.commit() {
        warn!(error = %err, "Listings commit failed");
    }
    if let Err(err) = state.store.peers.commit() {
        warn!(error = %err, "Peers commit failed");
    }

    match serde_json::to_string(&record) {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": err.to_string()}).to_string(),
        ),
    }
}
