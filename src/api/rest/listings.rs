//! Listing endpoints: hash lookup and full search.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::Response;
use http::StatusCode;
use serde_json::json;
use tracing::debug;

use super::{json_body, json_value, run_search};
use crate::api::app_state::AppState;
use crate::api::dto::AdvancedSearchQuery;

/// GET /djali/listing?hash= — indexed lookup with a full-scan filter
/// fallback for documents the index cannot see.
pub async fn get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let hash = params.get("hash").cloned().unwrap_or_default();

    let mut results = state.store.listings.search(&hash);
    if results.count() == 0 {
        results = state
            .store
            .listings
            .search("")
            .filter(&format!("doc.hash == \"{hash}\""));
    }

    match results.into_documents().into_iter().next() {
        Some(doc) => json_value(StatusCode::OK, doc.content),
        None => json_value(StatusCode::NOT_FOUND, json!({"error": "No results"})),
    }
}

/// POST /djali/search — the shared search pipeline over the listings
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
    debug!(query = %params.query, filters = params.filters.len(), "Listing search");

    let result = run_search(&state.store.listings, &params);
    match serde_json::to_string(&result) {
        Ok(body) => json_body(StatusCode::OK, body),
        Err(err) => json_value(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": err.to_string()}),
        ),
    }
}
