//! Location map queries.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::Response;
use http::StatusCode;
use serde_json::json;

use super::json_value;
use crate::api::app_state::AppState;

/// GET /djali/location/query?zip=&country= — resolve a zip to
/// coordinates.
pub async fn query(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let zip = params.get("zip").cloned().unwrap_or_default();
    let country = params.get("country").cloned().unwrap_or_default();

    match state.locations.coords(&country, &zip) {
        Some((latitude, longitude)) => json_value(
            StatusCode::OK,
            json!({
                "country": country,
                "zip": zip,
                "latitude": latitude,
                "longitude": longitude
            }),
        ),
        None => json_value(StatusCode::NOT_FOUND, json!({"error": "No results"})),
    }
}

/// GET /djali/location/codesfrom?country= — the known zip codes of a
/// country.
pub async fn codes_from(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let country = params.get("country").cloned().unwrap_or_default();
    json_value(StatusCode::OK, json!(state.locations.codes(&country)))
}
