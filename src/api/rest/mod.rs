//! HTTP router configuration.
//!
//! Route definitions, CORS and server startup; handler implementations
//! live in their respective submodules. Handlers are stateless
//! translations of HTTP requests into calls on the store, the digest
//! pipeline and the rating service.

mod listings;
mod location;
mod media;
mod peers;
mod ratings;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN};
use http::{Method, StatusCode};
use serde_json::Value;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::api::app_state::AppState;
use crate::api::dto::{AdvancedSearchQuery, ApiListResult};
use crate::bootstrap::config::Config;
use crate::errors::AppError;
use crate::modules::store::Collection;

/// Build the router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Local marketplace index
        .route("/djali/peers/listings", get(peers::all_listings))
        .route("/djali/peer/get", get(peers::get))
        .route("/djali/peers", get(peers::all))
        .route("/djali/peer/add", get(peers::add))
        .route("/djali/peer/search", post(peers::search))
        .route("/djali/listing", get(listings::get))
        .route("/djali/search", post(listings::search))
        .route("/djali/media", get(media::get))
        // Location map
        .route("/djali/location/query", get(location::query))
        .route("/djali/location/codesfrom", get(location::codes_from))
        // Rating overlay
        .route("/p2p/peers", get(ratings::peers))
        .route("/p2p/ratings/get/{peer}/{ids}", get(ratings::get))
        .route("/p2p/ratings/seek-sync/{ids}", get(ratings::seek_sync))
        .route("/p2p/ratings/seek/{ids}", get(ratings::seek_ws))
        .route("/p2p/ratings/publish/{kind}", post(ratings::publish))
        .with_state(state)
        .layer(build_cors_layer())
}

/// All origins are allowed with credentials, so the request origin is
/// mirrored rather than wildcarded.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ORIGIN, ACCEPT, CONTENT_TYPE, AUTHORIZATION])
}

/// Start the HTTP server.
pub async fn start(state: AppState, config: &Config) -> Result<(), AppError> {
    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.api_port);

    info!("Serving at {}", &bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// A raw JSON body with an explicit status.
pub(crate) fn json_body(status: StatusCode, body: String) -> Response {
    (
        status,
        [(CONTENT_TYPE, "application/json")],
        Body::from(body),
    )
        .into_response()
}

/// A JSON value with an explicit status.
pub(crate) fn json_value(status: StatusCode, value: Value) -> Response {
    json_body(status, value.to_string())
}

/// The shared search pipeline: query, generous fallback, filters in
/// order, sort, window, transforms, envelope.
pub(crate) fn run_search(collection: &Collection, params: &AdvancedSearchQuery) -> ApiListResult {
    let mut results = collection.search(&params.query);
    if results.count() == 0 && params.generous {
        results = collection.search("");
    }
    for filter in &params.filters {
        results = results.filter(filter);
    }
    if !params.sort.is_empty() {
        results = results.sort(&params.sort);
    }
    if params.limit != 0 {
        results = results.limit(params.start, params.limit);
    }
    if !params.transforms.is_empty() {
        results = results.transform(&params.transforms);
    }

    let count = results.count();
    let next_start = params.start + params.limit;
    let next_start = if next_start >= count {
        -1
    } else {
        next_start as i64
    };

    ApiListResult {
        count,
        limit: params.limit,
        next_start,
        data: results.into_contents(),
    }
}
