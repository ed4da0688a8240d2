//! Cached media delivery with gateway proxy fallback.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::StatusCode;
use serde_json::json;
use tracing::debug;

use super::json_value;
use crate::api::app_state::AppState;

/// GET /djali/media?id= — serve from `data/images/<cid>`, falling back to
/// the gateway's image endpoint with header passthrough.
pub async fn get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let id = params.get("id").cloned().unwrap_or_default();
    if id.is_empty() || id.contains('/') || id.contains("..") {
        return json_value(StatusCode::NOT_FOUND, json!({"error": "Media not found"}));
    }

    let path = state.store.images_dir().join(&id);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = sniff_content_type(&bytes);
            ([(CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(_) => proxy_from_gateway(&state, &id).await,
    }
}

async fn proxy_from_gateway(state: &AppState, id: &str) -> Response {
    debug!(cid = %id, "Media cache miss, proxying from gateway");
    let response = match state.gateway.image(id).await {
        Ok(response) => response,
        Err(_) => return json_value(StatusCode::NOT_FOUND, json!({"error": "Media not found"})),
    };

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    match response.bytes().await {
        Ok(bytes) => (
            [(CONTENT_TYPE, content_type)],
            Body::from(bytes.to_vec()),
        )
            .into_response(),
        Err(_) => json_value(StatusCode::NOT_FOUND, json!({"error": "Media not found"})),
    }
}

/// Magic-number sniff over the usual thumbnail formats.
fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_image_formats() {
        assert_eq!(sniff_content_type(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(
            sniff_content_type(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]),
            "image/png"
        );
        assert_eq!(sniff_content_type(b"GIF89a"), "image/gif");
        assert_eq!(sniff_content_type(b"RIFF\x00\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(sniff_content_type(b"plain text"), "application/octet-stream");
    }
}
