//! Rating overlay endpoints, including the websocket seek fan-out.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use http::StatusCode;
use serde_json::json;
use tracing::{debug, warn};

use super::{json_body, json_value};
use crate::api::app_state::AppState;
use crate::modules::overlay::{Contract, RatingKind};

/// GET /p2p/peers — ids of the peers currently connected on the overlay.
pub async fn peers(State(state): State<AppState>) -> Response {
    let ids = state.ratings.peer_ids().await;
    json_value(StatusCode::OK, json!(ids))
}

/// GET /p2p/ratings/get/{peer}/{ids} — pull ratings from one connected
/// peer, collecting the reply stream.
pub async fn get(
    State(state): State<AppState>,
    Path((peer, ids)): Path<(String, String)>,
) -> Response {
    match state.ratings.get_ratings(&peer, &ids).await {
        Ok(ratings) => json_value(StatusCode::OK, json!({"ratings": ratings, "error": ""})),
        Err(err) => json_value(
            StatusCode::OK,
            json!({"ratings": [], "error": err.to_string()}),
        ),
    }
}

/// GET /p2p/ratings/seek-sync/{ids} — broadcast a rating request and
/// collect every streamed reply before answering.
pub async fn seek_sync(State(state): State<AppState>, Path(ids): Path<String>) -> Response {
    match state.ratings.seek_ratings(&ids).await {
        Ok(ratings) => json_value(StatusCode::OK, json!({"ratings": ratings, "error": ""})),
        Err(err) => json_value(
            StatusCode::OK,
            json!({"ratings": [], "error": err.to_string()}),
        ),
    }
}

/// GET /p2p/ratings/seek/{ids} — websocket variant: each streamed reply
/// is written as one JSON message; the socket closes when the overlay
/// stream does.
pub async fn seek_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(ids): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| stream_ratings(socket, state, ids))
}

async fn stream_ratings(mut socket: WebSocket, state: AppState, ids: String) {
    let mut stream = match state.ratings.seek_ratings_streaming(&ids).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "Seek failed");
            let _ = socket
                .send(Message::Text(
                    json!({"error": err.to_string()}).to_string().into(),
                ))
                .await;
            return;
        }
    };

    debug!(ids = %ids, "Streaming seek replies to websocket");
    while let Some(rating) = stream.recv().await {
        if socket
            .send(Message::Text(rating.to_string().into()))
            .await
            .is_err()
        {
            // Client went away; the service keeps draining the overlay
            // stream behind the dropped receiver.
            return;
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}

/// POST /p2p/ratings/publish/{kind} — ingest a rating from a contract and
/// broadcast it. `kind` is `fulfill` or `complete`.
pub async fn publish(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    body: String,
) -> Response {
    let kind = match kind.as_str() {
        "fulfill" => RatingKind::Fulfillment,
        "complete" => RatingKind::Completion,
        _ => {
            return json_value(
                StatusCode::OK,
                json!({"error": "endpoint only accepts either 'fulfill' or 'complete'"}),
            )
        }
    };

    let contract: Contract = match serde_json::from_str(&body) {
        Ok(contract) => contract,
        Err(err) => {
            return json_value(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Failed to decode body", "goerror": err.to_string()}),
            )
        }
    };

    match state.ratings.publish_rating(kind, &contract).await {
        Ok((_, Some(broadcast_error))) => {
            json_value(StatusCode::OK, json!({"error": broadcast_error}))
        }
        Ok((_, None)) => json_body(StatusCode::OK, json!({"error": ""}).to_string()),
        Err(err) => json_value(StatusCode::OK, json!({"error": err.to_string()})),
    }
}
