//! Shared fixtures: a scripted marketplace gateway served over HTTP and a
//! capturing overlay transport.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde_json::{json, Value};

use voyager::modules::overlay::{
    Overlay, OverlayError, OverlayPeer, Packet, ResponseStream,
};

/// In-memory marketplace gateway. Populate the maps, call [`serve`], and
/// point a `GatewayClient` at the returned base URL.
#[derive(Clone, Default)]
pub struct MockGateway {
    pub self_peer: Arc<Mutex<Option<String>>>,
    pub peers: Arc<Mutex<Vec<String>>>,
    pub closest: Arc<Mutex<HashMap<String, Vec<String>>>>,
    pub profiles: Arc<Mutex<HashMap<String, Value>>>,
    /// Peers whose profile endpoint answers 500.
    pub broken_profiles: Arc<Mutex<HashSet<String>>>,
    pub listings: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    /// Keyed by `"{peer}/{slug}"`.
    pub details: Arc<Mutex<HashMap<String, Value>>>,
    pub online: Arc<Mutex<HashSet<String>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_profile(&self, peer: &str, profile: Value) {
        self.profiles.lock().unwrap().insert(peer.to_string(), profile);
    }

    pub fn set_listings(&self, peer: &str, summaries: Vec<Value>) {
        self.listings
            .lock()
            .unwrap()
            .insert(peer.to_string(), summaries);
    }

    pub fn set_detail(&self, peer: &str, slug: &str, detail: Value) {
        self.details
            .lock()
            .unwrap()
            .insert(format!("{peer}/{slug}"), detail);
    }

    pub fn remove_detail(&self, peer: &str, slug: &str) {
        self.details.lock().unwrap().remove(&format!("{peer}/{slug}"));
    }

    /// Serve on an ephemeral port; returns the base URL.
    pub async fn serve(&self) -> String {
        let router = Router::new()
            .route("/ob/profile/", get(self_profile))
            .route("/ob/profile/{peer}", get(profile))
            .route("/ob/peers", get(peer_list))
            .route("/ob/closestpeers/{peer}", get(closest_peers))
            .route("/ob/listings/{peer}", get(listing_summaries))
            .route("/ob/listing/{peer}/{slug}", get(listing_detail))
            .route("/ob/peerinfo/{peer}", get(peer_info))
            .route("/ipfs/{cid}", get(media))
            .route("/ob/images/{cid}", get(media))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock gateway");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}")
    }
}

async fn self_profile(State(gw): State<MockGateway>) -> Json<Value> {
    match gw.self_peer.lock().unwrap().clone() {
        Some(peer) => Json(json!({"peerID": peer, "name": "self"})),
        None => Json(json!({"success": false, "reason": "offline"})),
    }
}

async fn profile(State(gw): State<MockGateway>, Path(peer): Path<String>) -> Response {
    if gw.broken_profiles.lock().unwrap().contains(&peer) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    match gw.profiles.lock().unwrap().get(&peer) {
        Some(profile) => Json(profile.clone()).into_response(),
        None => Json(json!({"success": false, "reason": "peer not found"})).into_response(),
    }
}

async fn peer_list(State(gw): State<MockGateway>) -> Json<Vec<String>> {
    Json(gw.peers.lock().unwrap().clone())
}

async fn closest_peers(
    State(gw): State<MockGateway>,
    Path(peer): Path<String>,
) -> Json<Vec<String>> {
    Json(
        gw.closest
            .lock()
            .unwrap()
            .get(&peer)
            .cloned()
            .unwrap_or_default(),
    )
}

async fn listing_summaries(
    State(gw): State<MockGateway>,
    Path(peer): Path<String>,
) -> Json<Vec<Value>> {
    Json(
        gw.listings
            .lock()
            .unwrap()
            .get(&peer)
            .cloned()
            .unwrap_or_default(),
    )
}

async fn listing_detail(
    State(gw): State<MockGateway>,
    Path((peer, slug)): Path<(String, String)>,
) -> Response {
    match gw.details.lock().unwrap().get(&format!("{peer}/{slug}")) {
        Some(detail) => Json(json!({"listing": detail})).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn peer_info(State(gw): State<MockGateway>, Path(peer): Path<String>) -> Json<Value> {
    let result = if gw.online.lock().unwrap().contains(&peer) {
        "online"
    } else {
        "offline"
    };
    Json(json!({"result": result}))
}

async fn media(Path(_cid): Path<String>) -> Response {
    (
        [(http::header::CONTENT_TYPE, "image/png")],
        vec![0x89u8, b'P', b'N', b'G'],
    )
        .into_response()
}

/// Overlay transport that records broadcasts and replays scripted seek
/// replies.
#[derive(Default)]
pub struct CapturingOverlay {
    pub peers: Mutex<HashMap<String, OverlayPeer>>,
    pub replies: Mutex<Vec<Value>>,
    pub broadcasts: Mutex<Vec<Packet>>,
}

#[async_trait]
impl Overlay for CapturingOverlay {
    async fn peers(&self) -> HashMap<String, OverlayPeer> {
        self.peers.lock().unwrap().clone()
    }

    async fn request(
        &self,
        _peer: &OverlayPeer,
        _namespace: &str,
        _payload: Value,
    ) -> Result<ResponseStream, OverlayError> {
        self.replay()
    }

    async fn seek(&self, _namespace: &str, _payload: Value) -> Result<ResponseStream, OverlayError> {
        self.replay()
    }

    async fn broadcast(&self, packet: Packet) -> Result<(), OverlayError> {
        self.broadcasts.lock().unwrap().push(packet);
        Ok(())
    }
}

impl CapturingOverlay {
    fn replay(&self) -> Result<ResponseStream, OverlayError> {
        let (tx, stream) = ResponseStream::channel(8);
        let replies = self.replies.lock().unwrap().clone();
        tokio::spawn(async move {
            for reply in replies {
                if tx.send(reply).await.is_err() {
                    return;
                }
            }
        });
        Ok(stream)
    }
}
