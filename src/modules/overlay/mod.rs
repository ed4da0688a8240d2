//! P2P rating overlay.
//!
//! The DHT transport itself is an external collaborator consumed through
//! the [`Overlay`] capability trait: enumerate connected peers, unicast a
//! request, broadcast a "seek" that streams back unsolicited replies, and
//! fire-and-forget broadcast packets.

pub mod ratings;
pub mod service;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub use ratings::{Contract, Rating, RatingKind, RatingManager, RatingError};
pub use service::RatingService;

use crate::modules::store::StoreError;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("peer does not exist: {0}")]
    PeerDoesNotExist(String),

    #[error("overlay transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Rating(#[from] RatingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Wire packet for overlay traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "type")]
    pub packet_type: PacketType,
    pub namespace: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketType {
    Broadcast,
    Request,
    Response,
}

/// A peer currently connected on the overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayPeer {
    pub id: String,
    #[serde(default)]
    pub address: String,
}

/// A finite stream of reply payloads. The producer side closes the
/// channel when the remote (or the broadcast window) is done.
#[derive(Debug)]
pub struct ResponseStream {
    rx: mpsc::Receiver<Value>,
}

impl ResponseStream {
    /// Build a stream plus its producer half.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Value>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// A stream that is already closed.
    pub fn closed() -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self { rx }
    }

    /// Next payload; `None` once the stream has closed.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Drain the stream to completion.
    pub async fn collect(mut self) -> Vec<Value> {
        let mut payloads = Vec::new();
        while let Some(payload) = self.next().await {
            payloads.push(payload);
        }
        payloads
    }
}

/// Minimal capability interface onto the overlay transport.
#[async_trait]
pub trait Overlay: Send + Sync {
    /// Currently connected overlay peers, keyed by peer-id.
    async fn peers(&self) -> HashMap<String, OverlayPeer>;

    /// Unicast request; the reply is zero or more payloads on a stream
    /// that closes when the remote is done.
    async fn request(
        &self,
        peer: &OverlayPeer,
        namespace: &str,
        payload: Value,
    ) -> Result<ResponseStream, OverlayError>;

    /// Broadcast to all reachable peers and stream back every response
    /// until no further responses are expected.
    async fn seek(&self, namespace: &str, payload: Value) -> Result<ResponseStream, OverlayError>;

    /// Fire-and-forget broadcast.
    async fn broadcast(&self, packet: Packet) -> Result<(), OverlayError>;
}

/// Placeholder transport used until a real overlay is attached: no peers,
/// seeks that close immediately, broadcasts that go nowhere.
#[derive(Debug, Default)]
pub struct DisconnectedOverlay;

#[async_trait]
impl Overlay for DisconnectedOverlay {
    async fn peers(&self) -> HashMap<String, OverlayPeer> {
        HashMap::new()
    }

    async fn request(
        &self,
        peer: &OverlayPeer,
        _namespace: &str,
        _payload: Value,
    ) -> Result<ResponseStream, OverlayError> {
        Err(OverlayError::PeerDoesNotExist(peer.id.clone()))
    }

    async fn seek(&self, _namespace: &str, _payload: Value) -> Result<ResponseStream, OverlayError> {
        Ok(ResponseStream::closed())
    }

    async fn broadcast(&self, _packet: Packet) -> Result<(), OverlayError> {
        Err(OverlayError::Transport("overlay not connected".to_string()))
    }
}
