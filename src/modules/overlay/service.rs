//! Rating operations over the overlay capability: pull from one peer,
//! seek across the network, stream seeks for websocket fan-out, and
//! publish freshly minted ratings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::ratings::{Contract, Rating, RatingKind, RatingManager};
use super::{Overlay, OverlayError, Packet, PacketType};

/// Namespace answered by peers holding ratings.
pub const GET_RATING_NAMESPACE: &str = "get_rating";

/// Namespace used to propagate freshly published ratings.
pub const NEW_RATING_NAMESPACE: &str = "new_rating";

/// Request payload for the rating namespaces: a comma-joined id list,
/// passed through opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRequest {
    pub ids: String,
}

pub struct RatingService {
    overlay: Arc<dyn Overlay>,
    manager: RatingManager,
}

impl RatingService {
    pub fn new(overlay: Arc<dyn Overlay>, manager: RatingManager) -> Self {
        Self { overlay, manager }
    }

    /// Ids of the peers currently connected on the overlay.
    pub async fn peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.overlay.peers().await.into_keys().collect();
        ids.sort();
        ids
    }

    /// Pull ratings from one connected peer, collecting the whole reply
    /// stream. Fails when the peer is not currently connected.
    pub async fn get_ratings(&self, peer: &str, ids: &str) -> Result<Vec<Value>, OverlayError> {
        let peers = self.overlay.peers().await;
        let Some(target) = peers.get(peer) else {
            return Err(OverlayError::PeerDoesNotExist(peer.to_string()));
        };

        let payload = request_payload(ids)?;
        let stream = self
            .overlay
            .request(target, GET_RATING_NAMESPACE, payload)
            .await?;
        debug!(peer, "Waiting for rating stream");
        Ok(stream.collect().await)
    }

    /// Broadcast a rating request to every reachable peer and collect all
    /// streamed replies.
    pub async fn seek_ratings(&self, ids: &str) -> Result<Vec<Value>, OverlayError> {
        let payload = request_payload(ids)?;
        let stream = self.overlay.seek(GET_RATING_NAMESPACE, payload).await?;
        debug!("Waiting for seek streams");
        Ok(stream.collect().await)
    }

    /// Like [`seek_ratings`](Self::seek_ratings) but each reply is
    /// delivered as soon as it arrives. The returned channel closes
    /// exactly when the overlay stream closes; if the consumer goes away
    /// first the overlay stream is still drained to completion so the
    /// transport resource is released.
    pub async fn seek_ratings_streaming(
        &self,
        ids: &str,
    ) -> Result<mpsc::Receiver<Value>, OverlayError> {
        let payload = request_payload(ids)?;
        let mut stream = self.overlay.seek(GET_RATING_NAMESPACE, payload).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut consumer_gone = false;
            while let Some(rating) = stream.next().await {
                if consumer_gone {
                    continue;
                }
                if tx.send(rating).await.is_err() {
                    consumer_gone = true;
                }
            }
            debug!("Seek stream closed");
        });
        Ok(rx)
    }

    /// Ingest a rating from a contract, persist it, and broadcast it to
    /// the overlay. A broadcast failure is reported back to the caller but
    /// never undoes the local persistence.
    pub async fn publish_rating(
        &self,
        kind: RatingKind,
        contract: &Contract,
    ) -> Result<(Rating, Option<String>), OverlayError> {
        let rating = match kind {
            RatingKind::Fulfillment => self.manager.ingest_fulfillment_rating(contract)?,
            RatingKind::Completion => self.manager.ingest_completion_rating(contract)?,
        };

        let payload = serde_json::to_value(&rating)
            .map_err(|err| OverlayError::Transport(err.to_string()))?;
        let packet = Packet {
            packet_type: PacketType::Broadcast,
            namespace: NEW_RATING_NAMESPACE.to_string(),
            payload,
        };

        let broadcast_error = match self.overlay.broadcast(packet).await {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, "Rating broadcast failed");
                Some(format!("failed to broadcast: {err}"))
            }
        };
        Ok((rating, broadcast_error))
    }
}

fn request_payload(ids: &str) -> Result<Value, OverlayError> {
    serde_json::to_value(RatingRequest {
        ids: ids.to_string(),
    })
    .map_err(|err| OverlayError::Transport(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::expr::FilterEngine;
    use crate::modules::overlay::{OverlayPeer, ResponseStream};
    use crate::modules::store::ServiceStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted overlay: canned peers, canned stream payloads, captured
    /// broadcasts.
    #[derive(Default)]
    struct ScriptedOverlay {
        peers: HashMap<String, OverlayPeer>,
        replies: Vec<Value>,
        broadcasts: Mutex<Vec<Packet>>,
        fail_broadcast: bool,
    }

    impl ScriptedOverlay {
        fn with_peer(peer: &str) -> Self {
            let mut peers = HashMap::new();
            peers.insert(
                peer.to_string(),
                OverlayPeer {
                    id: peer.to_string(),
                    address: String::new(),
                },
            );
            Self {
                peers,
                ..Default::default()
            }
        }

        fn stream(&self) -> ResponseStream {
            let (tx, stream) = ResponseStream::channel(8);
            let replies = self.replies.clone();
            tokio::spawn(async move {
                for reply in replies {
                    if tx.send(reply).await.is_err() {
                        return;
                    }
                }
            });
            stream
        }
    }

    #[async_trait]
    impl Overlay for ScriptedOverlay {
        async fn peers(&self) -> HashMap<String, OverlayPeer> {
            self.peers.clone()
        }

        async fn request(
            &self,
            _peer: &OverlayPeer,
            _namespace: &str,
            _payload: Value,
        ) -> Result<ResponseStream, OverlayError> {
            Ok(self.stream())
        }

        async fn seek(
            &self,
            _namespace: &str,
            _payload: Value,
        ) -> Result<ResponseStream, OverlayError> {
            Ok(self.stream())
        }

        async fn broadcast(&self, packet: Packet) -> Result<(), OverlayError> {
            if self.fail_broadcast {
                return Err(OverlayError::Transport("no route".to_string()));
            }
            self.broadcasts.lock().unwrap().push(packet);
            Ok(())
        }
    }

    fn service(dir: &TempDir, overlay: ScriptedOverlay) -> RatingService {
        let store = Arc::new(ServiceStore::open(dir.path(), FilterEngine::new()).unwrap());
        RatingService::new(Arc::new(overlay), RatingManager::new(store))
    }

    fn contract() -> Contract {
        Contract {
            order_id: "order-9".to_string(),
            vendor_id: "QmVendor".to_string(),
            buyer_id: "QmBuyer".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn get_ratings_requires_a_connected_peer() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, ScriptedOverlay::default());
        let err = service.get_ratings("QmGhost", "r1").await.unwrap_err();
        assert_eq!(err.to_string(), "peer does not exist: QmGhost");
    }

    #[tokio::test]
    async fn get_ratings_collects_the_whole_stream() {
        let dir = TempDir::new().unwrap();
        let mut overlay = ScriptedOverlay::with_peer("QmPeer");
        overlay.replies = vec![json!({"r": 1}), json!({"r": 2})];
        let service = service(&dir, overlay);

        let ratings = service.get_ratings("QmPeer", "r1,r2").await.unwrap();
        assert_eq!(ratings.len(), 2);
    }

    #[tokio::test]
    async fn streaming_seek_closes_with_the_overlay_stream() {
        let dir = TempDir::new().unwrap();
        let mut overlay = ScriptedOverlay::default();
        overlay.replies = vec![json!({"r": 1}), json!({"r": 2}), json!({"r": 3})];
        let service = service(&dir, overlay);

        let mut rx = service.seek_ratings_streaming("r1").await.unwrap();
        let mut seen = 0;
        while let Some(_rating) = rx.recv().await {
            seen += 1;
        }
        assert_eq!(seen, 3);
    }

    #[tokio::test]
    async fn publish_persists_then_broadcasts_one_new_rating_packet() {
        let dir = TempDir::new().unwrap();
        let overlay = Arc::new(ScriptedOverlay::default());
        let store = Arc::new(ServiceStore::open(dir.path(), FilterEngine::new()).unwrap());
        let service = RatingService::new(overlay.clone(), RatingManager::new(store));

        let (rating, broadcast_error) = service
            .publish_rating(RatingKind::Fulfillment, &contract())
            .await
            .unwrap();
        assert!(broadcast_error.is_none());
        assert_eq!(rating.order_id, "order-9");

        let broadcasts = overlay.broadcasts.lock().unwrap();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].namespace, NEW_RATING_NAMESPACE);
        assert_eq!(
            broadcasts[0].payload["ratingId"],
            json!(rating.rating_id)
        );
    }

    #[tokio::test]
    async fn publish_reports_broadcast_failure_but_keeps_the_row() {
        let dir = TempDir::new().unwrap();
        let overlay = ScriptedOverlay {
            fail_broadcast: true,
            ..Default::default()
        };
        let service = service(&dir, overlay);

        let (_rating, broadcast_error) = service
            .publish_rating(RatingKind::Completion, &contract())
            .await
            .unwrap();
        assert!(broadcast_error.unwrap().contains("failed to broadcast"));

        // The rating row exists locally despite the failed broadcast.
        assert_eq!(service.manager.store().ratings.search("").count(), 1);
    }
}
