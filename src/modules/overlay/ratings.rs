//! Rating ingestion: validate a marketplace contract and mint a rating
//! record for local persistence and broadcast.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::modules::store::ServiceStore;

#[derive(Debug, Error)]
pub enum RatingError {
    #[error("contract is missing {0}")]
    MissingField(&'static str),

    #[error("rating score {0} is out of range (1-5)")]
    ScoreOutOfRange(f64),

    #[error("failed to persist rating: {0}")]
    Persist(String),
}

/// Which ingest path produced a rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingKind {
    Fulfillment,
    Completion,
}

/// Per-dimension scores carried by a contract's rating block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingScores {
    #[serde(default)]
    pub overall: f64,
    #[serde(default)]
    pub quality: f64,
    #[serde(default)]
    pub description: f64,
    #[serde(default, rename = "deliverySpeed")]
    pub delivery_speed: f64,
    #[serde(default, rename = "customerService")]
    pub customer_service: f64,
}

impl RatingScores {
    fn dimensions(&self) -> [f64; 5] {
        [
            self.overall,
            self.quality,
            self.description,
            self.delivery_speed,
            self.customer_service,
        ]
    }

    /// Mean over the dimensions that were actually scored.
    pub fn average(&self) -> f64 {
        let scored: Vec<f64> = self
            .dimensions()
            .into_iter()
            .filter(|score| *score > 0.0)
            .collect();
        if scored.is_empty() {
            return 0.0;
        }
        scored.iter().sum::<f64>() / scored.len() as f64
    }
}

/// The slice of a marketplace contract the rating paths consume. Anything
/// else the contract carries rides along untyped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contract {
    #[serde(default, rename = "orderId")]
    pub order_id: String,

    #[serde(default, rename = "vendorID")]
    pub vendor_id: String,

    #[serde(default, rename = "buyerID")]
    pub buyer_id: String,

    #[serde(default)]
    pub ratings: RatingScores,

    #[serde(default)]
    pub review: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A published rating row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    #[serde(rename = "ratingId")]
    pub rating_id: String,

    #[serde(rename = "orderId")]
    pub order_id: String,

    pub kind: RatingKind,

    #[serde(rename = "sourcePeer")]
    pub source_peer: String,

    #[serde(rename = "targetPeer")]
    pub target_peer: String,

    pub scores: RatingScores,

    #[serde(default)]
    pub review: String,

    pub average: f64,

    pub timestamp: i64,
}

/// Validates contracts and persists minted ratings into the ratings
/// collection.
pub struct RatingManager {
    store: Arc<ServiceStore>,
}

impl RatingManager {
    pub fn new(store: Arc<ServiceStore>) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &ServiceStore {
        &self.store
    }

    /// A fulfillment rating: the vendor fulfilled the order and rates the
    /// buyer side of the exchange.
    pub fn ingest_fulfillment_rating(&self, contract: &Contract) -> Result<Rating, RatingError> {
        self.ingest(
            contract,
            RatingKind::Fulfillment,
            &contract.vendor_id,
            &contract.buyer_id,
        )
    }

    /// A completion rating: the buyer completed the order and rates the
    /// vendor.
    pub fn ingest_completion_rating(&self, contract: &Contract) -> Result<Rating, RatingError> {
        self.ingest(
            contract,
            RatingKind::Completion,
            &contract.buyer_id,
            &contract.vendor_id,
        )
    }

    fn ingest(
        &self,
        contract: &Contract,
        kind: RatingKind,
        source: &str,
        target: &str,
    ) -> Result<Rating, RatingError> {
        validate(contract)?;

        let rating = Rating {
            rating_id: Uuid::new_v4().to_string(),
            order_id: contract.order_id.clone(),
            kind,
            source_peer: source.to_string(),
            target_peer: target.to_string(),
            scores: contract.ratings.clone(),
            review: contract.review.clone(),
            average: contract.ratings.average(),
            timestamp: Utc::now().timestamp(),
        };

        let value =
            serde_json::to_value(&rating).map_err(|err| RatingError::Persist(err.to_string()))?;
        self.store
            .ratings
            .insert(&value)
            .map_err(|err| RatingError::Persist(err.to_string()))?;
        self.store.ratings.flush_se();
        self.store
            .ratings
            .commit()
            .map_err(|err| RatingError::Persist(err.to_string()))?;

        info!(
            order = %rating.order_id,
            kind = ?rating.kind,
            average = rating.average,
            "Rating ingested"
        );
        Ok(rating)
    }
}

fn validate(contract: &Contract) -> Result<(), RatingError> {
    if contract.order_id.is_empty() {
        return Err(RatingError::MissingField("orderId"));
    }
    if contract.vendor_id.is_empty() {
        return Err(RatingError::MissingField("vendorID"));
    }
    if contract.buyer_id.is_empty() {
        return Err(RatingError::MissingField("buyerID"));
    }
    for score in contract.ratings.dimensions() {
        if score != 0.0 && !(1.0..=5.0).contains(&score) {
            return Err(RatingError::ScoreOutOfRange(score));
        }
    }
    Ok(())
}
