//! Service bootstrap: configuration, storage, crawler and HTTP wiring.

use std::sync::Arc;

use tracing::{error, info};

use crate::api::app_state::AppState;
use crate::api::rest;
use crate::bootstrap::config::Config;
use crate::errors::AppError;
use crate::modules::crawler::{CrawlerService, Digester};
use crate::modules::expr::FilterEngine;
use crate::modules::gateway::GatewayClient;
use crate::modules::location::LocationMap;
use crate::modules::overlay::{DisconnectedOverlay, Overlay, RatingManager, RatingService};
use crate::modules::store::ServiceStore;

pub async fn run() -> Result<(), AppError> {
    init_tracing();

    let config = Config::from_env();
    info!("Configuration loaded. Initializing service...");

    let locations = Arc::new(LocationMap::load(&config.location_map));
    let engine = FilterEngine::with_locations(locations.clone());

    // The document store failing to open is the one fatal startup error.
    let store = Arc::new(ServiceStore::open(&config.data_dir, engine)?);
    let gateway = Arc::new(GatewayClient::new(&config)?);
    let digester = Arc::new(Digester::new(gateway.clone(), store.clone()));

    // The overlay transport is attached externally; until then rating
    // broadcasts report failure and seeks come back empty.
    let overlay: Arc<dyn Overlay> = Arc::new(DisconnectedOverlay);
    let ratings = Arc::new(RatingService::new(
        overlay,
        RatingManager::new(store.clone()),
    ));

    let crawler = Arc::new(CrawlerService::new(
        config.clone(),
        gateway.clone(),
        store.clone(),
        digester.clone(),
    ));
    let self_id = crawler.self_id_handle();
    crawler.start().await;

    let state = AppState {
        store: store.clone(),
        digester,
        gateway,
        ratings,
        locations,
        self_id,
        config: Arc::new(config.clone()),
    };

    tokio::select! {
        result = rest::start(state, &config) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            for collection in [&store.peers, &store.listings, &store.ratings] {
                if let Err(err) = collection.commit() {
                    error!(collection = collection.name(), error = %err, "Final commit failed");
                }
            }
        }
    }

    info!("Service shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(true)
        .init();
}
