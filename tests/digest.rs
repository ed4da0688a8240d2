//! Digest pipeline behavior against a scripted gateway.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use common::MockGateway;
use voyager::modules::crawler::Digester;
use voyager::modules::expr::FilterEngine;
use voyager::modules::gateway::GatewayClient;
use voyager::modules::store::ServiceStore;

fn summary(slug: &str, hash: &str) -> Value {
    json!({
        "slug": slug,
        "hash": hash,
        "title": format!("{slug} title"),
        "description": format!("{slug} description"),
        "price": {"amount": 100, "currencyCode": "USD"},
        "thumbnail": {"tiny": "", "small": "", "medium": ""},
        "averageRating": 4.0
    })
}

fn detail(peer: &str, hash: &str) -> Value {
    json!({
        "hash": hash,
        "vendorID": {"peerID": peer},
        "description": "full detail description",
        "shippingOptions": [{"name": "intl"}]
    })
}

fn seed_peer(gateway: &MockGateway, peer: &str, slugs: &[(&str, &str)]) {
    gateway.set_profile(peer, json!({"name": peer, "shortDescription": "seller"}));
    gateway.set_listings(
        peer,
        slugs.iter().map(|(slug, hash)| summary(slug, hash)).collect(),
    );
    for (slug, hash) in slugs {
        gateway.set_detail(peer, slug, detail(peer, hash));
    }
}

async fn fixture(gateway: &MockGateway) -> (TempDir, Arc<ServiceStore>, Digester) {
    let base = gateway.serve().await;
    let dir = TempDir::new().unwrap();
    let store = Arc::new(ServiceStore::open(dir.path(), FilterEngine::new()).unwrap());
    let client = Arc::new(GatewayClient::with_base(&base, Duration::from_secs(5)).unwrap());
    let digester = Digester::new(client, store.clone());
    (dir, store, digester)
}

fn listings_for(store: &ServiceStore, peer: &str) -> usize {
    store
        .listings
        .search("")
        .filter(&format!("doc.vendorID.peerID == \"{peer}\""))
        .count()
}

#[tokio::test]
async fn digest_persists_profile_and_normalized_listings() {
    let gateway = MockGateway::new();
    seed_peer(&gateway, "QmX", &[("golden-age", "QmHashA"), ("silver-age", "QmHashB")]);
    let (_dir, store, digester) = fixture(&gateway).await;

    let record = digester.digest("QmX").await.unwrap();
    assert_eq!(record.id, "QmX");
    assert!(record.last_ping > 0);
    assert_eq!(record.raw_profile.get("name"), Some(&json!("QmX")));

    store.listings.flush_se();
    assert_eq!(listings_for(&store, "QmX"), 2);

    // Normalization: peerSlug = parentPeer ":" slug, detail fields kept,
    // summary metadata carried over.
    let hit = store.listings.search("QmHashA");
    assert_eq!(hit.count(), 1);
    let doc = &hit.documents()[0].content;
    assert_eq!(doc["peerSlug"], json!("QmX:golden-age"));
    assert_eq!(doc["parentPeer"], json!("QmX"));
    assert_eq!(doc["vendorID"]["peerID"], json!("QmX"));
    assert_eq!(doc["shippingOptions"][0]["name"], json!("intl"));
    assert_eq!(doc["averageRating"], json!(4.0));
}

#[tokio::test]
async fn digest_is_idempotent_for_identical_upstream_content() {
    let gateway = MockGateway::new();
    seed_peer(&gateway, "QmX", &[("golden-age", "QmHashA"), ("silver-age", "QmHashB")]);
    let (_dir, store, digester) = fixture(&gateway).await;

    digester.digest("QmX").await.unwrap();
    store.listings.flush_se();
    let first_id = store.listings.search("QmHashA").documents()[0].id.clone();

    digester.digest("QmX").await.unwrap();
    store.listings.flush_se();

    assert_eq!(listings_for(&store, "QmX"), 2);
    let second_id = store.listings.search("QmHashA").documents()[0].id.clone();
    assert_eq!(first_id, second_id);
}

#[tokio::test]
async fn removed_upstream_listings_are_cleared_on_redigest() {
    let gateway = MockGateway::new();
    seed_peer(&gateway, "QmX", &[("golden-age", "QmHashA"), ("silver-age", "QmHashB")]);
    let (_dir, store, digester) = fixture(&gateway).await;

    digester.digest("QmX").await.unwrap();
    store.listings.flush_se();
    assert_eq!(listings_for(&store, "QmX"), 2);

    // Upstream now advertises only one listing.
    gateway.set_listings("QmX", vec![summary("golden-age", "QmHashA")]);
    digester.digest("QmX").await.unwrap();
    store.listings.flush_se();

    assert_eq!(listings_for(&store, "QmX"), 1);
    assert_eq!(store.listings.search("QmHashB").count(), 0);
}

#[tokio::test]
async fn failed_detail_fetch_drops_that_listing_and_keeps_the_rest() {
    let gateway = MockGateway::new();
    seed_peer(&gateway, "QmX", &[("golden-age", "QmHashA"), ("silver-age", "QmHashB")]);
    let (_dir, store, digester) = fixture(&gateway).await;

    digester.digest("QmX").await.unwrap();
    store.listings.flush_se();
    assert_eq!(listings_for(&store, "QmX"), 2);

    // The summary still advertises silver-age but its detail endpoint is
    // gone: the prior document for that hash is deleted, the other listing
    // is untouched.
    gateway.remove_detail("QmX", "silver-age");
    digester.digest("QmX").await.unwrap();
    store.listings.flush_se();

    assert_eq!(store.listings.search("QmHashB").count(), 0);
    assert_eq!(store.listings.search("QmHashA").count(), 1);
    assert_eq!(listings_for(&store, "QmX"), 1);
}

#[tokio::test]
async fn rejected_profile_fails_with_the_gateway_reason() {
    let gateway = MockGateway::new();
    let (_dir, _store, digester) = fixture(&gateway).await;

    // Unknown peers get a success=false envelope from the gateway.
    let err = digester.digest("QmUnknown").await.unwrap_err();
    assert_eq!(err.to_string(), "peer not found");
}

#[tokio::test]
async fn gateway_failures_consume_the_retry_budget() {
    let gateway = MockGateway::new();
    gateway
        .broken_profiles
        .lock()
        .unwrap()
        .insert("QmDown".to_string());
    let (_dir, _store, digester) = fixture(&gateway).await;

    for attempt in 1..=5u32 {
        let err = digester.digest("QmDown").await.unwrap_err();
        assert!(err.to_string().contains("retrieve timeout"));
        assert_eq!(digester.retries("QmDown").await, attempt);
    }
    assert!(digester.exhausted("QmDown").await);
    assert!(!digester.exhausted("QmFine").await);
}

#[tokio::test]
async fn clear_listings_empties_the_peers_slice_of_the_collection() {
    let gateway = MockGateway::new();
    seed_peer(&gateway, "QmX", &[("golden-age", "QmHashA")]);
    seed_peer(&gateway, "QmY", &[("other", "QmHashC")]);
    let (_dir, store, digester) = fixture(&gateway).await;

    digester.digest("QmX").await.unwrap();
    digester.digest("QmY").await.unwrap();
    store.listings.flush_se();

    digester.clear_listings("QmX").await.unwrap();
    assert_eq!(listings_for(&store, "QmX"), 0);
    // The other peer's listings survive.
    assert_eq!(listings_for(&store, "QmY"), 1);
}
