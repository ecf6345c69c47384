//! MongoDB Integration Tests
//!
//! Runs the collection contract and the selector against a live server.
//!
//! These tests require a running MongoDB server. Set the environment variable
//! `BOTSTORE_TEST_MONGODB_URL` to enable these tests:
//!
//! ```bash
//! export BOTSTORE_TEST_MONGODB_URL="mongodb://localhost:27017"
//! cargo test --features mongodb --test mongodb_integration
//! ```

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
#![cfg(feature = "mongodb")]

mod common;

use botstore::storage::MongoStore;
use botstore::{BackendChoice, BackendSelector, Error, Filter, StoreConfig, document};
use serde_json::json;
use std::env;
use std::time::Duration;

/// Environment variable for MongoDB test connection URL.
const MONGODB_URL_ENV: &str = "BOTSTORE_TEST_MONGODB_URL";

/// Database the tests write to.
const TEST_DATABASE: &str = "botstore_test";

/// Returns the MongoDB connection URL if available, or None to skip tests.
fn get_mongodb_url() -> Option<String> {
    env::var(MONGODB_URL_ENV).ok()
}

/// Macro to skip tests when MongoDB is not available.
macro_rules! require_mongodb {
    () => {
        match get_mongodb_url() {
            Some(url) => url,
            None => {
                eprintln!(
                    "Skipping test: {} not set. Set this environment variable to run MongoDB tests.",
                    MONGODB_URL_ENV
                );
                return;
            }
        }
    };
}

async fn selector(url: &str) -> BackendSelector {
    let mut config = StoreConfig::new();
    config.backend = BackendChoice::Document;
    config.document.uri = url.to_string();
    config.document.database = TEST_DATABASE.to_string();

    let selector = BackendSelector::connect(&config).await.unwrap();
    let status = selector.health_status();
    assert!(!status.degraded, "fell back: {:?}", status.reason);
    selector
}

#[tokio::test]
async fn test_collection_contract() {
    let url = require_mongodb!();
    let selector = selector(&url).await;
    let entities = selector.get_collection(common::COLLECTION).unwrap();

    common::run_all(entities.as_ref()).await;
    selector.shutdown().await;
}

#[tokio::test]
async fn test_store_ping() {
    let url = require_mongodb!();
    let store = MongoStore::connect(&url, TEST_DATABASE, Duration::from_secs(5))
        .await
        .unwrap();
    store.ping().await.unwrap();
    store.shutdown().await;
}

#[tokio::test]
async fn test_unique_index_conflicts() {
    let url = require_mongodb!();
    let selector = selector(&url).await;
    selector.ensure_schema().await.unwrap();
    let bots = selector.get_collection("bots").unwrap();
    let name = common::tag();

    bots.insert_one(document(json!({"name": name})).unwrap())
        .await
        .unwrap();
    let err = bots
        .insert_one(document(json!({"name": name})).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IdentityConflict { .. }), "{err}");

    bots.delete_many(&Filter::new().eq("name", name))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_conversation_memory() {
    let url = require_mongodb!();
    let selector = selector(&url).await;
    let memory = selector.conversation_memory().unwrap();
    let thread = common::tag();

    for step in 1..=3 {
        memory
            .save(&thread, document(json!({"step": step})).unwrap())
            .await
            .unwrap();
    }

    assert_eq!(memory.get_latest(&thread).await.unwrap().unwrap()["step"], 3);
    assert_eq!(memory.clear(&thread).await.unwrap(), 3);
    assert!(memory.get_latest(&thread).await.unwrap().is_none());
}

#[tokio::test]
async fn test_health_probe() {
    let url = require_mongodb!();
    let selector = selector(&url).await;
    let report = selector.check_health().await;
    assert!(report.reachable, "{:?}", report.error);
    assert_eq!(report.backend, "mongodb");
}
