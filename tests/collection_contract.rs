//! Collection contract against the in-memory engine.
//!
//! The same checks run against live servers in `postgresql_integration.rs`
//! and `mongodb_integration.rs`.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use botstore::storage::InMemoryEngine;
use botstore::{BackendSelector, Collection, Filter, document};
use serde_json::json;
use std::sync::Arc;

fn entities() -> Arc<dyn Collection> {
    BackendSelector::in_memory()
        .get_collection(common::COLLECTION)
        .unwrap()
}

#[tokio::test]
async fn test_insert_assigns_identity() {
    common::insert_assigns_identity(entities().as_ref()).await;
}

#[tokio::test]
async fn test_containers_round_trip() {
    common::containers_round_trip(entities().as_ref()).await;
}

#[tokio::test]
async fn test_nulls_are_omitted() {
    common::nulls_are_omitted(entities().as_ref()).await;
}

#[tokio::test]
async fn test_projection_limits_fields() {
    common::projection_limits_fields(entities().as_ref()).await;
}

#[tokio::test]
async fn test_find_sorts_and_limits() {
    common::find_sorts_and_limits(entities().as_ref()).await;
}

#[tokio::test]
async fn test_update_targets_first_match() {
    common::update_targets_first_match(entities().as_ref()).await;
}

#[tokio::test]
async fn test_missing_matches_are_noops() {
    common::missing_matches_are_noops(entities().as_ref()).await;
}

#[tokio::test]
async fn test_deletes_remove_matches() {
    common::deletes_remove_matches(entities().as_ref()).await;
}

#[tokio::test]
async fn test_rejects_malformed_input() {
    common::rejects_malformed_input(entities().as_ref()).await;
}

#[tokio::test]
async fn test_empty_filter_matches_everything() {
    let coll = entities();
    for name in ["a", "b", "c"] {
        coll.insert_one(document(json!({"name": name})).unwrap())
            .await
            .unwrap();
    }
    assert_eq!(coll.find(&Filter::new(), None, None).await.unwrap().len(), 3);
    assert_eq!(coll.find(&Filter::new(), None, Some(2)).await.unwrap().len(), 2);
    assert_eq!(coll.count(&Filter::new()).await.unwrap(), 3);
}

#[tokio::test]
async fn test_concurrent_inserts_get_distinct_identities() {
    let engine = InMemoryEngine::new();
    let coll = Arc::new(engine.collection("chat_logs").unwrap());

    let handles: Vec<_> = (0..32)
        .map(|n| {
            let coll = Arc::clone(&coll);
            tokio::spawn(async move {
                coll.insert_one(document(json!({"thread_id": "t", "n": n})).unwrap())
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().to_string());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 32);
    assert_eq!(engine.document_count(), 32);
}
