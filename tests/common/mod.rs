//! Behaviour every [`Collection`] backend must share.
//!
//! Each check works on the `entities` shape (`name`, `entity_type`,
//! `training_data`) and scopes its rows by a fresh `entity_type` tag, so the
//! checks can run concurrently against one live database.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use botstore::{Collection, Document, Filter, Projection, Sort, Update, document};
use serde_json::{Value, json};
use uuid::Uuid;

/// Collection the checks write to.
pub const COLLECTION: &str = "entities";

/// A unique scope for one check.
pub fn tag() -> String {
    format!("t{}", Uuid::now_v7().simple())
}

fn entity(tag: &str, name: &str, training_data: Value) -> Document {
    document(json!({"name": name, "entity_type": tag, "training_data": training_data})).unwrap()
}

fn scope(tag: &str) -> Filter {
    Filter::new().eq("entity_type", tag)
}

fn names(docs: &[Document]) -> Vec<String> {
    docs.iter()
        .map(|d| d["name"].as_str().unwrap().to_string())
        .collect()
}

/// Identity is assigned by the store and reachable through `id` and `_id`.
pub async fn insert_assigns_identity(coll: &dyn Collection) {
    let tag = tag();
    let id = coll
        .insert_one(entity(&tag, "city", json!(["paris"])))
        .await
        .unwrap();

    let by_alias = Filter::from_value(&json!({"_id": id.to_value()})).unwrap();
    let found = coll.find_one(&by_alias, None).await.unwrap().unwrap();
    assert_eq!(found["id"], id.to_value());
    assert_eq!(found["name"], "city");
    assert!(found.contains_key("created_at"));
    assert!(found.contains_key("updated_at"));

    let by_name = coll
        .find_one(&scope(&tag).eq("id", id.to_value()), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_name, found);
}

/// Nested documents and lists come back exactly as written.
pub async fn containers_round_trip(coll: &dyn Collection) {
    let tag = tag();
    let nested = json!([
        {"value": "new york", "synonyms": ["nyc", "big apple"]},
        {"value": "paris", "synonyms": [], "weight": 0.5, "active": true}
    ]);
    let id = coll
        .insert_one(entity(&tag, "city", nested.clone()))
        .await
        .unwrap();

    let found = coll
        .find_one(&Filter::by_id(id), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["training_data"], nested);
}

/// Object keys keep the order they were written in.
pub async fn container_key_order_survives(coll: &dyn Collection) {
    let tag = tag();
    let nested = json!({"zeta": 1, "alpha": 2, "mid": [{"b": 1, "a": 2}]});
    let id = coll
        .insert_one(entity(&tag, "ordered", nested.clone()))
        .await
        .unwrap();

    let found = coll
        .find_one(&Filter::by_id(id), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        serde_json::to_string(&found["training_data"]).unwrap(),
        serde_json::to_string(&nested).unwrap()
    );
}

/// Null fields are omitted on read and match `null` filters.
pub async fn nulls_are_omitted(coll: &dyn Collection) {
    let tag = tag();
    coll.insert_one(entity(&tag, "empty", Value::Null))
        .await
        .unwrap();

    let found = coll.find_one(&scope(&tag), None).await.unwrap().unwrap();
    assert!(!found.contains_key("training_data"));

    let by_null = scope(&tag).eq("training_data", Value::Null);
    assert_eq!(coll.count(&by_null).await.unwrap(), 1);
}

/// Projections keep the named fields plus identity.
pub async fn projection_limits_fields(coll: &dyn Collection) {
    let tag = tag();
    coll.insert_one(entity(&tag, "city", json!(["paris"])))
        .await
        .unwrap();

    let projection = Projection::new(["name"]).unwrap();
    let found = coll
        .find_one(&scope(&tag), Some(&projection))
        .await
        .unwrap()
        .unwrap();
    let keys: Vec<&str> = found.keys().map(String::as_str).collect();
    assert_eq!(keys.len(), 2, "unexpected fields: {keys:?}");
    assert!(found.contains_key("id"));
    assert_eq!(found["name"], "city");
}

/// `find` honours sort and limit; ties follow insertion order.
pub async fn find_sorts_and_limits(coll: &dyn Collection) {
    let tag = tag();
    for name in ["b", "a", "c", "a"] {
        coll.insert_one(entity(&tag, name, json!([name])))
            .await
            .unwrap();
    }

    let unsorted = coll.find(&scope(&tag), None, None).await.unwrap();
    assert_eq!(names(&unsorted), vec!["b", "a", "c", "a"]);

    let ascending = coll
        .find(&scope(&tag), Some(&Sort::asc("name")), None)
        .await
        .unwrap();
    assert_eq!(names(&ascending), vec!["a", "a", "b", "c"]);
    assert_eq!(ascending[0]["id"], unsorted[1]["id"]);
    assert_eq!(ascending[1]["id"], unsorted[3]["id"]);

    let top_two = coll
        .find(&scope(&tag), Some(&Sort::desc("name")), Some(2))
        .await
        .unwrap();
    assert_eq!(names(&top_two), vec!["c", "b"]);

    let unbounded = coll.find(&scope(&tag), None, Some(0)).await.unwrap();
    assert_eq!(unbounded.len(), 4);
}

/// Updates touch the first match only and refresh `updated_at`.
pub async fn update_targets_first_match(coll: &dyn Collection) {
    let tag = tag();
    let first = coll
        .insert_one(entity(&tag, "dup", json!([1])))
        .await
        .unwrap();
    let second = coll
        .insert_one(entity(&tag, "dup", json!([2])))
        .await
        .unwrap();

    let update = Update::from_value(&json!({"$set": {"training_data": [{"k": "v"}]}})).unwrap();
    let changed = coll
        .update_one(&scope(&tag).eq("name", "dup"), &update)
        .await
        .unwrap();
    assert!(changed);

    let first_doc = coll
        .find_one(&Filter::by_id(first), None)
        .await
        .unwrap()
        .unwrap();
    let second_doc = coll
        .find_one(&Filter::by_id(second), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first_doc["training_data"], json!([{"k": "v"}]));
    assert_eq!(second_doc["training_data"], json!([2]));
    assert!(first_doc["updated_at"].as_str() >= first_doc["created_at"].as_str());

    let flat = Update::from_value(&json!({"name": "renamed"})).unwrap();
    assert!(coll.update_one(&scope(&tag), &flat).await.unwrap());
    assert_eq!(
        coll.count(&scope(&tag).eq("name", "renamed")).await.unwrap(),
        1
    );
}

/// Writes that match nothing are no-ops, not errors.
pub async fn missing_matches_are_noops(coll: &dyn Collection) {
    let tag = tag();
    let update = Update::from_value(&json!({"name": "x"})).unwrap();
    assert!(!coll.update_one(&scope(&tag), &update).await.unwrap());
    assert!(!coll.delete_one(&scope(&tag)).await.unwrap());
    assert_eq!(coll.delete_many(&scope(&tag)).await.unwrap(), 0);
    assert!(coll.find_one(&scope(&tag), None).await.unwrap().is_none());
    assert!(coll.find(&scope(&tag), None, None).await.unwrap().is_empty());
}

/// An identity the store never hands out matches nothing.
pub async fn unknown_identity_is_absent(coll: &dyn Collection) {
    let by_text = Filter::from_value(&json!({"_id": "abc"})).unwrap();
    assert!(coll.find_one(&by_text, None).await.unwrap().is_none());
    assert_eq!(coll.count(&by_text).await.unwrap(), 0);

    let update = Update::from_value(&json!({"name": "x"})).unwrap();
    assert!(!coll.update_one(&by_text, &update).await.unwrap());
    assert!(!coll.delete_one(&by_text).await.unwrap());
}

/// `delete_one` removes the first match; `delete_many` the rest.
pub async fn deletes_remove_matches(coll: &dyn Collection) {
    let tag = tag();
    let first = coll
        .insert_one(entity(&tag, "a", json!([])))
        .await
        .unwrap();
    for name in ["b", "c"] {
        coll.insert_one(entity(&tag, name, json!([])))
            .await
            .unwrap();
    }

    assert!(coll.delete_one(&scope(&tag)).await.unwrap());
    assert!(
        coll.find_one(&Filter::by_id(first), None)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(coll.count(&scope(&tag)).await.unwrap(), 2);
    assert_eq!(coll.delete_many(&scope(&tag)).await.unwrap(), 2);
    assert_eq!(coll.count(&scope(&tag)).await.unwrap(), 0);
}

/// Malformed input fails before reaching the backend.
pub async fn rejects_malformed_input(coll: &dyn Collection) {
    let err = coll
        .insert_one(document(json!({"id": 7, "name": "x"})).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, botstore::Error::QueryTranslation(_)));

    let nested = Filter::new().eq("training_data", json!(["a"]));
    let err = coll.find_one(&nested, None).await.unwrap_err();
    assert!(matches!(err, botstore::Error::QueryTranslation(_)));

    let err = coll
        .find(&Filter::new().eq("bad name", 1), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, botstore::Error::QueryTranslation(_)));
}

/// Runs every check.
pub async fn run_all(coll: &dyn Collection) {
    insert_assigns_identity(coll).await;
    containers_round_trip(coll).await;
    container_key_order_survives(coll).await;
    nulls_are_omitted(coll).await;
    projection_limits_fields(coll).await;
    find_sorts_and_limits(coll).await;
    update_targets_first_match(coll).await;
    missing_matches_are_noops(coll).await;
    unknown_identity_is_absent(coll).await;
    deletes_remove_matches(coll).await;
    rejects_malformed_input(coll).await;
}
