//! Property-based tests for the query translator and value handling.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Placeholders are numbered contiguously across WHERE and SET
//! - Container values survive serialization for binding
//! - Identity aliases resolve to one constraint
//! - Containers round-trip through a collection unchanged

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use botstore::storage::sql::{BindValue, build_set_clause, build_where_clause};
use botstore::{BackendSelector, Document, Filter, Update};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn field_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,12}".prop_filter("store-managed", |f| {
        !matches!(f.as_str(), "id" | "created_at" | "updated_at")
    })
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::String),
    ]
}

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        "[a-z ]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn container() -> impl Strategy<Value = Value> {
    json_value().prop_filter("containers only", |v| v.is_array() || v.is_object())
}

fn count_placeholders(clause: &str) -> Vec<usize> {
    clause
        .split('$')
        .skip(1)
        .map(|rest| {
            rest.chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .unwrap()
        })
        .collect()
}

proptest! {
    /// Property: WHERE then SET placeholders run 1..=n without gaps.
    #[test]
    fn prop_placeholders_are_contiguous(
        filter_fields in prop::collection::btree_map(field_name(), scalar(), 0..6),
        update_fields in prop::collection::btree_map(field_name(), json_value(), 1..6),
    ) {
        let filter = filter_fields
            .iter()
            .fold(Filter::new(), |f, (k, v)| f.eq(k, v.clone()));
        let update_doc: Document = update_fields.into_iter().collect();
        let update = Update::set(update_doc);

        let where_clause = build_where_clause(&filter, 1).unwrap();
        let set_clause = build_set_clause(&update, where_clause.next_param).unwrap();

        let non_null = filter_fields.values().filter(|v| !v.is_null()).count();
        prop_assert_eq!(where_clause.params.len(), non_null);
        prop_assert_eq!(set_clause.params.len(), update.fields().len());

        let mut numbers = count_placeholders(&where_clause.clause);
        numbers.extend(count_placeholders(&set_clause.clause));
        let expected: Vec<usize> = (1..=numbers.len()).collect();
        prop_assert_eq!(numbers, expected);
        prop_assert_eq!(set_clause.next_param, non_null + update.fields().len() + 1);
    }

    /// Property: container values bind as JSON text that parses back equal.
    #[test]
    fn prop_containers_bind_as_json(value in container()) {
        match BindValue::from_value(&value) {
            BindValue::Json(text) => {
                let parsed: Value = serde_json::from_str(&text).unwrap();
                prop_assert_eq!(parsed, value);
            },
            other => prop_assert!(false, "expected Json, got {:?}", other),
        }
    }

    /// Property: `_id` and `id` produce the same filter.
    #[test]
    fn prop_identity_alias_folds(id in 1i64..1_000_000) {
        let alias = Filter::from_value(&serde_json::json!({"_id": id})).unwrap();
        let physical = Filter::from_value(&serde_json::json!({"id": id})).unwrap();
        prop_assert_eq!(&alias, &physical);
        prop_assert_eq!(&Filter::by_id(id), &alias);
    }

    /// Property: containers come back from a collection exactly as written.
    #[test]
    fn prop_containers_round_trip(value in container(), name in "[a-z]{1,10}") {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let found = runtime.block_on(async {
            let coll = BackendSelector::in_memory().get_collection("entities").unwrap();
            let mut doc = Map::new();
            doc.insert("name".to_string(), Value::String(name));
            doc.insert("training_data".to_string(), value.clone());
            let id = coll.insert_one(doc).await.unwrap();
            coll.find_one(&Filter::by_id(id), None).await.unwrap().unwrap()
        });

        prop_assert_eq!(&found["training_data"], &value);
    }
}
