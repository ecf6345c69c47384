//! Documents, identities and value helpers.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// An ordered mapping from field name to JSON-compatible value.
///
/// Field order is preserved (`serde_json` is built with `preserve_order`).
pub type Document = Map<String, Value>;

/// Physical name of the identity field.
pub const IDENTITY_FIELD: &str = "id";

/// Logical alias accepted for the identity field in filters.
pub const IDENTITY_ALIAS: &str = "_id";

/// Creation timestamp, stamped by the store.
pub const CREATED_AT_FIELD: &str = "created_at";

/// Modification timestamp, refreshed by the store on every update.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Converts a JSON value into a [`Document`].
///
/// # Errors
///
/// Returns [`Error::QueryTranslation`] if the value is not a mapping.
///
/// # Examples
///
/// ```rust
/// use botstore::document;
/// use serde_json::json;
///
/// let doc = document(json!({"name": "default"})).unwrap();
/// assert_eq!(doc["name"], "default");
/// assert!(document(json!([1, 2])).is_err());
/// ```
pub fn document(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::QueryTranslation(format!(
            "document must be a mapping, got {}",
            kind_name(&other)
        ))),
    }
}

/// Store-assigned identity of a document.
///
/// The relational backend hands out serial integers; the document backends
/// hand out opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    /// Auto-increment identity (relational backend).
    Serial(i64),
    /// Opaque identity (document backends).
    Text(String),
}

impl DocumentId {
    /// Returns the identity as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Serial(n) => Value::from(*n),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    /// Reads an identity from a JSON value.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Serial),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Returns the serial value, if this is a serial identity.
    #[must_use]
    pub const fn as_serial(&self) -> Option<i64> {
        match self {
            Self::Serial(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for DocumentId {
    fn from(value: i64) -> Self {
        Self::Serial(value)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        id.to_value()
    }
}

/// Returns true for nested documents and lists.
#[must_use]
pub const fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Short name of a value's type, for error messages.
#[must_use]
pub const fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Returns true for fields the store manages itself.
#[must_use]
pub fn is_store_managed(field: &str) -> bool {
    matches!(
        field,
        IDENTITY_FIELD | IDENTITY_ALIAS | CREATED_AT_FIELD | UPDATED_AT_FIELD
    )
}

/// Checks that a name is safe to use as a SQL identifier or document field.
///
/// Names must match `[A-Za-z_][A-Za-z0-9_]*` and be at most 63 bytes long
/// (the PostgreSQL identifier limit).
///
/// # Errors
///
/// Returns [`Error::QueryTranslation`] for empty, overlong or unsafe names.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest && name.len() <= 63 {
        Ok(())
    } else {
        Err(Error::QueryTranslation(format!(
            "'{name}' is not a valid field or collection name"
        )))
    }
}

/// Checks a document before it is inserted.
///
/// # Errors
///
/// Returns [`Error::QueryTranslation`] if a field name is unsafe or
/// store-managed.
pub fn validate_insert(doc: &Document) -> Result<()> {
    for field in doc.keys() {
        if is_store_managed(field) {
            return Err(Error::QueryTranslation(format!(
                "'{field}' is assigned by the store and cannot be inserted"
            )));
        }
        validate_identifier(field)?;
    }
    Ok(())
}

/// Equality with numeric normalisation (`1 == 1.0`).
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

/// Cross-type rank, following document-store ordering (null sorts first).
const fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over optional values. Missing fields compare as null.
#[must_use]
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_)) => {
            a.to_string().cmp(&b.to_string())
        },
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Drops top-level fields whose value is null.
///
/// Relational rows cannot tell a NULL column from a field that was never
/// written, so every backend returns documents in this normalised shape.
#[must_use]
pub fn strip_nulls(doc: Document) -> Document {
    doc.into_iter().filter(|(_, v)| !v.is_null()).collect()
}

/// Formats a timestamp the way every backend reports it.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time in the store's timestamp format.
#[must_use]
pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("name" ; "plain")]
    #[test_case("_private" ; "leading underscore")]
    #[test_case("thread_id2" ; "digits")]
    fn test_valid_identifiers(name: &str) {
        assert!(validate_identifier(name).is_ok());
    }

    #[test_case("" ; "empty")]
    #[test_case("1abc" ; "leading digit")]
    #[test_case("name; DROP TABLE bots" ; "injection")]
    #[test_case("a.b" ; "dotted path")]
    #[test_case("\"quoted\"" ; "quotes")]
    fn test_invalid_identifiers(name: &str) {
        assert!(matches!(
            validate_identifier(name),
            Err(Error::QueryTranslation(_))
        ));
    }

    #[test]
    fn test_identifier_length_limit() {
        assert!(validate_identifier(&"a".repeat(63)).is_ok());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_validate_insert_rejects_store_managed_fields() {
        for field in ["id", "_id", "created_at", "updated_at"] {
            let mut doc = Document::new();
            doc.insert(field.to_string(), json!(1));
            assert!(validate_insert(&doc).is_err(), "{field} should be rejected");
        }
        let doc = document(json!({"name": "default", "tags": ["a"]})).unwrap();
        assert!(validate_insert(&doc).is_ok());
    }

    #[test]
    fn test_values_equal_normalises_numbers() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(values_equal(&json!({"a": [1]}), &json!({"a": [1]})));
    }

    #[test]
    fn test_compare_values_orders_types() {
        assert_eq!(compare_values(None, Some(&json!(0))), Ordering::Less);
        assert_eq!(
            compare_values(Some(&json!(2)), Some(&json!(10))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(Some(&json!(5)), Some(&json!("a"))),
            Ordering::Less
        );
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let earlier = format_timestamp(DateTime::from_timestamp(1_700_000_000, 5_000).unwrap());
        let later = format_timestamp(DateTime::from_timestamp(1_700_000_000, 6_000).unwrap());
        assert!(earlier < later);
        assert!(earlier.ends_with('Z'));
    }

    #[test]
    fn test_strip_nulls_keeps_nested_nulls() {
        let doc = document(json!({"a": null, "b": {"c": null}})).unwrap();
        let stripped = strip_nulls(doc);
        assert!(!stripped.contains_key("a"));
        assert_eq!(stripped["b"], json!({"c": null}));
    }

    #[test]
    fn test_document_id_round_trip() {
        assert_eq!(DocumentId::from_value(&json!(7)), Some(DocumentId::Serial(7)));
        assert_eq!(
            DocumentId::from_value(&json!("abc")),
            Some(DocumentId::Text("abc".to_string()))
        );
        assert_eq!(DocumentId::from_value(&json!(true)), None);
        assert_eq!(DocumentId::Serial(3).to_string(), "3");
    }
}
