//! Native document backend over MongoDB.
//!
//! Documents map one-to-one onto BSON documents. The store's `id` field is
//! the server's `_id`, exposed as the hex string of the generated object id.
//! `created_at` / `updated_at` are stamped here so that documents come back
//! with the same shape as on the relational backend.

use crate::models::{
    CREATED_AT_FIELD, Document, DocumentId, FieldRef, Filter, IDENTITY_FIELD, Projection, Sort,
    UPDATED_AT_FIELD, Update, strip_nulls, timestamp_now, validate_identifier, validate_insert,
};
use crate::storage::schema::COLLECTIONS;
use crate::storage::traits::Collection;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, Bson, Document as BsonDocument, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};
use serde_json::Value;
use std::time::Duration;

const BACKEND: &str = "mongodb";
const OBJECT_ID: &str = "_id";
const DUPLICATE_KEY: i32 = 11000;

/// Maps a driver error.
fn mongo_error(collection: &str, operation: &str, e: &mongodb::error::Error) -> Error {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
            Error::IdentityConflict {
                collection: collection.to_string(),
                cause: write.message.clone(),
            }
        },
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => Error::StorageUnavailable {
            backend: BACKEND,
            operation: operation.to_string(),
            cause: e.to_string(),
        },
        _ => Error::QueryFailed {
            operation: format!("{operation} on '{collection}'"),
            cause: e.to_string(),
        },
    }
}

fn encode_error(e: &bson::ser::Error) -> Error {
    Error::QueryTranslation(format!("value cannot be stored as BSON: {e}"))
}

fn to_bson(value: &Value) -> Result<Bson> {
    bson::to_bson(value).map_err(|e| encode_error(&e))
}

/// Identity filter value: hex strings become object ids.
fn identity_to_bson(value: &Value) -> Result<Bson> {
    match value {
        Value::String(s) => Ok(ObjectId::parse_str(s)
            .map_or_else(|_| Bson::String(s.clone()), Bson::ObjectId)),
        other => to_bson(other),
    }
}

fn identity_from_bson(id: Bson) -> Value {
    match id {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        other => other.into_relaxed_extjson(),
    }
}

/// Translates a filter into a query document.
pub(crate) fn filter_to_bson(filter: &Filter) -> Result<BsonDocument> {
    filter.validate()?;
    let mut query = BsonDocument::new();
    for constraint in filter.constraints() {
        match &constraint.field {
            FieldRef::Identity => query.insert(OBJECT_ID, identity_to_bson(&constraint.value)?),
            FieldRef::Named(field) => query.insert(field.as_str(), to_bson(&constraint.value)?),
        };
    }
    Ok(query)
}

/// Sort document with the identity tie-break.
pub(crate) fn sort_to_bson(sort: Option<&Sort>) -> BsonDocument {
    let mut order = BsonDocument::new();
    match sort {
        None => {
            order.insert(OBJECT_ID, 1);
        },
        Some(sort) => {
            let direction = sort.direction.as_i32();
            if let FieldRef::Named(field) = &sort.field {
                order.insert(field.as_str(), direction);
            }
            order.insert(OBJECT_ID, direction);
        },
    }
    order
}

fn projection_to_bson(projection: &Projection) -> BsonDocument {
    let mut fields = BsonDocument::new();
    fields.insert(OBJECT_ID, 1);
    for field in projection.fields() {
        if field != IDENTITY_FIELD {
            fields.insert(field.as_str(), 1);
        }
    }
    fields
}

/// Converts a stored BSON document into a store document.
pub(crate) fn from_bson(mut raw: BsonDocument) -> Document {
    let mut doc = Document::new();
    if let Some(id) = raw.remove(OBJECT_ID) {
        doc.insert(IDENTITY_FIELD.to_string(), identity_from_bson(id));
    }
    for (field, value) in raw {
        doc.insert(field, value.into_relaxed_extjson());
    }
    strip_nulls(doc)
}

/// Connection to one MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Connects and verifies the server answers a `ping`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the URI cannot be parsed or
    /// no server is selected within `server_selection_timeout`.
    pub async fn connect(
        uri: &str,
        database: &str,
        server_selection_timeout: Duration,
    ) -> Result<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| mongo_unavailable("connect", &e))?;
        options.server_selection_timeout = Some(server_selection_timeout);
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());

        let client = Client::with_options(options).map_err(|e| mongo_unavailable("connect", &e))?;
        let store = Self {
            database: client.database(database),
            client,
        };
        store.ping().await?;

        tracing::info!(database, "Connected to MongoDB");
        Ok(store)
    }

    /// Round-trips a `ping` command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the server does not answer.
    pub async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| mongo_unavailable("ping", &e))
    }

    /// Returns a handle to the named collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] if the name is unsafe.
    pub fn collection(&self, name: &str) -> Result<MongoCollection> {
        validate_identifier(name)?;
        Ok(MongoCollection {
            name: name.to_string(),
            inner: self.database.collection::<BsonDocument>(name),
        })
    }

    /// Creates unique indexes for every known collection.
    ///
    /// # Errors
    ///
    /// Returns an error if an index cannot be created.
    pub async fn ensure_indexes(&self) -> Result<()> {
        for schema in COLLECTIONS {
            for field in schema.unique_fields {
                let mut keys = BsonDocument::new();
                keys.insert(*field, 1);
                let model = IndexModel::builder()
                    .keys(keys)
                    .options(IndexOptions::builder().unique(true).build())
                    .build();
                self.database
                    .collection::<BsonDocument>(schema.name)
                    .create_index(model)
                    .await
                    .map_err(|e| mongo_error(schema.name, "create_index", &e))?;
                tracing::debug!(collection = schema.name, field, "Ensured unique index");
            }
        }
        Ok(())
    }

    /// Closes the client's connection pool.
    pub async fn shutdown(&self) {
        self.client.clone().shutdown().await;
    }
}

fn mongo_unavailable(operation: &str, e: &mongodb::error::Error) -> Error {
    Error::StorageUnavailable {
        backend: BACKEND,
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

/// A MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoCollection {
    name: String,
    inner: mongodb::Collection<BsonDocument>,
}

impl MongoCollection {
    /// `_id` of the first match in identity order.
    async fn first_match_id(&self, operation: &str, filter: &Filter) -> Result<Option<Bson>> {
        let found = self
            .inner
            .find_one(filter_to_bson(filter)?)
            .sort(doc! { "_id": 1 })
            .projection(doc! { "_id": 1 })
            .await
            .map_err(|e| mongo_error(&self.name, operation, &e))?;
        Ok(found.and_then(|mut d| d.remove(OBJECT_ID)))
    }
}

#[async_trait]
impl Collection for MongoCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, doc: Document) -> Result<DocumentId> {
        validate_insert(&doc)?;
        let mut stored = bson::to_document(&strip_nulls(doc)).map_err(|e| encode_error(&e))?;
        let now = timestamp_now();
        stored.insert(CREATED_AT_FIELD, now.clone());
        stored.insert(UPDATED_AT_FIELD, now);

        let result = self
            .inner
            .insert_one(stored)
            .await
            .map_err(|e| mongo_error(&self.name, "insert_one", &e))?;

        let value = identity_from_bson(result.inserted_id);
        let id =
            DocumentId::from_value(&value).unwrap_or_else(|| DocumentId::Text(value.to_string()));
        tracing::debug!(collection = %self.name, id = %id, "Inserted document");
        Ok(id)
    }

    async fn find_one(
        &self,
        filter: &Filter,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>> {
        let mut action = self
            .inner
            .find_one(filter_to_bson(filter)?)
            .sort(sort_to_bson(None));
        if let Some(projection) = projection {
            action = action.projection(projection_to_bson(projection));
        }
        let found = action
            .await
            .map_err(|e| mongo_error(&self.name, "find_one", &e))?;
        Ok(found.map(from_bson))
    }

    async fn find(
        &self,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        let mut action = self
            .inner
            .find(filter_to_bson(filter)?)
            .sort(sort_to_bson(sort));
        if let Some(limit) = limit.filter(|n| *n > 0) {
            action = action.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        let cursor = action
            .await
            .map_err(|e| mongo_error(&self.name, "find", &e))?;
        let raw: Vec<BsonDocument> = cursor
            .try_collect()
            .await
            .map_err(|e| mongo_error(&self.name, "find", &e))?;
        Ok(raw.into_iter().map(from_bson).collect())
    }

    async fn update_one(&self, filter: &Filter, update: &Update) -> Result<bool> {
        update.validate()?;
        let Some(id) = self.first_match_id("update_one", filter).await? else {
            return Ok(false);
        };

        let mut fields = bson::to_document(update.fields()).map_err(|e| encode_error(&e))?;
        fields.insert(UPDATED_AT_FIELD, timestamp_now());
        let result = self
            .inner
            .update_one(doc! { "_id": id }, doc! { "$set": fields })
            .await
            .map_err(|e| mongo_error(&self.name, "update_one", &e))?;
        Ok(result.matched_count > 0)
    }

    async fn delete_one(&self, filter: &Filter) -> Result<bool> {
        let Some(id) = self.first_match_id("delete_one", filter).await? else {
            return Ok(false);
        };
        let result = self
            .inner
            .delete_one(doc! { "_id": id })
            .await
            .map_err(|e| mongo_error(&self.name, "delete_one", &e))?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_many(&self, filter: &Filter) -> Result<u64> {
        let result = self
            .inner
            .delete_many(filter_to_bson(filter)?)
            .await
            .map_err(|e| mongo_error(&self.name, "delete_many", &e))?;
        Ok(result.deleted_count)
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        self.inner
            .count_documents(filter_to_bson(filter)?)
            .await
            .map_err(|e| mongo_error(&self.name, "count", &e))
    }
}
