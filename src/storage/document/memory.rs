//! Volatile in-memory document engine.
//!
//! Stands in for the document server when it cannot be reached at startup,
//! and backs unit tests. Data lives for the lifetime of the process only.

use crate::models::{
    CREATED_AT_FIELD, Document, DocumentId, FieldRef, Filter, IDENTITY_FIELD, Projection, Sort,
    SortDirection, UPDATED_AT_FIELD, Update, compare_values, strip_nulls, timestamp_now,
    validate_identifier, validate_insert, values_equal,
};
use crate::storage::schema::unique_fields;
use crate::storage::traits::Collection;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// A stored document plus its insertion sequence number.
#[derive(Debug, Clone)]
struct StoredDocument {
    seq: u64,
    doc: Document,
}

#[derive(Debug, Default)]
struct Table {
    next_seq: u64,
    rows: Vec<StoredDocument>,
}

/// Shared state behind every collection handle of one engine.
///
/// Uses `RwLock` for thread-safe access with reader-writer semantics. The
/// lock is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl InMemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the named collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] if the name is unsafe.
    pub fn collection(&self, name: &str) -> Result<InMemoryCollection> {
        validate_identifier(name)?;
        Ok(InMemoryCollection {
            name: name.to_string(),
            engine: self.clone(),
        })
    }

    /// Total number of documents across all collections.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.tables
            .read()
            .map(|t| t.values().map(|table| table.rows.len()).sum())
            .unwrap_or(0)
    }
}

fn lock_error(operation: &str) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: "in-memory store lock poisoned".to_string(),
    }
}

fn matches(doc: &Document, filter: &Filter) -> bool {
    filter.constraints().iter().all(|constraint| {
        let actual = doc.get(constraint.field.name()).unwrap_or(&Value::Null);
        values_equal(actual, &constraint.value)
    })
}

/// Orders by `sort`, then by insertion sequence in the same direction.
fn order(a: &StoredDocument, b: &StoredDocument, sort: Option<&Sort>) -> Ordering {
    let Some(sort) = sort else {
        return a.seq.cmp(&b.seq);
    };
    let ordering = match &sort.field {
        FieldRef::Identity => a.seq.cmp(&b.seq),
        FieldRef::Named(field) => {
            compare_values(a.doc.get(field), b.doc.get(field)).then(a.seq.cmp(&b.seq))
        },
    };
    match sort.direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

/// A named collection inside an [`InMemoryEngine`].
#[derive(Debug, Clone)]
pub struct InMemoryCollection {
    name: String,
    engine: InMemoryEngine,
}

impl InMemoryCollection {
    /// Rejects a write that would duplicate a unique field.
    fn check_unique(
        &self,
        table: &Table,
        candidate: &Document,
        skip_seq: Option<u64>,
    ) -> Result<()> {
        for field in unique_fields(&self.name) {
            let Some(value) = candidate.get(*field).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = table
                .rows
                .iter()
                .filter(|row| Some(row.seq) != skip_seq)
                .any(|row| row.doc.get(*field).is_some_and(|v| values_equal(v, value)));
            if clash {
                return Err(Error::IdentityConflict {
                    collection: self.name.clone(),
                    cause: format!("duplicate value for unique field '{field}'"),
                });
            }
        }
        Ok(())
    }

    /// Index of the first match in identity order.
    fn first_match(table: &Table, filter: &Filter) -> Option<usize> {
        table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| matches(&row.doc, filter))
            .min_by_key(|(_, row)| row.seq)
            .map(|(idx, _)| idx)
    }
}

#[async_trait]
impl Collection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, doc: Document) -> Result<DocumentId> {
        validate_insert(&doc)?;

        let id = Uuid::now_v7().simple().to_string();
        let now = timestamp_now();
        let mut stored = Document::new();
        stored.insert(IDENTITY_FIELD.to_string(), Value::String(id.clone()));
        stored.extend(doc);
        stored.insert(CREATED_AT_FIELD.to_string(), Value::String(now.clone()));
        stored.insert(UPDATED_AT_FIELD.to_string(), Value::String(now));
        let stored = strip_nulls(stored);

        let mut tables = self
            .engine
            .tables
            .write()
            .map_err(|_| lock_error("insert_one"))?;
        let table = tables.entry(self.name.clone()).or_default();
        self.check_unique(table, &stored, None)?;

        let seq = table.next_seq;
        table.next_seq += 1;
        table.rows.push(StoredDocument { seq, doc: stored });
        drop(tables);

        tracing::debug!(collection = %self.name, id = %id, "Inserted document");
        Ok(DocumentId::Text(id))
    }

    async fn find_one(
        &self,
        filter: &Filter,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>> {
        filter.validate()?;
        let tables = self.engine.tables.read().map_err(|_| lock_error("find_one"))?;
        let Some(table) = tables.get(&self.name) else {
            return Ok(None);
        };

        let found = Self::first_match(table, filter).map(|idx| table.rows[idx].doc.clone());
        Ok(match projection {
            Some(projection) => found.map(|doc| projection.apply(doc)),
            None => found,
        })
    }

    async fn find(
        &self,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        filter.validate()?;
        let tables = self.engine.tables.read().map_err(|_| lock_error("find"))?;
        let Some(table) = tables.get(&self.name) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<&StoredDocument> = table
            .rows
            .iter()
            .filter(|row| matches(&row.doc, filter))
            .collect();
        matched.sort_by(|a, b| order(a, b, sort));

        let take = match limit {
            Some(n) if n > 0 => n,
            _ => usize::MAX,
        };
        Ok(matched.into_iter().take(take).map(|row| row.doc.clone()).collect())
    }

    async fn update_one(&self, filter: &Filter, update: &Update) -> Result<bool> {
        filter.validate()?;
        update.validate()?;

        let mut tables = self
            .engine
            .tables
            .write()
            .map_err(|_| lock_error("update_one"))?;
        let Some(table) = tables.get_mut(&self.name) else {
            return Ok(false);
        };
        let Some(idx) = Self::first_match(table, filter) else {
            return Ok(false);
        };

        let mut updated = table.rows[idx].doc.clone();
        for (field, value) in update.fields() {
            updated.insert(field.clone(), value.clone());
        }
        updated.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(timestamp_now()),
        );
        let updated = strip_nulls(updated);

        self.check_unique(table, &updated, Some(table.rows[idx].seq))?;
        table.rows[idx].doc = updated;
        Ok(true)
    }

    async fn delete_one(&self, filter: &Filter) -> Result<bool> {
        filter.validate()?;
        let mut tables = self
            .engine
            .tables
            .write()
            .map_err(|_| lock_error("delete_one"))?;
        let Some(table) = tables.get_mut(&self.name) else {
            return Ok(false);
        };
        let Some(idx) = Self::first_match(table, filter) else {
            return Ok(false);
        };
        table.rows.remove(idx);
        Ok(true)
    }

    async fn delete_many(&self, filter: &Filter) -> Result<u64> {
        filter.validate()?;
        let mut tables = self
            .engine
            .tables
            .write()
            .map_err(|_| lock_error("delete_many"))?;
        let Some(table) = tables.get_mut(&self.name) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table.rows.retain(|row| !matches(&row.doc, filter));
        Ok((before - table.rows.len()) as u64)
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        filter.validate()?;
        let tables = self.engine.tables.read().map_err(|_| lock_error("count"))?;
        Ok(tables.get(&self.name).map_or(0, |table| {
            table.rows.iter().filter(|row| matches(&row.doc, filter)).count() as u64
        }))
    }
}
