//! Relational emulation of the collection contract over PostgreSQL.
//!
//! Each collection maps to one table. Filters, updates, sorts and limits are
//! translated by [`crate::storage::sql`]; nested documents and lists are
//! stored in JSON columns and come back as the same values.

mod bind;
mod row;

pub use row::{row_identity, row_to_document};

use crate::models::{Document, DocumentId, Filter, Projection, Sort, Update, validate_identifier};
use crate::storage::pool::ConnectionPool;
use crate::storage::sql;
use crate::storage::traits::Collection;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A table-backed collection.
///
/// Holds a shared handle to the pool; each operation checks out one
/// connection for a single statement and returns it when done.
#[derive(Debug, Clone)]
pub struct PostgresCollection {
    name: String,
    pool: Arc<ConnectionPool>,
}

impl PostgresCollection {
    /// Creates a collection over `table`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] if the table name is unsafe.
    pub fn new(table: impl Into<String>, pool: Arc<ConnectionPool>) -> Result<Self> {
        let name = table.into();
        validate_identifier(&name)?;
        Ok(Self { name, pool })
    }

    async fn fetch(&self, operation: &str, stmt: &sql::SqlStatement) -> Result<Vec<Document>> {
        let conn = self.pool.acquire().await?;
        let rows = conn.query(&self.name, operation, stmt).await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn execute(&self, operation: &str, stmt: &sql::SqlStatement) -> Result<u64> {
        let conn = self.pool.acquire().await?;
        conn.execute(&self.name, operation, stmt).await
    }
}

#[async_trait]
impl Collection for PostgresCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, doc: Document) -> Result<DocumentId> {
        let stmt = sql::build_insert(&self.name, &doc)?;
        let conn = self.pool.acquire().await?;
        let rows = conn.query(&self.name, "insert_one", &stmt).await?;
        let row = rows.first().ok_or_else(|| Error::QueryFailed {
            operation: format!("insert_one on '{}'", self.name),
            cause: "insert returned no row".to_string(),
        })?;
        let id = row_identity(row)?;
        tracing::debug!(collection = %self.name, id = %id, "Inserted document");
        Ok(id)
    }

    async fn find_one(
        &self,
        filter: &Filter,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>> {
        let stmt = sql::build_select(&self.name, filter, projection, None, Some(1))?;
        Ok(self.fetch("find_one", &stmt).await?.into_iter().next())
    }

    async fn find(
        &self,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        let stmt = sql::build_select(&self.name, filter, None, sort, limit)?;
        self.fetch("find", &stmt).await
    }

    async fn update_one(&self, filter: &Filter, update: &Update) -> Result<bool> {
        let stmt = sql::build_update_one(&self.name, filter, update)?;
        Ok(self.execute("update_one", &stmt).await? > 0)
    }

    async fn delete_one(&self, filter: &Filter) -> Result<bool> {
        let stmt = sql::build_delete_one(&self.name, filter)?;
        Ok(self.execute("delete_one", &stmt).await? > 0)
    }

    async fn delete_many(&self, filter: &Filter) -> Result<u64> {
        let stmt = sql::build_delete_many(&self.name, filter)?;
        self.execute("delete_many", &stmt).await
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        let stmt = sql::build_count(&self.name, filter)?;
        let conn = self.pool.acquire().await?;
        let rows = conn.query(&self.name, "count", &stmt).await?;
        let count: i64 = rows
            .first()
            .map(|row| row.try_get(0))
            .transpose()
            .map_err(|e| Error::QueryFailed {
                operation: format!("count on '{}'", self.name),
                cause: e.to_string(),
            })?
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
