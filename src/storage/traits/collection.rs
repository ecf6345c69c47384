//! Collection trait.

use crate::models::{Document, DocumentId, Filter, Projection, Sort, Update};
use crate::Result;
use async_trait::async_trait;

/// Uniform data-access contract for one named collection.
///
/// Every backend implements this trait with identical semantics, so callers
/// hold an `Arc<dyn Collection>` and never branch on the active backend.
///
/// # Ordering
///
/// Without a sort, results come back in identity order (creation order).
/// With a sort, ties are broken by identity in the sort direction. When
/// several documents match, `find_one`, `update_one` and `delete_one` act on
/// the first of them in identity order.
///
/// # Errors
///
/// All methods fail with [`crate::Error::QueryTranslation`] for invalid
/// filters or updates and with [`crate::Error::StorageUnavailable`] when the
/// backend cannot be reached. Unavailability is never swallowed here.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Inserts a document and returns its store-assigned identity.
    ///
    /// Store-managed fields (`id`, `created_at`, `updated_at`) must not be
    /// present in `doc`.
    async fn insert_one(&self, doc: Document) -> Result<DocumentId>;

    /// Returns the first matching document, if any.
    async fn find_one(
        &self,
        filter: &Filter,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>>;

    /// Returns every matching document, honouring sort and limit.
    ///
    /// A limit of `None` or `Some(0)` is unbounded.
    async fn find(
        &self,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>>;

    /// Applies `update` to the first match.
    ///
    /// Returns `false` (not an error) when nothing matched.
    async fn update_one(&self, filter: &Filter, update: &Update) -> Result<bool>;

    /// Removes the first match.
    ///
    /// Returns `false` (not an error) when nothing matched.
    async fn delete_one(&self, filter: &Filter) -> Result<bool>;

    /// Removes every match and returns how many were removed.
    async fn delete_many(&self, filter: &Filter) -> Result<u64>;

    /// Counts the matches.
    async fn count(&self, filter: &Filter) -> Result<u64>;
}
