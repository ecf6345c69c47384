//! # Botstore
//!
//! Backend-agnostic document persistence for conversational applications.
//!
//! Botstore stores bot configuration, intents, entities and conversation
//! state behind one collection contract, whichever physical database backs it.
//!
//! ## Features
//!
//! - Uniform async [`Collection`] API (insert/find/find-one/update/delete)
//! - Native document backend (MongoDB) with an in-memory fallback when the
//!   server is unreachable at startup
//! - Relational emulation over PostgreSQL: typed filters and updates are
//!   translated into parameterized SQL, connections come from a bounded pool
//! - Append-only [`ConversationMemory`] log per conversation thread
//!
//! ## Example
//!
//! ```rust,ignore
//! use botstore::{BackendSelector, Filter, StoreConfig};
//! use serde_json::json;
//!
//! let config = StoreConfig::load(None)?;
//! let selector = BackendSelector::connect(&config).await?;
//!
//! let bots = selector.get_collection("bots")?;
//! let id = bots.insert_one(botstore::document(json!({"name": "default"}))?).await?;
//! let bot = bots.find_one(&Filter::by_id(id), None).await?;
//!
//! let memory = selector.conversation_memory()?;
//! memory.save("t1", botstore::document(json!({"step": 1}))?).await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
// Current duplicates come from the mongodb driver's transitive tree.
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{BackendChoice, PoolSettings, StoreConfig};
pub use models::{
    Document, DocumentId, FieldRef, Filter, Projection, Sort, SortDirection, Update, document,
};
pub use services::{BackendSelector, ConversationMemory, HealthReport, HealthStatus, StoreMode};
pub use storage::Collection;

/// Error type for botstore operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `QueryTranslation` | Malformed filter, update, sort, projection or identifier |
/// | `StorageUnavailable` | Connection refused, pool exhausted past its wait, command timeout |
/// | `IdentityConflict` | A uniqueness constraint rejects an insert or update |
/// | `QueryFailed` | The backend rejected a statement for a non-connectivity reason |
/// | `InvalidConfig` | Startup configuration is missing or inconsistent |
/// | `FeatureNotEnabled` | The selected backend was compiled out |
/// | `OperationFailed` | Local failures (config file I/O, poisoned in-memory lock) |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A filter, update, sort or projection could not be translated.
    ///
    /// Raised when:
    /// - The raw input is not a mapping
    /// - A filter value is a container (nested document or list)
    /// - An update nests operators beyond a single `$set`
    /// - A field or collection name is not a safe identifier
    /// - A store-managed field (`id`, `created_at`, `updated_at`) is written
    ///
    /// Never retried.
    #[error("query translation failed: {0}")]
    QueryTranslation(String),

    /// The active backend could not be reached.
    ///
    /// Raised when:
    /// - A pooled connection cannot be established or acquired in time
    /// - A statement exceeds the configured command timeout
    /// - The document server cannot be selected
    ///
    /// Not retried by this layer; callers decide whether to degrade.
    #[error("storage unavailable ({backend}) during '{operation}': {cause}")]
    StorageUnavailable {
        /// Backend that failed (`postgres`, `mongodb`, `memory`).
        backend: &'static str,
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A uniqueness constraint was violated.
    #[error("identity conflict in '{collection}': {cause}")]
    IdentityConflict {
        /// Collection that rejected the write.
        collection: String,
        /// The underlying cause.
        cause: String,
    },

    /// The backend rejected a statement.
    ///
    /// Raised when:
    /// - A filter or projection names a column the table does not have
    /// - A bound value cannot be encoded for the column type
    /// - A stored record has an unexpected shape
    #[error("query '{operation}' failed: {cause}")]
    QueryFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Configuration is invalid. Fatal at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),

    /// A local operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns true if the error means the backend could not be reached.
    ///
    /// Health checks use this to report a degraded status instead of failing.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}

/// Result type alias for botstore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Uses `SystemTime::now()` with fallback to 0 if the system clock is before
/// the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use botstore::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
