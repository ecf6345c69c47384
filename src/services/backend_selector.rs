//! Backend selection and lifecycle.
//!
//! The selector reads the configured backend once at startup and hands out
//! [`Collection`] handles for it.
//!
//! # Architecture
//!
//! ```text
//! BackendSelector
//!   ├── Relational(Arc<ConnectionPool>)  → PostgresCollection
//!   ├── Document(MongoStore)             → MongoCollection
//!   └── Memory(InMemoryEngine)           → InMemoryCollection
//! ```
//!
//! # Graceful Degradation
//!
//! When the document server cannot be reached at startup the selector
//! substitutes the volatile in-memory engine and reports itself degraded.
//! The substitution lasts for the lifetime of the process. The relational
//! backend never degrades: its pool connects lazily and connectivity errors
//! surface to callers as [`Error::StorageUnavailable`](crate::Error).

use crate::config::{BackendChoice, StoreConfig};
use crate::services::ConversationMemory;
use crate::storage::schema::CHAT_STATES;
use crate::storage::traits::Collection;
use crate::storage::InMemoryEngine;
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "mongodb")]
use crate::storage::MongoStore;
#[cfg(feature = "postgres")]
use crate::storage::migrations::MigrationRunner;
#[cfg(feature = "postgres")]
use crate::storage::schema::MIGRATIONS;
#[cfg(feature = "postgres")]
use crate::storage::{ConnectionPool, PoolStatus, PostgresCollection};

/// Scope under which relational migrations are recorded.
pub const MIGRATION_SCOPE: &str = "botstore";

/// Which backend is serving collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StoreMode {
    /// PostgreSQL with document emulation.
    Relational,
    /// Native document server.
    Document,
    /// Volatile engine requested explicitly (tests, tooling).
    InMemory,
    /// Volatile engine substituted for an unreachable document server.
    InMemoryFallback {
        /// Why the document server was not used.
        reason: String,
    },
}

impl StoreMode {
    /// Short backend label used in logs and reports.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Relational => "postgres",
            Self::Document => "mongodb",
            Self::InMemory | Self::InMemoryFallback { .. } => "memory",
        }
    }

    /// Returns true if data written now will not survive a restart
    /// because the configured durable backend was unavailable.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::InMemoryFallback { .. })
    }
}

/// Synchronous snapshot of the selector's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    /// Active backend label.
    pub backend: &'static str,
    /// True when running on the fallback engine.
    pub degraded: bool,
    /// Why the selector degraded, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of a live probe against the active backend.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Active backend label.
    pub backend: &'static str,
    /// True when running on the fallback engine.
    pub degraded: bool,
    /// Why the selector degraded, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Whether the probe succeeded.
    pub reachable: bool,
    /// Round-trip time of the probe.
    pub latency_ms: u64,
    /// Probe error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Pool statistics (relational only).
    #[cfg(feature = "postgres")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStatus>,
}

enum Backend {
    #[cfg(feature = "postgres")]
    Relational(Arc<ConnectionPool>),
    #[cfg(feature = "mongodb")]
    Document(MongoStore),
    Memory(InMemoryEngine),
}

/// Owns the active backend and hands out collections.
pub struct BackendSelector {
    backend: Backend,
    mode: StoreMode,
}

impl std::fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSelector")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl BackendSelector {
    /// Selects and initializes the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration does not
    /// validate and [`Error::FeatureNotEnabled`] if the selected backend was
    /// compiled out. An unreachable document server is not an error.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let selector = match config.backend {
            BackendChoice::Relational => Self::relational(config)?,
            BackendChoice::Document => Self::document(config).await?,
        };

        match &selector.mode {
            StoreMode::InMemoryFallback { reason } => tracing::warn!(
                backend = selector.mode.backend(),
                reason = %reason,
                "Document server unreachable, using volatile in-memory storage"
            ),
            mode => tracing::info!(backend = mode.backend(), "Storage backend selected"),
        }
        Ok(selector)
    }

    /// A selector over a fresh in-memory engine.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(InMemoryEngine::new()),
            mode: StoreMode::InMemory,
        }
    }

    #[cfg(feature = "postgres")]
    fn relational(config: &StoreConfig) -> Result<Self> {
        let url = config.relational.database_url.clone().ok_or_else(|| {
            Error::InvalidConfig("relational backend requires a database URL".to_string())
        })?;
        let pool = ConnectionPool::new(url, config.relational.pool);
        Ok(Self {
            backend: Backend::Relational(Arc::new(pool)),
            mode: StoreMode::Relational,
        })
    }

    #[cfg(not(feature = "postgres"))]
    fn relational(_config: &StoreConfig) -> Result<Self> {
        Err(Error::FeatureNotEnabled("postgres".to_string()))
    }

    #[cfg(feature = "mongodb")]
    async fn document(config: &StoreConfig) -> Result<Self> {
        let settings = &config.document;
        match MongoStore::connect(
            &settings.uri,
            &settings.database,
            settings.server_selection_timeout(),
        )
        .await
        {
            Ok(store) => Ok(Self {
                backend: Backend::Document(store),
                mode: StoreMode::Document,
            }),
            Err(e) => Ok(Self {
                backend: Backend::Memory(InMemoryEngine::new()),
                mode: StoreMode::InMemoryFallback {
                    reason: e.to_string(),
                },
            }),
        }
    }

    #[cfg(not(feature = "mongodb"))]
    #[allow(clippy::unused_async)]
    async fn document(_config: &StoreConfig) -> Result<Self> {
        Err(Error::FeatureNotEnabled("mongodb".to_string()))
    }

    /// The active mode.
    #[must_use]
    pub const fn mode(&self) -> &StoreMode {
        &self.mode
    }

    /// Returns the named collection on the active backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] if the name is not a safe
    /// identifier.
    pub fn get_collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        let collection: Arc<dyn Collection> = match &self.backend {
            #[cfg(feature = "postgres")]
            Backend::Relational(pool) => {
                Arc::new(PostgresCollection::new(name, Arc::clone(pool))?)
            },
            #[cfg(feature = "mongodb")]
            Backend::Document(store) => Arc::new(store.collection(name)?),
            Backend::Memory(engine) => Arc::new(engine.collection(name)?),
        };
        Ok(collection)
    }

    /// The conversation memory log on the active backend.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::get_collection`].
    pub fn conversation_memory(&self) -> Result<ConversationMemory> {
        Ok(ConversationMemory::new(self.get_collection(CHAT_STATES)?))
    }

    /// Current state without touching the backend.
    #[must_use]
    pub fn health_status(&self) -> HealthStatus {
        HealthStatus {
            backend: self.mode.backend(),
            degraded: self.mode.is_degraded(),
            reason: match &self.mode {
                StoreMode::InMemoryFallback { reason } => Some(reason.clone()),
                _ => None,
            },
        }
    }

    /// Probes the active backend.
    ///
    /// Never fails; an unreachable backend is reported in the result.
    pub async fn check_health(&self) -> HealthReport {
        let status = self.health_status();
        let start = Instant::now();
        let probe = self.probe().await;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        if let Err(e) = &probe {
            tracing::warn!(backend = status.backend, error = %e, "Health probe failed");
        }

        HealthReport {
            backend: status.backend,
            degraded: status.degraded,
            reason: status.reason,
            reachable: probe.is_ok(),
            latency_ms,
            error: probe.err().map(|e| e.to_string()),
            #[cfg(feature = "postgres")]
            pool: match &self.backend {
                Backend::Relational(pool) => Some(pool.status().await),
                _ => None,
            },
        }
    }

    async fn probe(&self) -> Result<()> {
        match &self.backend {
            #[cfg(feature = "postgres")]
            Backend::Relational(pool) => pool.acquire().await?.ping().await,
            #[cfg(feature = "mongodb")]
            Backend::Document(store) => store.ping().await,
            Backend::Memory(_) => Ok(()),
        }
    }

    /// Creates the tables or indexes the collections rely on.
    ///
    /// Relational: applies pending migrations. Document: creates unique
    /// indexes. In-memory: nothing to do.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the backend cannot be reached
    /// and [`Error::QueryFailed`] if a migration is rejected.
    pub async fn ensure_schema(&self) -> Result<()> {
        match &self.backend {
            #[cfg(feature = "postgres")]
            Backend::Relational(pool) => {
                let runner = MigrationRunner::new(Arc::clone(pool), MIGRATION_SCOPE)?;
                let version = runner.run(MIGRATIONS).await?;
                tracing::info!(version, "Relational schema is current");
                Ok(())
            },
            #[cfg(feature = "mongodb")]
            Backend::Document(store) => {
                store.ensure_indexes().await?;
                tracing::info!("Document indexes ensured");
                Ok(())
            },
            Backend::Memory(_) => {
                tracing::debug!("In-memory backend needs no schema");
                Ok(())
            },
        }
    }

    /// Releases backend connections. Call once at process shutdown.
    pub async fn shutdown(&self) {
        match &self.backend {
            #[cfg(feature = "postgres")]
            Backend::Relational(pool) => pool.close_all().await,
            #[cfg(feature = "mongodb")]
            Backend::Document(store) => store.shutdown().await,
            Backend::Memory(_) => {},
        }
        tracing::info!(backend = self.mode.backend(), "Storage backend shut down");
    }
}
