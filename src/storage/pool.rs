//! Connection Pool Manager for the relational backend.
//!
//! Wraps a `deadpool-postgres` pool behind an explicitly owned handle:
//!
//! - Created lazily on the first [`ConnectionPool::acquire`], warmed up to
//!   `min_size` connections, never more than `max_size` live connections.
//! - Waiters beyond `max_size` queue in arrival order (deadpool's default
//!   FIFO queue) for at most `acquire_timeout`, then fail with
//!   [`Error::StorageUnavailable`].
//! - [`PooledConnection`] returns its connection to the pool on drop, so a
//!   cancelled or failed operation can never leak it.
//! - [`ConnectionPool::close_all`] drains the pool and resets it to the
//!   uninitialized state; the next acquire builds a fresh one.

#[cfg(feature = "postgres")]
mod implementation {
    use crate::config::PoolSettings;
    use crate::storage::sql::SqlStatement;
    use crate::{Error, Result};
    use deadpool_postgres::{
        Config, ManagerConfig, Object, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime,
        Timeouts,
    };
    use secrecy::{ExposeSecret, SecretString};
    use serde::Serialize;
    use std::future::Future;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tokio_postgres::error::SqlState;
    use tokio_postgres::types::ToSql;
    use tokio_postgres::{NoTls, Row};

    const BACKEND: &str = "postgres";

    /// Maps a pool acquisition error.
    fn pool_error(operation: &str, e: &PoolError) -> Error {
        let cause = match e {
            PoolError::Timeout(_) => format!("timed out waiting for a pooled connection: {e}"),
            _ => e.to_string(),
        };
        Error::StorageUnavailable {
            backend: BACKEND,
            operation: operation.to_string(),
            cause,
        }
    }

    /// Classifies a statement error.
    ///
    /// Uniqueness violations become [`Error::IdentityConflict`]; connection
    /// loss, admin shutdown and server-side cancellation become
    /// [`Error::StorageUnavailable`]; everything else is [`Error::QueryFailed`].
    pub(crate) fn statement_error(
        collection: &str,
        operation: &str,
        e: &tokio_postgres::Error,
    ) -> Error {
        if let Some(db) = e.as_db_error() {
            let code = db.code();
            if *code == SqlState::UNIQUE_VIOLATION {
                return Error::IdentityConflict {
                    collection: collection.to_string(),
                    cause: db.message().to_string(),
                };
            }
            if code.code().starts_with("08")
                || *code == SqlState::ADMIN_SHUTDOWN
                || *code == SqlState::QUERY_CANCELED
            {
                return Error::StorageUnavailable {
                    backend: BACKEND,
                    operation: operation.to_string(),
                    cause: db.message().to_string(),
                };
            }
            return Error::QueryFailed {
                operation: format!("{operation} on '{collection}'"),
                cause: db.message().to_string(),
            };
        }

        let io_failure = std::error::Error::source(e)
            .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some());
        if e.is_closed() || io_failure {
            return Error::StorageUnavailable {
                backend: BACKEND,
                operation: operation.to_string(),
                cause: e.to_string(),
            };
        }

        Error::QueryFailed {
            operation: format!("{operation} on '{collection}'"),
            cause: e.to_string(),
        }
    }

    /// Snapshot of pool occupancy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct PoolStatus {
        /// Whether the pool has been created.
        pub initialized: bool,
        /// Configured maximum.
        pub max_size: usize,
        /// Live connections (idle and in use).
        pub size: usize,
        /// Idle connections.
        pub available: usize,
        /// Tasks waiting for a connection.
        pub waiting: usize,
    }

    /// Lazily created, bounded pool of PostgreSQL connections.
    pub struct ConnectionPool {
        url: SecretString,
        settings: PoolSettings,
        pool: Mutex<Option<Pool>>,
    }

    impl std::fmt::Debug for ConnectionPool {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ConnectionPool")
                .field("url", &"[REDACTED]")
                .field("settings", &self.settings)
                .finish_non_exhaustive()
        }
    }

    impl ConnectionPool {
        /// Creates an uninitialized pool handle. No connection is opened.
        #[must_use]
        pub fn new(url: SecretString, settings: PoolSettings) -> Self {
            Self {
                url,
                settings,
                pool: Mutex::new(None),
            }
        }

        /// Returns the pool settings.
        #[must_use]
        pub const fn settings(&self) -> &PoolSettings {
            &self.settings
        }

        /// Builds a deadpool config.
        ///
        /// The server-side `statement_timeout` mirrors the command timeout so
        /// a stalled statement is aborted even if the client stops waiting.
        fn build_pool_config(&self) -> Config {
            let mut cfg = Config::new();
            cfg.url = Some(self.url.expose_secret().to_string());
            cfg.options = Some(format!(
                "-c statement_timeout={}",
                self.settings.command_timeout().as_millis()
            ));

            let acquire = Some(self.settings.acquire_timeout());
            cfg.pool = Some(PoolConfig {
                max_size: self.settings.max_size,
                timeouts: Timeouts {
                    wait: acquire,
                    create: acquire,
                    recycle: acquire,
                },
                ..Default::default()
            });

            cfg.manager = Some(ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            });

            cfg
        }

        /// Returns the live pool, creating and warming it on first use.
        ///
        /// The pool is only stored once warm-up succeeds, so a failed
        /// creation leaves the handle uninitialized.
        async fn get_or_init(&self) -> Result<Pool> {
            let mut guard = self.pool.lock().await;
            if let Some(pool) = guard.as_ref() {
                return Ok(pool.clone());
            }

            let pool = self
                .build_pool_config()
                .create_pool(Some(Runtime::Tokio1), NoTls)
                .map_err(|e| Error::InvalidConfig(format!("cannot create connection pool: {e}")))?;

            let warmups = (0..self.settings.min_size).map(|_| pool.get());
            for result in futures::future::join_all(warmups).await {
                let conn = result.map_err(|e| pool_error("pool_init", &e))?;
                drop(conn);
            }

            tracing::info!(
                min_size = self.settings.min_size,
                max_size = self.settings.max_size,
                command_timeout_secs = self.settings.command_timeout_secs,
                "Created PostgreSQL connection pool"
            );

            *guard = Some(pool.clone());
            Ok(pool)
        }

        /// Acquires a connection, waiting up to the acquire timeout.
        ///
        /// # Errors
        ///
        /// Returns [`Error::StorageUnavailable`] if the pool cannot be created
        /// or no connection becomes available in time.
        pub async fn acquire(&self) -> Result<PooledConnection> {
            let pool = self.get_or_init().await?;
            let inner = pool.get().await.map_err(|e| pool_error("acquire", &e))?;
            Ok(PooledConnection {
                inner,
                command_timeout: self.settings.command_timeout(),
            })
        }

        /// Closes every connection and resets the pool to uninitialized.
        ///
        /// Connections currently checked out are closed when they are
        /// returned. Idempotent.
        pub async fn close_all(&self) {
            if let Some(pool) = self.pool.lock().await.take() {
                pool.close();
                tracing::info!("Closed PostgreSQL connection pool");
            }
        }

        /// Returns true once the pool has been created.
        pub async fn is_initialized(&self) -> bool {
            self.pool.lock().await.is_some()
        }

        /// Current occupancy.
        pub async fn status(&self) -> PoolStatus {
            let guard = self.pool.lock().await;
            guard.as_ref().map_or(
                PoolStatus {
                    initialized: false,
                    max_size: self.settings.max_size,
                    size: 0,
                    available: 0,
                    waiting: 0,
                },
                |pool| {
                    let status = pool.status();
                    PoolStatus {
                        initialized: true,
                        max_size: status.max_size,
                        size: status.size,
                        available: status.available,
                        waiting: status.waiting,
                    }
                },
            )
        }
    }

    /// A connection checked out of the pool.
    ///
    /// Dropping it returns the connection; every statement is bounded by the
    /// pool's command timeout.
    pub struct PooledConnection {
        inner: Object,
        command_timeout: Duration,
    }

    impl std::fmt::Debug for PooledConnection {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("PooledConnection")
                .field("command_timeout", &self.command_timeout)
                .finish_non_exhaustive()
        }
    }

    impl PooledConnection {
        async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
        where
            F: Future<Output = Result<T>>,
        {
            tokio::time::timeout(self.command_timeout, fut)
                .await
                .map_err(|_| Error::StorageUnavailable {
                    backend: BACKEND,
                    operation: operation.to_string(),
                    cause: format!(
                        "command timed out after {}s",
                        self.command_timeout.as_secs()
                    ),
                })?
        }

        /// Runs a statement and returns its rows.
        ///
        /// # Errors
        ///
        /// See [`statement_error`] for how failures are classified.
        pub async fn query(
            &self,
            collection: &str,
            operation: &str,
            stmt: &SqlStatement,
        ) -> Result<Vec<Row>> {
            self.bounded(operation, async {
                let prepared = self
                    .inner
                    .prepare_cached(&stmt.sql)
                    .await
                    .map_err(|e| statement_error(collection, operation, &e))?;
                let params: Vec<&(dyn ToSql + Sync)> =
                    stmt.params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
                self.inner
                    .query(&prepared, &params)
                    .await
                    .map_err(|e| statement_error(collection, operation, &e))
            })
            .await
        }

        /// Runs a statement and returns the affected row count.
        ///
        /// # Errors
        ///
        /// See [`statement_error`] for how failures are classified.
        pub async fn execute(
            &self,
            collection: &str,
            operation: &str,
            stmt: &SqlStatement,
        ) -> Result<u64> {
            self.bounded(operation, async {
                let prepared = self
                    .inner
                    .prepare_cached(&stmt.sql)
                    .await
                    .map_err(|e| statement_error(collection, operation, &e))?;
                let params: Vec<&(dyn ToSql + Sync)> =
                    stmt.params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
                self.inner
                    .execute(&prepared, &params)
                    .await
                    .map_err(|e| statement_error(collection, operation, &e))
            })
            .await
        }

        /// Runs a parameterless health probe.
        ///
        /// # Errors
        ///
        /// Returns [`Error::StorageUnavailable`] if the server does not answer.
        pub async fn ping(&self) -> Result<()> {
            self.bounded("ping", async {
                self.inner
                    .simple_query("SELECT 1")
                    .await
                    .map(|_| ())
                    .map_err(|e| Error::StorageUnavailable {
                        backend: BACKEND,
                        operation: "ping".to_string(),
                        cause: e.to_string(),
                    })
            })
            .await
        }

        /// The underlying client, for statements outside the translator.
        pub(crate) fn client(&self) -> &tokio_postgres::Client {
            &self.inner
        }

        /// Mutable access to the client, for transactions.
        pub(crate) fn client_mut(&mut self) -> &mut tokio_postgres::Client {
            &mut self.inner
        }
    }
}

#[cfg(feature = "postgres")]
pub use implementation::{ConnectionPool, PoolStatus, PooledConnection};
