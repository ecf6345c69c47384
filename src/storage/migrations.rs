//! PostgreSQL migration system for schema management.
//!
//! Migrations are embedded at compile time and applied in version order.
//! Applied versions are recorded in `<scope>_schema_migrations`, so running
//! the same set twice is a no-op.
//!
//! # Usage
//!
//! ```rust,ignore
//! use botstore::storage::migrations::{Migration, MigrationRunner};
//!
//! const MIGRATIONS: &[Migration] = &[
//!     Migration {
//!         version: 1,
//!         description: "Initial table",
//!         sql: "CREATE TABLE IF NOT EXISTS bots (id SERIAL PRIMARY KEY);",
//!     },
//! ];
//!
//! let runner = MigrationRunner::new(pool, "botstore");
//! runner.run(MIGRATIONS).await?;
//! ```

/// A single migration with version and SQL.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Migration version (sequential, starting at 1).
    pub version: i32,
    /// Human-readable description.
    pub description: &'static str,
    /// SQL to apply (may contain multiple statements separated by semicolons).
    pub sql: &'static str,
}

/// Maximum version across a set of migrations.
#[must_use]
pub fn max_version(migrations: &[Migration]) -> i32 {
    migrations.iter().map(|m| m.version).max().unwrap_or(0)
}

#[cfg(feature = "postgres")]
mod implementation {
    use super::Migration;
    use crate::models::validate_identifier;
    use crate::storage::pool::{ConnectionPool, PooledConnection};
    use crate::{Error, Result};
    use std::sync::Arc;

    fn migration_error(operation: impl Into<String>, e: &tokio_postgres::Error) -> Error {
        Error::OperationFailed {
            operation: operation.into(),
            cause: e.to_string(),
        }
    }

    /// Runs migrations through the connection pool.
    pub struct MigrationRunner {
        pool: Arc<ConnectionPool>,
        scope: String,
    }

    impl MigrationRunner {
        /// Creates a new migration runner.
        ///
        /// # Errors
        ///
        /// Returns [`Error::QueryTranslation`] if `scope` is not a safe
        /// identifier.
        pub fn new(pool: Arc<ConnectionPool>, scope: impl Into<String>) -> Result<Self> {
            let scope = scope.into();
            validate_identifier(&format!("{scope}_schema_migrations"))?;
            Ok(Self { pool, scope })
        }

        /// Runs all pending migrations and returns the resulting version.
        ///
        /// # Errors
        ///
        /// Returns [`Error::StorageUnavailable`] if no connection can be
        /// acquired, or [`Error::OperationFailed`] if a migration fails.
        pub async fn run(&self, migrations: &[Migration]) -> Result<i32> {
            let mut conn = self.pool.acquire().await?;

            self.ensure_migrations_table(&conn).await?;
            let mut version = self.get_current_version(&conn).await?;

            for migration in migrations {
                if migration.version > version {
                    self.apply_migration(&mut conn, migration).await?;
                    version = migration.version;
                }
            }

            Ok(version)
        }

        /// Returns the current schema version, 0 if nothing was applied yet.
        ///
        /// # Errors
        ///
        /// Returns an error if the database cannot be queried.
        pub async fn current_version(&self) -> Result<i32> {
            let conn = self.pool.acquire().await?;

            let exists: bool = conn
                .client()
                .query_one(
                    "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = $1)",
                    &[&self.migrations_table_name()],
                )
                .await
                .map(|row| row.get(0))
                .map_err(|e| migration_error("migration_table_exists", &e))?;

            if !exists {
                return Ok(0);
            }

            self.get_current_version(&conn).await
        }

        fn migrations_table_name(&self) -> String {
            format!("{}_schema_migrations", self.scope)
        }

        async fn ensure_migrations_table(&self, conn: &PooledConnection) -> Result<()> {
            let migrations_table = self.migrations_table_name();
            let sql = format!(
                r"
                CREATE TABLE IF NOT EXISTS {migrations_table} (
                    version INTEGER PRIMARY KEY,
                    description TEXT NOT NULL,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "
            );

            conn.client()
                .batch_execute(&sql)
                .await
                .map_err(|e| migration_error("create_migrations_table", &e))
        }

        async fn get_current_version(&self, conn: &PooledConnection) -> Result<i32> {
            let migrations_table = self.migrations_table_name();
            let sql = format!("SELECT COALESCE(MAX(version), 0) FROM {migrations_table}");

            conn.client()
                .query_one(&sql, &[])
                .await
                .map(|row| row.get(0))
                .map_err(|e| migration_error("migration_current_version", &e))
        }

        /// Applies one migration and records it in a single transaction.
        async fn apply_migration(
            &self,
            conn: &mut PooledConnection,
            migration: &Migration,
        ) -> Result<()> {
            let migrations_table = self.migrations_table_name();
            let tx = conn
                .client_mut()
                .transaction()
                .await
                .map_err(|e| migration_error(format!("migration_v{}_begin", migration.version), &e))?;

            tx.batch_execute(migration.sql).await.map_err(|e| {
                migration_error(
                    format!("migration_v{}: {}", migration.version, migration.description),
                    &e,
                )
            })?;

            let record_sql =
                format!("INSERT INTO {migrations_table} (version, description) VALUES ($1, $2)");
            tx.execute(&record_sql, &[&migration.version, &migration.description])
                .await
                .map_err(|e| migration_error("record_migration", &e))?;

            tx.commit().await.map_err(|e| {
                migration_error(format!("migration_v{}_commit", migration.version), &e)
            })?;

            tracing::info!(
                version = migration.version,
                description = migration.description,
                scope = %self.scope,
                "Applied migration"
            );

            Ok(())
        }
    }
}

#[cfg(feature = "postgres")]
pub use implementation::MigrationRunner;
