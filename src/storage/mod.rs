//! Storage layer abstraction.
//!
//! Every backend implements the [`Collection`] contract:
//! - **Relational emulation**: PostgreSQL tables driven by the query
//!   translator in [`sql`], over the [`pool`] (feature `postgres`)
//! - **Native document**: MongoDB (feature `mongodb`)
//! - **In-memory**: volatile engine used as the document fallback

// Allow significant_drop_tightening - dropping pooled connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]
// Allow cast_possible_truncation for row counts (usize -> u64 never truncates on supported targets).
#![allow(clippy::cast_possible_truncation)]

pub mod document;
pub mod migrations;
pub mod pool;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod schema;
pub mod sql;
pub mod traits;

pub use document::{InMemoryCollection, InMemoryEngine};
#[cfg(feature = "mongodb")]
pub use document::{MongoCollection, MongoStore};
#[cfg(feature = "postgres")]
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
#[cfg(feature = "postgres")]
pub use postgres::PostgresCollection;
pub use traits::Collection;
