//! Document-store backends.
//!
//! [`InMemoryEngine`] is always available; the MongoDB backend requires the
//! `mongodb` feature.

mod memory;
#[cfg(feature = "mongodb")]
mod mongo;

pub use memory::{InMemoryCollection, InMemoryEngine};
#[cfg(feature = "mongodb")]
pub use mongo::{MongoCollection, MongoStore};
