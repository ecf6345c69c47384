//! Business logic services.
//!
//! Services sit on top of the storage backends: the selector picks and owns
//! one, the memory log and seeding go through its collections.

mod backend_selector;
mod conversation_memory;
pub mod seed;

pub use backend_selector::{
    BackendSelector, HealthReport, HealthStatus, MIGRATION_SCOPE, StoreMode,
};
pub use conversation_memory::{ConversationMemory, STATE_DATA_FIELD, THREAD_ID_FIELD};
pub use seed::{SeedReport, seed_defaults};
