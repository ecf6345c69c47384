//! Append-only conversation state log.
//!
//! Each call to [`ConversationMemory::save`] appends one record
//! `{thread_id, state_data}` to the `chat_states` collection. Records are
//! never updated; a thread's history is only ever cleared as a whole.
//!
//! "Latest" means the record with the greatest `created_at`, with ties
//! going to the record inserted last. Both follow from sorting on
//! `created_at` descending, since every backend breaks sort ties by
//! identity in the sort direction.

use crate::models::{Document, DocumentId, Filter, Sort, CREATED_AT_FIELD};
use crate::storage::traits::Collection;
use crate::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

/// Field holding the conversation identifier.
pub const THREAD_ID_FIELD: &str = "thread_id";

/// Field holding the saved state.
pub const STATE_DATA_FIELD: &str = "state_data";

/// Conversation state log over one collection.
#[derive(Clone)]
pub struct ConversationMemory {
    states: Arc<dyn Collection>,
}

impl std::fmt::Debug for ConversationMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMemory")
            .field("collection", &self.states.name())
            .finish()
    }
}

impl ConversationMemory {
    /// Creates a log backed by `states`.
    #[must_use]
    pub fn new(states: Arc<dyn Collection>) -> Self {
        Self { states }
    }

    /// Appends a state record for the thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the backend cannot be reached.
    pub async fn save(&self, thread_id: &str, state: Document) -> Result<DocumentId> {
        let mut record = Document::new();
        record.insert(THREAD_ID_FIELD.to_string(), Value::String(thread_id.to_string()));
        record.insert(STATE_DATA_FIELD.to_string(), Value::Object(state));

        let id = self.states.insert_one(record).await?;
        tracing::debug!(thread_id, id = %id, "Saved conversation state");
        Ok(id)
    }

    /// Returns the most recent state for the thread, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the backend cannot be reached
    /// and [`Error::QueryFailed`] if the stored record is malformed.
    pub async fn get_latest(&self, thread_id: &str) -> Result<Option<Document>> {
        let records = self
            .states
            .find(&thread_filter(thread_id), Some(&newest_first()), Some(1))
            .await?;
        records.into_iter().next().map(decode_state).transpose()
    }

    /// Returns every state for the thread, newest first.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get_latest`].
    pub async fn get_all(&self, thread_id: &str) -> Result<Vec<Document>> {
        self.states
            .find(&thread_filter(thread_id), Some(&newest_first()), None)
            .await?
            .into_iter()
            .map(decode_state)
            .collect()
    }

    /// Removes the thread's history. Clearing an empty thread is a no-op.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the backend cannot be reached.
    pub async fn clear(&self, thread_id: &str) -> Result<u64> {
        let removed = self.states.delete_many(&thread_filter(thread_id)).await?;
        tracing::debug!(thread_id, removed, "Cleared conversation history");
        Ok(removed)
    }
}

fn thread_filter(thread_id: &str) -> Filter {
    Filter::new().eq(THREAD_ID_FIELD, thread_id)
}

fn newest_first() -> Sort {
    Sort::desc(CREATED_AT_FIELD)
}

/// Extracts `state_data`, which some stores hand back as JSON text.
fn decode_state(mut record: Document) -> Result<Document> {
    match record.remove(STATE_DATA_FIELD) {
        Some(Value::Object(state)) => Ok(state),
        Some(Value::String(text)) => serde_json::from_str(&text).map_err(|e| Error::QueryFailed {
            operation: "decode_state".to_string(),
            cause: e.to_string(),
        }),
        Some(other) => Err(Error::QueryFailed {
            operation: "decode_state".to_string(),
            cause: format!("state_data is not a mapping: {other}"),
        }),
        None => Err(Error::QueryFailed {
            operation: "decode_state".to_string(),
            cause: "record has no state_data".to_string(),
        }),
    }
}
