//! Default configuration data.
//!
//! Seeds a default bot, the two intents every bot needs and the built-in
//! channel integrations. Goes through the [`Collection`] contract, so it
//! works on every backend, and is safe to run repeatedly: a record whose key
//! already exists is left untouched.

use crate::models::{Document, Filter, document};
use crate::services::BackendSelector;
use crate::storage::schema::{BOTS, INTEGRATIONS, INTENTS};
use crate::storage::traits::Collection;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::{Value, json};

/// Name of the bot created on first run.
pub const DEFAULT_BOT: &str = "default";

/// Counts of records written by [`seed_defaults`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Records inserted.
    pub inserted: usize,
    /// Records that already existed.
    pub skipped: usize,
}

impl SeedReport {
    fn record(&mut self, inserted: bool) {
        if inserted {
            self.inserted += 1;
        } else {
            self.skipped += 1;
        }
    }
}

/// Inserts the default records that are not there yet.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if the backend cannot be reached.
pub async fn seed_defaults(selector: &BackendSelector) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    let bots = selector.get_collection(BOTS)?;
    report.record(insert_missing(bots.as_ref(), "name", default_bot()?).await?);

    let intents = selector.get_collection(INTENTS)?;
    for intent in default_intents()? {
        report.record(insert_missing(intents.as_ref(), "name", intent).await?);
    }

    let integrations = selector.get_collection(INTEGRATIONS)?;
    for integration in default_integrations()? {
        report.record(insert_missing(integrations.as_ref(), "slug", integration).await?);
    }

    tracing::info!(
        inserted = report.inserted,
        skipped = report.skipped,
        "Seeded default data"
    );
    Ok(report)
}

/// Inserts `doc` unless a record with the same `key` exists.
///
/// A concurrent seeder winning the race on a unique key counts as existing.
async fn insert_missing(collection: &dyn Collection, key: &str, doc: Document) -> Result<bool> {
    let value = doc.get(key).cloned().unwrap_or(Value::Null);
    let filter = Filter::new().eq(key, value);
    if collection.find_one(&filter, None).await?.is_some() {
        return Ok(false);
    }

    match collection.insert_one(doc).await {
        Ok(_) => Ok(true),
        Err(Error::IdentityConflict { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

fn default_bot() -> Result<Document> {
    document(json!({
        "name": DEFAULT_BOT,
        "description": "Default chatbot configuration",
        "nlu_configuration": {
            "use_llm_nlu": true,
            "use_zero_shot_nlu": true,
        },
    }))
}

fn default_intents() -> Result<Vec<Document>> {
    [
        json!({
            "name": "init_conversation",
            "training_data": ["hello", "hi", "hey", "start"],
            "responses": [
                "Hello! How can I help you today?",
                "Hi there! What can I do for you?",
            ],
        }),
        json!({
            "name": "fallback",
            "training_data": [],
            "responses": ["I'm sorry, I didn't understand that. Could you please rephrase?"],
        }),
    ]
    .into_iter()
    .map(document)
    .collect()
}

fn default_integrations() -> Result<Vec<Document>> {
    [
        json!({
            "slug": "rest_api",
            "name": "REST API",
            "description": "REST API integration for web applications",
            "status": true,
            "settings": {"enabled": true},
        }),
        json!({
            "slug": "facebook_messenger",
            "name": "Facebook Messenger",
            "description": "Facebook Messenger integration",
            "status": false,
            "settings": {"page_access_token": "", "verify_token": ""},
        }),
    ]
    .into_iter()
    .map(document)
    .collect()
}
