//! Known collections and the relational schema that backs them.
//!
//! Every table carries a serial `id` plus `created_at` / `updated_at`
//! timestamps next to its entity columns. Nested documents and lists live in
//! JSON columns, which keep the text as written so key order survives the
//! round trip. The document backends have no fixed columns, but they honour
//! the same unique fields.

use super::migrations::Migration;

/// Bot configurations.
pub const BOTS: &str = "bots";
/// Intent definitions.
pub const INTENTS: &str = "intents";
/// Entity definitions.
pub const ENTITIES: &str = "entities";
/// Channel integrations.
pub const INTEGRATIONS: &str = "integrations";
/// Conversation state snapshots.
pub const CHAT_STATES: &str = "chat_states";
/// Conversation transcripts.
pub const CHAT_LOGS: &str = "chat_logs";

/// Static description of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSchema {
    /// Collection (table) name.
    pub name: &'static str,
    /// Fields that must be unique across the collection.
    pub unique_fields: &'static [&'static str],
}

/// Every collection the application uses.
pub const COLLECTIONS: &[CollectionSchema] = &[
    CollectionSchema {
        name: BOTS,
        unique_fields: &["name"],
    },
    CollectionSchema {
        name: INTENTS,
        unique_fields: &[],
    },
    CollectionSchema {
        name: ENTITIES,
        unique_fields: &[],
    },
    CollectionSchema {
        name: INTEGRATIONS,
        unique_fields: &["slug"],
    },
    CollectionSchema {
        name: CHAT_STATES,
        unique_fields: &[],
    },
    CollectionSchema {
        name: CHAT_LOGS,
        unique_fields: &[],
    },
];

/// Looks up a known collection.
#[must_use]
pub fn schema_for(name: &str) -> Option<&'static CollectionSchema> {
    COLLECTIONS.iter().find(|schema| schema.name == name)
}

/// Unique fields of a collection; empty for unknown collections.
#[must_use]
pub fn unique_fields(name: &str) -> &'static [&'static str] {
    schema_for(name).map_or(&[], |schema| schema.unique_fields)
}

/// Relational schema, applied in order by the migration runner.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Configuration tables",
        sql: r"
            CREATE TABLE IF NOT EXISTS bots (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) UNIQUE NOT NULL,
                description TEXT,
                nlu_configuration JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS intents (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                training_data JSONB,
                responses JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS entities (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                entity_type VARCHAR(100),
                training_data JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS integrations (
                id SERIAL PRIMARY KEY,
                slug VARCHAR(255) UNIQUE NOT NULL,
                name VARCHAR(255) NOT NULL,
                description TEXT,
                status BOOLEAN NOT NULL DEFAULT FALSE,
                settings JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_intents_name ON intents (name);
            CREATE INDEX IF NOT EXISTS idx_entities_name ON entities (name);
        ",
    },
    Migration {
        version: 2,
        description: "Conversation tables",
        sql: r"
            CREATE TABLE IF NOT EXISTS chat_states (
                id SERIAL PRIMARY KEY,
                thread_id VARCHAR(255) NOT NULL,
                state_data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_chat_states_thread ON chat_states (thread_id, created_at DESC);
            CREATE TABLE IF NOT EXISTS chat_logs (
                id SERIAL PRIMARY KEY,
                thread_id VARCHAR(255) NOT NULL,
                user_message TEXT,
                bot_message TEXT,
                nlu_data JSONB,
                context JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_chat_logs_thread ON chat_logs (thread_id, created_at DESC);
        ",
    },
    Migration {
        version: 3,
        description: "Store containers as written",
        sql: r"
            ALTER TABLE bots ALTER COLUMN nlu_configuration TYPE JSON USING nlu_configuration::json;
            ALTER TABLE intents ALTER COLUMN training_data TYPE JSON USING training_data::json;
            ALTER TABLE intents ALTER COLUMN responses TYPE JSON USING responses::json;
            ALTER TABLE entities ALTER COLUMN training_data TYPE JSON USING training_data::json;
            ALTER TABLE integrations ALTER COLUMN settings TYPE JSON USING settings::json;
            ALTER TABLE chat_states ALTER COLUMN state_data TYPE JSON USING state_data::json;
            ALTER TABLE chat_logs ALTER COLUMN nlu_data TYPE JSON USING nlu_data::json;
            ALTER TABLE chat_logs ALTER COLUMN context TYPE JSON USING context::json;
        ",
    },
];
