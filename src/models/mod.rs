//! Data models for botstore.
//!
//! Documents, identities, and the typed query algebra shared by every backend.

mod document;
mod query;

pub use document::{
    CREATED_AT_FIELD, Document, DocumentId, IDENTITY_ALIAS, IDENTITY_FIELD, UPDATED_AT_FIELD,
    compare_values, document, format_timestamp, is_container, is_store_managed, kind_name,
    strip_nulls, timestamp_now, validate_identifier, validate_insert, values_equal,
};
pub use query::{Equality, FieldRef, Filter, Projection, Sort, SortDirection, Update};
