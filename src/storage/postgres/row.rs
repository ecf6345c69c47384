//! Row decoding.

use crate::models::{Document, DocumentId, format_timestamp};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Type};

fn decode_error(column: &str, e: &tokio_postgres::Error) -> Error {
    Error::QueryFailed {
        operation: format!("decode column '{column}'"),
        cause: e.to_string(),
    }
}

fn get<'a, T>(row: &'a Row, idx: usize, column: &str) -> Result<Option<T>>
where
    T: FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| decode_error(column, &e))
}

/// Reads one column as a document value. `None` means NULL.
fn column_value(row: &Row, idx: usize, column: &str, ty: &Type) -> Result<Option<Value>> {
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx, column)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, idx, column)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx, column)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx, column)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx, column)?.map(|f| Value::from(f64::from(f))),
        Type::FLOAT8 => get::<f64>(row, idx, column)?.map(Value::from),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            get::<String>(row, idx, column)?.map(Value::String)
        },
        Type::JSON | Type::JSONB => get::<Value>(row, idx, column)?,
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx, column)?
            .map(|at| Value::String(format_timestamp(at))),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx, column)?
            .map(|at| Value::String(format_timestamp(at.and_utc()))),
        _ => {
            tracing::warn!(column, column_type = %ty, "Skipping column with unsupported type");
            None
        },
    };
    Ok(value)
}

/// Decodes a row into a document.
///
/// NULL columns are omitted, JSON columns come back as nested values and
/// timestamps in the store's RFC 3339 format.
///
/// # Errors
///
/// Returns [`Error::QueryFailed`] if a column cannot be decoded.
pub fn row_to_document(row: &Row) -> Result<Document> {
    let mut doc = Document::new();
    for (idx, column) in row.columns().iter().enumerate() {
        if let Some(value) = column_value(row, idx, column.name(), column.type_())? {
            doc.insert(column.name().to_string(), value);
        }
    }
    Ok(doc)
}

/// Reads the identity from the first column of a `RETURNING "id"` row.
///
/// # Errors
///
/// Returns [`Error::QueryFailed`] if the identity is missing or not an
/// integer or text.
pub fn row_identity(row: &Row) -> Result<DocumentId> {
    let column = row.columns().first().ok_or_else(|| Error::QueryFailed {
        operation: "insert_one".to_string(),
        cause: "statement returned no identity column".to_string(),
    })?;

    let value = column_value(row, 0, column.name(), column.type_())?;
    value
        .as_ref()
        .and_then(DocumentId::from_value)
        .ok_or_else(|| Error::QueryFailed {
            operation: "insert_one".to_string(),
            cause: format!("unexpected identity value {value:?}"),
        })
}
