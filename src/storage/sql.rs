//! Query translation for the relational emulation.
//!
//! Turns typed [`Filter`], [`Update`], [`Sort`] and [`Projection`] values into
//! parameterized PostgreSQL statements. Placeholders use the engine's
//! positional convention (`$1`, `$2`, ...). When a filter and an update share
//! one statement, the filter is numbered first and the SET clause continues
//! where it stopped.
//!
//! Identifiers are validated and double-quoted; values only ever travel as
//! bind parameters. Container values (nested documents, lists) are serialized
//! to JSON text before they are added to the bind list.
//!
//! ```rust
//! use botstore::Filter;
//! use botstore::storage::sql::build_where_clause;
//!
//! let filter = Filter::new().eq("name", "default").eq("_id", 3);
//! let fragment = build_where_clause(&filter, 1).unwrap();
//! assert_eq!(fragment.clause, r#"WHERE "name" = $1 AND "id" = $2"#);
//! assert_eq!(fragment.next_param, 3);
//! ```

use crate::models::{
    Document, Filter, IDENTITY_FIELD, Projection, Sort, UPDATED_AT_FIELD, Update,
    validate_identifier, validate_insert,
};
use crate::Result;
use serde_json::Value;

/// A value bound to a positional parameter.
///
/// Encoding to the wire format happens at execution time, against the
/// parameter type the server inferred for the placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Text.
    Text(String),
    /// A serialized nested document or list.
    Json(String),
}

impl BindValue {
    /// Converts a document value, serializing containers.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::Json(value.to_string()),
        }
    }
}

/// A clause plus the parameters it consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    /// SQL text, empty when the clause is omitted.
    pub clause: String,
    /// Bind values for the placeholders in `clause`, in order.
    pub params: Vec<BindValue>,
    /// The next unused placeholder number.
    pub next_param: usize,
}

/// A complete statement ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    /// SQL text.
    pub sql: String,
    /// Bind values, `params[i]` belongs to `$(i + 1)`.
    pub params: Vec<BindValue>,
}

/// Validates and double-quotes an identifier.
///
/// # Errors
///
/// Returns [`crate::Error::QueryTranslation`] for unsafe names.
pub fn quote_identifier(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{name}\""))
}

/// Builds a WHERE clause with numbered parameters.
///
/// An empty filter yields an empty clause (all rows). Equality with null
/// becomes `IS NULL` and consumes no parameter, as does an identity that can
/// never be a serial (it becomes `FALSE`).
///
/// # Arguments
///
/// * `filter` - The filter to translate
/// * `start_param` - The first placeholder number to use
///
/// # Errors
///
/// Returns [`crate::Error::QueryTranslation`] if the filter is invalid.
pub fn build_where_clause(filter: &Filter, start_param: usize) -> Result<SqlFragment> {
    filter.validate()?;

    let mut conditions = Vec::with_capacity(filter.constraints().len());
    let mut params = Vec::new();
    let mut param_idx = start_param;

    for constraint in filter.constraints() {
        let column = quote_identifier(constraint.field.name())?;
        if constraint.value.is_null() {
            conditions.push(format!("{column} IS NULL"));
            continue;
        }
        if constraint.field.is_identity() && !is_serial_compatible(&constraint.value) {
            conditions.push("FALSE".to_string());
            continue;
        }
        conditions.push(format!("{column} = ${param_idx}"));
        params.push(BindValue::from_value(&constraint.value));
        param_idx += 1;
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    Ok(SqlFragment {
        clause,
        params,
        next_param: param_idx,
    })
}

/// Identity columns are serial; text only matches when it spells an integer.
fn is_serial_compatible(value: &Value) -> bool {
    match value {
        Value::String(s) => s.parse::<i64>().is_ok(),
        _ => true,
    }
}

/// Builds a SET clause with numbered parameters.
///
/// `updated_at` is always refreshed.
///
/// # Errors
///
/// Returns [`crate::Error::QueryTranslation`] if the update is invalid.
pub fn build_set_clause(update: &Update, start_param: usize) -> Result<SqlFragment> {
    update.validate()?;

    let fields = update.fields();
    let mut assignments = Vec::with_capacity(fields.len() + 1);
    let mut params = Vec::with_capacity(fields.len());
    let mut param_idx = start_param;

    for (field, value) in fields {
        assignments.push(format!("{} = ${param_idx}", quote_identifier(field)?));
        params.push(BindValue::from_value(value));
        param_idx += 1;
    }
    assignments.push(format!("\"{UPDATED_AT_FIELD}\" = CURRENT_TIMESTAMP"));

    Ok(SqlFragment {
        clause: format!("SET {}", assignments.join(", ")),
        params,
        next_param: param_idx,
    })
}

/// Builds an ORDER BY clause.
///
/// Ties are broken by identity in the same direction; without a sort the
/// result is ordered by identity ascending, so row order never depends on
/// the storage engine.
///
/// # Errors
///
/// Returns [`crate::Error::QueryTranslation`] for an unsafe field name.
pub fn build_order_clause(sort: Option<&Sort>) -> Result<String> {
    let id = quote_identifier(IDENTITY_FIELD)?;
    match sort {
        None => Ok(format!("ORDER BY {id} ASC")),
        Some(sort) if sort.field.is_identity() => {
            Ok(format!("ORDER BY {id} {}", sort.direction.as_sql()))
        },
        Some(sort) => {
            let direction = sort.direction.as_sql();
            Ok(format!(
                "ORDER BY {} {direction}, {id} {direction}",
                quote_identifier(sort.field.name())?
            ))
        },
    }
}

/// Builds a LIMIT clause; `None` and `Some(0)` mean unbounded.
#[must_use]
pub fn build_limit_clause(limit: Option<usize>) -> String {
    match limit {
        Some(n) if n > 0 => format!("LIMIT {n}"),
        _ => String::new(),
    }
}

fn join_clauses(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds `INSERT ... RETURNING id`.
///
/// # Errors
///
/// Returns [`crate::Error::QueryTranslation`] for unsafe names or
/// store-managed fields in the document.
pub fn build_insert(table: &str, doc: &Document) -> Result<SqlStatement> {
    let table = quote_identifier(table)?;
    validate_insert(doc)?;

    if doc.is_empty() {
        return Ok(SqlStatement {
            sql: format!("INSERT INTO {table} DEFAULT VALUES RETURNING \"{IDENTITY_FIELD}\""),
            params: Vec::new(),
        });
    }

    let columns = doc
        .keys()
        .map(|k| quote_identifier(k))
        .collect::<Result<Vec<_>>>()?;
    let placeholders: Vec<String> = (1..=doc.len()).map(|i| format!("${i}")).collect();
    let params = doc.values().map(BindValue::from_value).collect();

    Ok(SqlStatement {
        sql: format!(
            "INSERT INTO {table} ({}) VALUES ({}) RETURNING \"{IDENTITY_FIELD}\"",
            columns.join(", "),
            placeholders.join(", ")
        ),
        params,
    })
}

/// Builds a SELECT honouring filter, projection, sort and limit.
///
/// # Errors
///
/// Returns [`crate::Error::QueryTranslation`] if any part is invalid.
pub fn build_select(
    table: &str,
    filter: &Filter,
    projection: Option<&Projection>,
    sort: Option<&Sort>,
    limit: Option<usize>,
) -> Result<SqlStatement> {
    let table = quote_identifier(table)?;
    let columns = match projection {
        None => "*".to_string(),
        Some(projection) => {
            let mut columns = vec![quote_identifier(IDENTITY_FIELD)?];
            for field in projection.fields() {
                if field != IDENTITY_FIELD {
                    columns.push(quote_identifier(field)?);
                }
            }
            columns.join(", ")
        },
    };

    let where_clause = build_where_clause(filter, 1)?;
    let order_clause = build_order_clause(sort)?;
    let limit_clause = build_limit_clause(limit);

    Ok(SqlStatement {
        sql: join_clauses(&[
            &format!("SELECT {columns} FROM {table}"),
            &where_clause.clause,
            &order_clause,
            &limit_clause,
        ]),
        params: where_clause.params,
    })
}

/// Subquery selecting the lowest identity that matches `where_clause`.
fn first_match(table: &str, where_clause: &SqlFragment) -> String {
    join_clauses(&[
        &format!("SELECT \"{IDENTITY_FIELD}\" FROM {table}"),
        &where_clause.clause,
        &format!("ORDER BY \"{IDENTITY_FIELD}\" ASC LIMIT 1"),
    ])
}

/// Builds an UPDATE touching at most the first (lowest identity) match.
///
/// Filter parameters come first, SET parameters continue after them.
///
/// # Errors
///
/// Returns [`crate::Error::QueryTranslation`] if filter or update is invalid.
pub fn build_update_one(table: &str, filter: &Filter, update: &Update) -> Result<SqlStatement> {
    let table = quote_identifier(table)?;
    let where_clause = build_where_clause(filter, 1)?;
    let set_clause = build_set_clause(update, where_clause.next_param)?;

    let sql = format!(
        "UPDATE {table} {} WHERE \"{IDENTITY_FIELD}\" = ({})",
        set_clause.clause,
        first_match(&table, &where_clause)
    );

    let mut params = where_clause.params;
    params.extend(set_clause.params);
    Ok(SqlStatement { sql, params })
}

/// Builds a DELETE removing at most the first (lowest identity) match.
///
/// # Errors
///
/// Returns [`crate::Error::QueryTranslation`] if the filter is invalid.
pub fn build_delete_one(table: &str, filter: &Filter) -> Result<SqlStatement> {
    let table = quote_identifier(table)?;
    let where_clause = build_where_clause(filter, 1)?;
    let sql = format!(
        "DELETE FROM {table} WHERE \"{IDENTITY_FIELD}\" = ({})",
        first_match(&table, &where_clause)
    );
    Ok(SqlStatement {
        sql,
        params: where_clause.params,
    })
}

/// Builds a DELETE removing every match.
///
/// # Errors
///
/// Returns [`crate::Error::QueryTranslation`] if the filter is invalid.
pub fn build_delete_many(table: &str, filter: &Filter) -> Result<SqlStatement> {
    let table = quote_identifier(table)?;
    let where_clause = build_where_clause(filter, 1)?;
    Ok(SqlStatement {
        sql: join_clauses(&[&format!("DELETE FROM {table}"), &where_clause.clause]),
        params: where_clause.params,
    })
}

/// Builds a `COUNT(*)` over the matches.
///
/// # Errors
///
/// Returns [`crate::Error::QueryTranslation`] if the filter is invalid.
pub fn build_count(table: &str, filter: &Filter) -> Result<SqlStatement> {
    let table = quote_identifier(table)?;
    let where_clause = build_where_clause(filter, 1)?;
    Ok(SqlStatement {
        sql: join_clauses(&[
            &format!("SELECT COUNT(*) FROM {table}"),
            &where_clause.clause,
        ]),
        params: where_clause.params,
    })
}
