//! Typed filter, update, sort and projection specifications.
//!
//! Callers historically passed loose mappings (`{"_id": 3}`,
//! `{"$set": {...}}`, `[("created_at", -1)]`). These types capture the
//! subset the store understands so that backends can match on them
//! exhaustively; the `from_value` constructors parse the loose forms and
//! reject everything else.

use super::document::{
    Document, DocumentId, IDENTITY_ALIAS, IDENTITY_FIELD, is_container, is_store_managed,
    kind_name, validate_identifier,
};
use crate::{Error, Result};
use serde_json::Value;

/// Operator key for partial updates.
const SET_OPERATOR: &str = "$set";

/// A field referenced by a filter or sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldRef {
    /// The identity field, whether spelled `_id` or `id`.
    Identity,
    /// Any other field.
    Named(String),
}

impl FieldRef {
    /// Resolves a field name, folding both identity spellings together.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if name == IDENTITY_FIELD || name == IDENTITY_ALIAS {
            Self::Identity
        } else {
            Self::Named(name.to_string())
        }
    }

    /// Physical field (column) name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Identity => IDENTITY_FIELD,
            Self::Named(name) => name,
        }
    }

    /// Returns true for the identity field.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }
}

impl From<&str> for FieldRef {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

/// A single `field = value` constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Equality {
    /// Constrained field.
    pub field: FieldRef,
    /// Expected scalar value.
    pub value: Value,
}

/// A conjunction of equality constraints.
///
/// An empty filter matches every document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    constraints: Vec<Equality>,
}

impl Filter {
    /// Creates an empty filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter on the identity field.
    #[must_use]
    pub fn by_id(id: impl Into<DocumentId>) -> Self {
        Self::new().with(FieldRef::Identity, id.into().to_value())
    }

    /// Adds an equality constraint on `field`.
    ///
    /// Constraining the same field twice keeps the last value, as a mapping
    /// would; `_id` and `id` count as the same field.
    #[must_use]
    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(FieldRef::parse(field), value.into())
    }

    fn with(mut self, field: FieldRef, value: Value) -> Self {
        self.constraints.retain(|c| c.field != field);
        self.constraints.push(Equality { field, value });
        self
    }

    /// Parses a raw `{field: value}` mapping.
    ///
    /// `null` is accepted and treated as an empty filter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] if the value is not a mapping or
    /// any constraint is invalid (see [`Filter::validate`]).
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Null => return Ok(Self::new()),
            Value::Object(map) => map,
            other => {
                return Err(Error::QueryTranslation(format!(
                    "filter must be a mapping, got {}",
                    kind_name(other)
                )));
            },
        };

        let filter = map
            .iter()
            .fold(Self::new(), |filter, (field, value)| {
                filter.eq(field, value.clone())
            });
        filter.validate()?;
        Ok(filter)
    }

    /// Checks field names and values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] if a field name is unsafe, a value
    /// is a container, or an operator such as `$gt` is used.
    pub fn validate(&self) -> Result<()> {
        for constraint in &self.constraints {
            let field = constraint.field.name();
            validate_identifier(field)?;
            if is_container(&constraint.value) {
                return Err(Error::QueryTranslation(format!(
                    "filter on '{field}' must compare against a scalar, got {}",
                    kind_name(&constraint.value)
                )));
            }
        }
        Ok(())
    }

    /// The constraints, in insertion order.
    #[must_use]
    pub fn constraints(&self) -> &[Equality] {
        &self.constraints
    }

    /// Returns true if the filter matches every document.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// An update specification.
///
/// Both variants assign the listed fields and leave the others untouched;
/// `updated_at` is refreshed by the store either way.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// A flat `{field: value}` mapping.
    Replace(Document),
    /// A `{"$set": {field: value}}` partial update.
    Set(Document),
}

impl Update {
    /// Creates a partial update.
    #[must_use]
    pub const fn set(fields: Document) -> Self {
        Self::Set(fields)
    }

    /// Parses a raw update mapping, unwrapping a single `$set` level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] for non-mappings, unknown
    /// operators, operators mixed with plain fields, nested operators and
    /// invalid fields (see [`Update::validate`]).
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::QueryTranslation(format!(
                "update must be a mapping, got {}",
                kind_name(value)
            )));
        };

        let operators: Vec<&String> = map.keys().filter(|k| k.starts_with('$')).collect();
        let update = match operators.as_slice() {
            [] => Self::Replace(map.clone()),
            [op] if map.len() == 1 => {
                if op.as_str() != SET_OPERATOR {
                    return Err(Error::QueryTranslation(format!(
                        "unsupported update operator '{op}'"
                    )));
                }
                match &map[op.as_str()] {
                    Value::Object(fields) => Self::Set(fields.clone()),
                    other => {
                        return Err(Error::QueryTranslation(format!(
                            "'$set' expects a mapping, got {}",
                            kind_name(other)
                        )));
                    },
                }
            },
            _ => {
                return Err(Error::QueryTranslation(
                    "update operators cannot be combined with other keys".to_string(),
                ));
            },
        };

        update.validate()?;
        Ok(update)
    }

    /// The fields to assign.
    #[must_use]
    pub const fn fields(&self) -> &Document {
        match self {
            Self::Replace(fields) | Self::Set(fields) => fields,
        }
    }

    /// Checks the assigned fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] if the update is empty, nests
    /// another operator, or writes an unsafe or store-managed field.
    pub fn validate(&self) -> Result<()> {
        let fields = self.fields();
        if fields.is_empty() {
            return Err(Error::QueryTranslation(
                "update must assign at least one field".to_string(),
            ));
        }
        for field in fields.keys() {
            if field.starts_with('$') {
                return Err(Error::QueryTranslation(format!(
                    "nested update operator '{field}' is not supported"
                )));
            }
            if is_store_managed(field) {
                return Err(Error::QueryTranslation(format!(
                    "'{field}' is managed by the store and cannot be updated"
                )));
            }
            validate_identifier(field)?;
        }
        Ok(())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// `+1`
    Ascending,
    /// `-1`
    Descending,
}

impl SortDirection {
    /// Parses the `+1` / `-1` convention.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] for any other number.
    pub fn from_i64(direction: i64) -> Result<Self> {
        match direction {
            1 => Ok(Self::Ascending),
            -1 => Ok(Self::Descending),
            other => Err(Error::QueryTranslation(format!(
                "sort direction must be 1 or -1, got {other}"
            ))),
        }
    }

    /// SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    /// Document-store convention.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Single-field ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Field to order by.
    pub field: FieldRef,
    /// Direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Ascending order on `field`.
    #[must_use]
    pub fn asc(field: &str) -> Self {
        Self {
            field: FieldRef::parse(field),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending order on `field`.
    #[must_use]
    pub fn desc(field: &str) -> Self {
        Self {
            field: FieldRef::parse(field),
            direction: SortDirection::Descending,
        }
    }

    /// Parses a `[(field, direction)]` list.
    ///
    /// An empty list means "unspecified order".
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] for more than one key, a bad
    /// direction or an unsafe field name.
    pub fn from_pairs(pairs: &[(&str, i64)]) -> Result<Option<Self>> {
        match pairs {
            [] => Ok(None),
            [(field, direction)] => {
                validate_identifier(field)?;
                Ok(Some(Self {
                    field: FieldRef::parse(field),
                    direction: SortDirection::from_i64(*direction)?,
                }))
            },
            _ => Err(Error::QueryTranslation(
                "only single-field sort is supported".to_string(),
            )),
        }
    }

    /// Parses a JSON `[[field, direction]]` list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] if the shape is wrong.
    pub fn from_value(value: &Value) -> Result<Option<Self>> {
        let malformed = || {
            Error::QueryTranslation("sort must be a list of [field, direction] pairs".to_string())
        };

        let items = match value {
            Value::Null => return Ok(None),
            Value::Array(items) => items,
            _ => return Err(malformed()),
        };

        let pairs = items
            .iter()
            .map(|item| match item.as_array().map(Vec::as_slice) {
                Some([Value::String(field), direction]) => direction
                    .as_i64()
                    .map(|d| (field.as_str(), d))
                    .ok_or_else(malformed),
                _ => Err(malformed()),
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_pairs(&pairs)
    }
}

/// Inclusion projection. The identity field is always returned.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Projection {
    fields: Vec<String>,
}

impl Projection {
    /// Projects onto the given fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] if a field name is unsafe.
    pub fn new<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut projected = Vec::new();
        for field in fields {
            let field = field.into();
            let field = if field == IDENTITY_ALIAS {
                IDENTITY_FIELD.to_string()
            } else {
                field
            };
            validate_identifier(&field)?;
            if !projected.contains(&field) {
                projected.push(field);
            }
        }
        Ok(Self { fields: projected })
    }

    /// Parses `{field: 1}` or `["field"]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryTranslation`] for exclusions (`0`) or other shapes.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let mut fields = Vec::new();
                for (field, flag) in map {
                    let included = match flag {
                        Value::Bool(b) => *b,
                        Value::Number(n) => n.as_i64() != Some(0),
                        _ => false,
                    };
                    if !included {
                        return Err(Error::QueryTranslation(format!(
                            "only inclusion projections are supported ('{field}')"
                        )));
                    }
                    fields.push(field.clone());
                }
                Self::new(fields)
            },
            Value::Array(items) => {
                let fields = items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            Error::QueryTranslation(
                                "projection list must contain field names".to_string(),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::new(fields)
            },
            other => Err(Error::QueryTranslation(format!(
                "projection must be a mapping or list, got {}",
                kind_name(other)
            ))),
        }
    }

    /// Projected fields, identity excluded unless explicitly named.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns true if `field` survives the projection.
    #[must_use]
    pub fn includes(&self, field: &str) -> bool {
        field == IDENTITY_FIELD || self.fields.iter().any(|f| f == field)
    }

    /// Applies the projection to a materialised document.
    #[must_use]
    pub fn apply(&self, doc: Document) -> Document {
        doc.into_iter().filter(|(k, _)| self.includes(k)).collect()
    }
}
