//! Wire encoding for [`BindValue`].
//!
//! Placeholder types are inferred by the server when a statement is
//! prepared, so the encoder adapts the value to the column it lands in:
//! integers widen or narrow, text is parsed into numbers, booleans or
//! timestamps when the column asks for one, and anything bound to a JSON
//! column is sent as a JSON document.

use crate::storage::sql::BindValue;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::error::Error as StdError;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

type EncodeResult = Result<IsNull, Box<dyn StdError + Sync + Send>>;

impl BindValue {
    /// The value as a JSON document, for JSON and JSONB columns.
    ///
    /// Serialized containers are parsed back; scalars are wrapped.
    fn to_json(&self) -> Result<Value, serde_json::Error> {
        Ok(match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(n) => Value::from(*n),
            Self::Float(f) => Value::from(*f),
            Self::Text(s) => Value::String(s.clone()),
            Self::Json(raw) => serde_json::from_str(raw)?,
        })
    }

    fn type_mismatch(&self, ty: &Type) -> Box<dyn StdError + Sync + Send> {
        format!("cannot bind {self:?} to a column of type {ty}").into()
    }

    fn encode_int(&self, n: i64, ty: &Type, out: &mut BytesMut) -> EncodeResult {
        match *ty {
            Type::INT2 => i16::try_from(n)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(n)?.to_sql(ty, out),
            Type::INT8 => n.to_sql(ty, out),
            #[allow(clippy::cast_precision_loss)]
            Type::FLOAT4 => (n as f32).to_sql(ty, out),
            #[allow(clippy::cast_precision_loss)]
            Type::FLOAT8 => (n as f64).to_sql(ty, out),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
                n.to_string().to_sql(ty, out)
            },
            _ => Err(self.type_mismatch(ty)),
        }
    }

    fn encode_text(&self, s: &str, ty: &Type, out: &mut BytesMut) -> EncodeResult {
        match *ty {
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => s.to_sql(ty, out),
            Type::INT2 => s.parse::<i16>()?.to_sql(ty, out),
            Type::INT4 => s.parse::<i32>()?.to_sql(ty, out),
            Type::INT8 => s.parse::<i64>()?.to_sql(ty, out),
            Type::FLOAT4 => s.parse::<f32>()?.to_sql(ty, out),
            Type::FLOAT8 => s.parse::<f64>()?.to_sql(ty, out),
            Type::BOOL => s.parse::<bool>()?.to_sql(ty, out),
            Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(s)?
                .with_timezone(&Utc)
                .to_sql(ty, out),
            Type::TIMESTAMP => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.naive_utc())
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))?
                .to_sql(ty, out),
            _ => Err(self.type_mismatch(ty)),
        }
    }
}

impl ToSql for BindValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> EncodeResult {
        if matches!(*ty, Type::JSON | Type::JSONB) {
            if matches!(self, Self::Null) {
                return Ok(IsNull::Yes);
            }
            return self.to_json()?.to_sql(ty, out);
        }

        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => b.to_string().to_sql(ty, out),
                _ => Err(self.type_mismatch(ty)),
            },
            Self::Int(n) => self.encode_int(*n, ty, out),
            Self::Float(f) => match *ty {
                Type::FLOAT8 => f.to_sql(ty, out),
                #[allow(clippy::cast_possible_truncation)]
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => f.to_string().to_sql(ty, out),
                _ => Err(self.type_mismatch(ty)),
            },
            Self::Text(s) => self.encode_text(s, ty, out),
            Self::Json(raw) => match *ty {
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => raw.to_sql(ty, out),
                _ => Err(self.type_mismatch(ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_sql_null() {
        let mut out = BytesMut::new();
        let result = BindValue::Null.to_sql(&Type::JSONB, &mut out).unwrap();
        assert!(matches!(result, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn test_int_narrows_to_int4() {
        let mut out = BytesMut::new();
        BindValue::Int(7).to_sql(&Type::INT4, &mut out).unwrap();
        assert_eq!(out.as_ref(), &7_i32.to_be_bytes());

        let mut out = BytesMut::new();
        assert!(
            BindValue::Int(i64::MAX)
                .to_sql(&Type::INT4, &mut out)
                .is_err()
        );
    }

    #[test]
    fn test_json_container_uses_jsonb_version_prefix() {
        let mut out = BytesMut::new();
        BindValue::Json(r#"{"a":1}"#.to_string())
            .to_sql(&Type::JSONB, &mut out)
            .unwrap();
        assert_eq!(out[0], 1);
        assert_eq!(&out[1..], br#"{"a":1}"#);
    }

    #[test]
    fn test_json_column_keeps_key_order() {
        let mut out = BytesMut::new();
        BindValue::Json(r#"{"zeta":1,"alpha":2,"mid":[{"b":1,"a":2}]}"#.to_string())
            .to_sql(&Type::JSON, &mut out)
            .unwrap();
        assert_eq!(out.as_ref(), br#"{"zeta":1,"alpha":2,"mid":[{"b":1,"a":2}]}"#);
    }

    #[test]
    fn test_text_into_jsonb_is_json_string() {
        let mut out = BytesMut::new();
        BindValue::Text("hi".to_string())
            .to_sql(&Type::JSONB, &mut out)
            .unwrap();
        assert_eq!(&out[1..], br#""hi""#);
    }

    #[test]
    fn test_text_parses_for_numeric_columns() {
        let mut out = BytesMut::new();
        BindValue::Text("42".to_string())
            .to_sql(&Type::INT8, &mut out)
            .unwrap();
        assert_eq!(out.as_ref(), &42_i64.to_be_bytes());

        let mut out = BytesMut::new();
        assert!(
            BindValue::Text("abc".to_string())
                .to_sql(&Type::INT4, &mut out)
                .is_err()
        );
    }

    #[test]
    fn test_container_rejected_for_integer_column() {
        let mut out = BytesMut::new();
        assert!(
            BindValue::Json("[1]".to_string())
                .to_sql(&Type::INT4, &mut out)
                .is_err()
        );
    }
}
