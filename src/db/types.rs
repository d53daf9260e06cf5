//! Row decoding into JSON.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! Introspection queries return a wide mix of catalog types (`name`, `oid`,
//! `numeric`, `timestamptz`, ...). Values that cannot be decoded become `null`
//! and are logged at debug level rather than failing the whole call.

use crate::models::{DatabaseType, Row as JsonRow};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Timestamp,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // "interval" and "point" would otherwise match the integer check below
    if lower == "interval" || lower == "point" {
        return TypeCategory::Unknown;
    }

    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.starts_with("timestamp") || lower == "date" || lower == "datetime" {
        return TypeCategory::Timestamp;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower == "text" || lower == "name" || lower.contains("char") {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// Base64-encode binary column values.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> JsonRow;
    fn column_names(&self) -> Vec<String>;
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::PostgreSQL);
                let value = postgres::decode_column(self, idx, type_name, category);
                (col.name().to_string(), value)
            })
            .collect()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::SQLite);
                let value = sqlite::decode_column(self, idx, category);
                (col.name().to_string(), value)
            })
            .collect()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod postgres {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use sqlx::postgres::types::Oid;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        let value = match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => opt(row.try_get::<Option<bool>, _>(idx), JsonValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => opt(row.try_get::<Option<Vec<u8>>, _>(idx), |v| {
                encode_binary_value(&v)
            }),
            TypeCategory::Json => opt(row.try_get::<Option<JsonValue>, _>(idx), |v| v),
            TypeCategory::Timestamp => decode_timestamp(row, idx),
            TypeCategory::Text | TypeCategory::Unknown => decode_text(row, idx),
        };

        value.unwrap_or_else(|| {
            tracing::debug!(column = idx, type_name, "Unsupported column value, returning null");
            JsonValue::Null
        })
    }

    /// `Ok(None)` (SQL NULL) maps to JSON null; a decode error maps to `None`.
    fn opt<T>(
        result: Result<Option<T>, sqlx::Error>,
        f: impl FnOnce(T) -> JsonValue,
    ) -> Option<JsonValue> {
        match result {
            Ok(Some(v)) => Some(f(v)),
            Ok(None) => Some(JsonValue::Null),
            Err(_) => None,
        }
    }

    /// Exact decimal string; NaN and the infinities do not decode and become null.
    fn decode_decimal(row: &PgRow, idx: usize) -> Option<JsonValue> {
        opt(row.try_get::<Option<BigDecimal>, _>(idx), |v| {
            JsonValue::String(v.to_plain_string())
        })
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Option<JsonValue> {
        opt(row.try_get::<Option<i64>, _>(idx), |v| v.into())
            .or_else(|| opt(row.try_get::<Option<i32>, _>(idx), |v| v.into()))
            .or_else(|| opt(row.try_get::<Option<i16>, _>(idx), |v| v.into()))
    }

    fn decode_float(row: &PgRow, idx: usize) -> Option<JsonValue> {
        opt(row.try_get::<Option<f64>, _>(idx), float_value)
            .or_else(|| opt(row.try_get::<Option<f32>, _>(idx), |v| float_value(v as f64)))
    }

    fn decode_timestamp(row: &PgRow, idx: usize) -> Option<JsonValue> {
        opt(row.try_get::<Option<DateTime<Utc>>, _>(idx), |v| {
            JsonValue::String(v.to_rfc3339())
        })
        .or_else(|| {
            opt(row.try_get::<Option<NaiveDateTime>, _>(idx), |v| {
                JsonValue::String(v.to_string())
            })
        })
        .or_else(|| {
            opt(row.try_get::<Option<NaiveDate>, _>(idx), |v| {
                JsonValue::String(v.to_string())
            })
        })
    }

    fn decode_text(row: &PgRow, idx: usize) -> Option<JsonValue> {
        opt(row.try_get::<Option<String>, _>(idx), JsonValue::String)
            .or_else(|| opt(row.try_get::<Option<Oid>, _>(idx), |v| v.0.into()))
    }
}

mod sqlite {
    use super::*;

    /// SQLite values carry their own storage class, so the declared type is
    /// only a hint; every decoder falls back to the other storage classes.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        if let Ok(None) = row.try_get::<Option<String>, _>(idx) {
            return JsonValue::Null;
        }

        let preferred = match category {
            TypeCategory::Integer => integer(row, idx),
            TypeCategory::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::Bool),
            TypeCategory::Float | TypeCategory::Decimal => float(row, idx),
            TypeCategory::Binary => binary(row, idx),
            TypeCategory::Json => text(row, idx).map(|v| match v {
                JsonValue::String(s) => serde_json::from_str(&s).unwrap_or(JsonValue::String(s)),
                other => other,
            }),
            _ => None,
        };

        preferred
            .or_else(|| text(row, idx))
            .or_else(|| integer(row, idx))
            .or_else(|| float(row, idx))
            .or_else(|| binary(row, idx))
            .unwrap_or(JsonValue::Null)
    }

    fn integer(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::from)
    }

    fn float(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(float_value)
    }

    fn text(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
    }

    fn binary(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary_value(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type() {
        let pg = DatabaseType::PostgreSQL;
        assert_eq!(categorize_type("INT8", pg), TypeCategory::Integer);
        assert_eq!(categorize_type("NUMERIC", pg), TypeCategory::Decimal);
        assert_eq!(categorize_type("TIMESTAMPTZ", pg), TypeCategory::Timestamp);
        assert_eq!(categorize_type("NAME", pg), TypeCategory::Text);
        assert_eq!(categorize_type("INTERVAL", pg), TypeCategory::Unknown);
        assert_eq!(categorize_type("bytea", pg), TypeCategory::Binary);
        assert_eq!(categorize_type("numeric", DatabaseType::SQLite), TypeCategory::Float);
    }

    #[test]
    fn test_encode_binary_value() {
        assert_eq!(
            encode_binary_value(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
    }
}
