// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Column type inference from a representative record.
//!
//! Inference is a total function over JSON values; the resulting logical
//! types render to SQL Server DDL at table-creation time. Nested values are
//! stored as JSON text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// ISO-like timestamp prefix, e.g. `2024-01-15T10:30:00`.
static DATETIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").expect("datetime regex"));

/// Logical column type inferred from a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInt,
    Real,
    /// Stored as 0/1.
    Bool,
    DateTime,
    Text,
    /// Object or array, JSON-serialized at insert time.
    Json,
}

impl ColumnType {
    /// SQL Server rendering of the logical type.
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Real => "FLOAT",
            ColumnType::Bool => "INT",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Text | ColumnType::Json => "NVARCHAR(MAX)",
        }
    }
}

/// Infer the column type for one field value.
pub fn infer_column_type(value: &Value) -> ColumnType {
    match value {
        Value::Null => ColumnType::Text,
        Value::Bool(_) => ColumnType::Bool,
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if i >= i64::from(i32::MIN) && i <= i64::from(i32::MAX) {
                    ColumnType::Integer
                } else {
                    ColumnType::BigInt
                }
            } else {
                ColumnType::Real
            }
        }
        Value::String(s) => {
            if DATETIME_RE.is_match(s) {
                ColumnType::DateTime
            } else {
                ColumnType::Text
            }
        }
        Value::Array(_) | Value::Object(_) => ColumnType::Json,
    }
}

/// Infer columns for a whole record, in the record's key order.
pub fn infer_columns(record: &Value) -> Vec<(String, ColumnType)> {
    match record {
        Value::Object(map) => map
            .iter()
            .map(|(name, value)| (name.clone(), infer_column_type(value)))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_and_strings_are_text() {
        assert_eq!(infer_column_type(&json!(null)), ColumnType::Text);
        assert_eq!(infer_column_type(&json!("plain")), ColumnType::Text);
    }

    #[test]
    fn integers_split_on_int32_range() {
        assert_eq!(infer_column_type(&json!(42)), ColumnType::Integer);
        assert_eq!(infer_column_type(&json!(-42)), ColumnType::Integer);
        assert_eq!(infer_column_type(&json!(2_147_483_647)), ColumnType::Integer);
        assert_eq!(infer_column_type(&json!(2_147_483_648i64)), ColumnType::BigInt);
        assert_eq!(infer_column_type(&json!(-2_147_483_649i64)), ColumnType::BigInt);
    }

    #[test]
    fn floats_are_real() {
        assert_eq!(infer_column_type(&json!(1.5)), ColumnType::Real);
    }

    #[test]
    fn booleans_store_as_integer() {
        assert_eq!(infer_column_type(&json!(true)), ColumnType::Bool);
        assert_eq!(ColumnType::Bool.sql(), "INT");
    }

    #[test]
    fn iso_timestamps_are_datetime() {
        assert_eq!(
            infer_column_type(&json!("2024-01-15T10:30:00")),
            ColumnType::DateTime
        );
        assert_eq!(
            infer_column_type(&json!("2024-01-15T10:30:00.123Z")),
            ColumnType::DateTime
        );
        // A bare date is not a timestamp.
        assert_eq!(infer_column_type(&json!("2024-01-15")), ColumnType::Text);
    }

    #[test]
    fn nested_values_are_json() {
        assert_eq!(infer_column_type(&json!({ "a": 1 })), ColumnType::Json);
        assert_eq!(infer_column_type(&json!([1, 2])), ColumnType::Json);
        assert_eq!(ColumnType::Json.sql(), "NVARCHAR(MAX)");
    }

    #[test]
    fn infer_columns_maps_each_field() {
        let record = json!({ "id": 1, "name": "x", "tags": ["a"] });
        let columns = infer_columns(&record);
        assert_eq!(
            columns,
            vec![
                ("id".to_string(), ColumnType::Integer),
                ("name".to_string(), ColumnType::Text),
                ("tags".to_string(), ColumnType::Json),
            ]
        );
    }

    #[test]
    fn non_object_records_have_no_columns() {
        assert!(infer_columns(&json!([1, 2])).is_empty());
        assert!(infer_columns(&json!("x")).is_empty());
    }
}
