//! Helpers for working with `sea_query::Value` as attribute values.
//!
//! Nodes store their attribute values as `sea_query::Value` so that they can be bound
//! to statements without conversion. These helpers give the graph a uniform view on
//! nullness, string rendering and ordering.

use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveDateTime};
use sea_query::Value;

use crate::error::LifeError;
use crate::model::AttributeType;

/// The value used for unset attributes.
pub fn null() -> Value {
    Value::String(None)
}

/// Check whether a value is SQL `NULL`.
pub fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::ChronoDate(None)
            | Value::ChronoDateTime(None)
    )
}

/// Render a value as plain text, `None` for `NULL` and unsupported variants.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Bool(Some(b)) => Some(b.to_string()),
        Value::TinyInt(Some(i)) => Some(i.to_string()),
        Value::SmallInt(Some(i)) => Some(i.to_string()),
        Value::Int(Some(i)) => Some(i.to_string()),
        Value::BigInt(Some(i)) => Some(i.to_string()),
        Value::TinyUnsigned(Some(u)) => Some(u.to_string()),
        Value::SmallUnsigned(Some(u)) => Some(u.to_string()),
        Value::Unsigned(Some(u)) => Some(u.to_string()),
        Value::BigUnsigned(Some(u)) => Some(u.to_string()),
        Value::Float(Some(f)) => Some(f.to_string()),
        Value::Double(Some(d)) => Some(d.to_string()),
        Value::String(Some(s)) => Some(s.to_string()),
        Value::Char(Some(c)) => Some(c.to_string()),
        Value::Json(Some(j)) => Some(j.to_string()),
        Value::ChronoDate(Some(d)) => Some(d.to_string()),
        Value::ChronoDateTime(Some(d)) => Some(d.to_string()),
        _ => None,
    }
}

/// Numeric view on a value. Strings holding a number are accepted as well.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::TinyInt(Some(i)) => Some(f64::from(*i)),
        Value::SmallInt(Some(i)) => Some(f64::from(*i)),
        Value::Int(Some(i)) => Some(f64::from(*i)),
        Value::BigInt(Some(i)) => Some(*i as f64),
        Value::TinyUnsigned(Some(u)) => Some(f64::from(*u)),
        Value::SmallUnsigned(Some(u)) => Some(f64::from(*u)),
        Value::Unsigned(Some(u)) => Some(f64::from(*u)),
        Value::BigUnsigned(Some(u)) => Some(*u as f64),
        Value::Float(Some(f)) => Some(f64::from(*f)),
        Value::Double(Some(d)) => Some(*d),
        Value::String(Some(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Compare two values for sorting.
///
/// `NULL` compares like an empty string. When both sides are numeric they are compared
/// numerically, otherwise their lowercased string forms are compared.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (value_as_f64(a), value_as_f64(b)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    let x = value_to_string(a).unwrap_or_default().to_lowercase();
    let y = value_to_string(b).unwrap_or_default().to_lowercase();
    x.cmp(&y)
}

/// Loose equality used for in-memory criteria evaluation.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if is_null(a) || is_null(b) {
        return is_null(a) && is_null(b);
    }
    if let (Some(x), Some(y)) = (value_as_f64(a), value_as_f64(b)) {
        return x == y;
    }
    value_to_string(a) == value_to_string(b)
}

/// Convert a literal from a condition string into a value of the attribute's type.
pub fn parse_literal(text: &str, attr_type: AttributeType) -> Result<Value, LifeError> {
    let invalid = || LifeError::Parse(format!("'{text}' is not a valid {attr_type} value"));
    match attr_type {
        AttributeType::Integer => text.trim().parse::<i64>().map(Value::from).map_err(|_| invalid()),
        AttributeType::Float => text.trim().parse::<f64>().map(Value::from).map_err(|_| invalid()),
        AttributeType::Boolean => match text.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Value::from(true)),
            "0" | "false" | "no" => Ok(Value::from(false)),
            _ => Err(invalid()),
        },
        AttributeType::Date => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
            .map(Value::from)
            .map_err(|_| invalid()),
        AttributeType::DateTime => {
            let trimmed = text.trim();
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
                .map(Value::from)
                .map_err(|_| invalid())
        }
        AttributeType::String | AttributeType::Text => Ok(Value::from(text.to_string())),
    }
}
