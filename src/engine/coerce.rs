//! Coercion of loosely-typed persisted values.
//!
//! Stored JSON may come from older builds, hand edits or a corrupt write.
//! Nothing here fails: a value that cannot be read becomes the caller's
//! fallback, usually 0.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::calendar::{parse_timestamp, DateKey};

/// Replace NaN and infinities with 0.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Read a number from a JSON value: numbers, numeric strings and booleans.
pub fn value_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

pub fn field<'a>(object: &'a Value, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|v| !v.is_null())
}

pub fn field_f64(object: &Value, key: &str) -> Option<f64> {
    field(object, key).and_then(value_f64)
}

/// Non-negative whole number, rounded; fallback when missing or unreadable.
pub fn field_u64(object: &Value, key: &str, fallback: u64) -> u64 {
    field_f64(object, key)
        .map(|n| n.round().max(0.0) as u64)
        .unwrap_or(fallback)
}

/// Round and clamp into `[min, max]`; fallback to `min` when unreadable.
pub fn field_clamped(object: &Value, key: &str, min: i64, max: i64) -> i64 {
    field_f64(object, key)
        .map(|n| (n.round() as i64).clamp(min, max))
        .unwrap_or(min)
}

/// Booleans keep their value; anything else present is judged truthy the way
/// the stored data was written (non-empty string, non-zero number).
pub fn field_bool(object: &Value, key: &str, fallback: bool) -> bool {
    match field(object, key) {
        None => fallback,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(fallback),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

pub fn field_str<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    field(object, key).and_then(Value::as_str)
}

pub fn field_timestamp(object: &Value, key: &str) -> Option<DateTime<Utc>> {
    field_str(object, key).and_then(parse_timestamp)
}

// ----------------------------------------------------------------------------
// serde `deserialize_with` helpers for externally-owned records
// ----------------------------------------------------------------------------

pub(crate) fn de_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_f64(&value)
        .map(|n| n.round().max(0.0) as u64)
        .unwrap_or(0))
}

pub(crate) fn de_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = de_amount(deserializer)?;
    Ok(value.min(u64::from(u32::MAX)) as u32)
}

pub(crate) fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

pub(crate) fn de_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

pub(crate) fn de_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateKey>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(DateKey::parse_lenient))
}

pub(crate) fn de_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(parse_timestamp))
}

/// Date-keyed counters; entries with unreadable dates are dropped.
pub(crate) fn de_date_counts<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<DateKey, u32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let mut counts = BTreeMap::new();
    if let Value::Object(map) = value {
        for (raw_key, raw_count) in map {
            let Some(key) = DateKey::parse_lenient(&raw_key) else {
                continue;
            };
            let count = value_f64(&raw_count)
                .map(|n| n.round().max(0.0) as u32)
                .unwrap_or(0);
            counts.insert(key, count);
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_strings_and_garbage() {
        let row = json!({"a": 4.6, "b": "12", "c": "abc", "d": null, "e": -3});
        assert_eq!(field_u64(&row, "a", 0), 5);
        assert_eq!(field_u64(&row, "b", 0), 12);
        assert_eq!(field_u64(&row, "c", 7), 7);
        assert_eq!(field_u64(&row, "d", 7), 7);
        assert_eq!(field_u64(&row, "e", 7), 0);
        assert_eq!(field_u64(&row, "missing", 9), 9);
    }

    #[test]
    fn clamps_into_range() {
        let row = json!({"level": 250000.4, "streak": -5});
        assert_eq!(field_clamped(&row, "level", 1, 100_000), 100_000);
        assert_eq!(field_clamped(&row, "streak", 0, 100_000), 0);
        assert_eq!(field_clamped(&row, "nothing", 1, 100_000), 1);
    }

    #[test]
    fn non_finite_becomes_zero() {
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero(-2.5), -2.5);
    }

    #[test]
    fn bool_fields_keep_defaults_when_absent() {
        let row = json!({"on": true, "off": false, "zero": 0});
        assert!(field_bool(&row, "on", false));
        assert!(!field_bool(&row, "off", true));
        assert!(!field_bool(&row, "zero", true));
        assert!(field_bool(&row, "absent", true));
    }
}
