//! Accessors over loosely shaped JSON payloads. Every helper returns `None`
//! for missing, null or unparseable fields instead of failing the record.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

pub fn safe_value<'a>(obj: &'a Value, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

pub fn safe_string(obj: &Value, key: &str) -> Option<String> {
    match safe_value(obj, key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First present key wins.
pub fn safe_string_n(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| safe_string(obj, key))
}

pub fn safe_string_lower(obj: &Value, key: &str) -> Option<String> {
    safe_string(obj, key).map(|s| s.to_lowercase())
}

pub fn safe_string_upper(obj: &Value, key: &str) -> Option<String> {
    safe_string(obj, key).map(|s| s.to_uppercase())
}

pub fn safe_decimal(obj: &Value, key: &str) -> Option<Decimal> {
    safe_value(obj, key).and_then(value_to_decimal)
}

pub fn safe_decimal_n(obj: &Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter().find_map(|key| safe_decimal(obj, key))
}

pub fn value_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => parse_decimal(s),
        Value::Number(n) => parse_decimal(&n.to_string()),
        _ => None,
    }
}

/// Parses plain or scientific notation ("1e-8").
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

pub fn safe_integer(obj: &Value, key: &str) -> Option<i64> {
    match safe_value(obj, key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}

/// Decimal-place counts and similar small fields; negative or oversized
/// values are treated as absent.
pub fn safe_u32(obj: &Value, key: &str) -> Option<u32> {
    safe_integer(obj, key).and_then(|n| u32::try_from(n).ok())
}

pub fn safe_integer_n(obj: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| safe_integer(obj, key))
}

pub fn safe_bool(obj: &Value, key: &str) -> Option<bool> {
    match safe_value(obj, key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        _ => None,
    }
}

/// Element access for array rows such as `[time, open, high, low, close, volume]`.
pub fn safe_decimal_at(row: &Value, index: usize) -> Option<Decimal> {
    row.get(index).and_then(value_to_decimal)
}

pub fn safe_integer_at(row: &Value, index: usize) -> Option<i64> {
    match row.get(index)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn safe_array<'a>(obj: &'a Value, key: &str) -> &'a [Value] {
    safe_value(obj, key)
        .and_then(|v| v.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

/// ISO-8601 to epoch milliseconds.
pub fn parse8601(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
}

pub fn safe_timestamp8601(obj: &Value, key: &str) -> Option<i64> {
    safe_string(obj, key).and_then(|s| parse8601(&s))
}

pub fn iso8601(millis: i64) -> Option<String> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

pub fn micros_to_millis(micros: i64) -> i64 {
    micros / 1000
}

pub fn milliseconds() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn microseconds() -> i64 {
    Utc::now().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_safe_string_accepts_numbers() {
        let raw = json!({"a": "1.5", "b": 2, "c": null, "d": {"x": 1}});
        assert_eq!(safe_string(&raw, "a").as_deref(), Some("1.5"));
        assert_eq!(safe_string(&raw, "b").as_deref(), Some("2"));
        assert_eq!(safe_string(&raw, "c"), None);
        assert_eq!(safe_string(&raw, "d"), None);
        assert_eq!(safe_string(&raw, "missing"), None);
        assert_eq!(safe_string_n(&raw, &["missing", "c", "b"]).as_deref(), Some("2"));
    }

    #[test]
    fn test_safe_decimal() {
        let raw = json!({"s": "60000.50", "n": 59990.5, "e": "1e-8", "bad": "abc", "empty": ""});
        assert_eq!(safe_decimal(&raw, "s"), Some(dec!(60000.50)));
        assert_eq!(safe_decimal(&raw, "n"), Some(dec!(59990.5)));
        assert_eq!(safe_decimal(&raw, "e"), Some(dec!(0.00000001)));
        assert_eq!(safe_decimal(&raw, "bad"), None);
        assert_eq!(safe_decimal(&raw, "empty"), None);
    }

    #[test]
    fn test_safe_u32_rejects_out_of_range() {
        let obj = json!({"dp": 8, "neg": -2, "huge": 1u64 << 40, "s": "4"});
        assert_eq!(safe_u32(&obj, "dp"), Some(8));
        assert_eq!(safe_u32(&obj, "s"), Some(4));
        assert_eq!(safe_u32(&obj, "neg"), None);
        assert_eq!(safe_u32(&obj, "huge"), None);
    }

    #[test]
    fn test_safe_integer_and_bool() {
        let raw = json!({"i": "42", "f": 1.9, "t": "true", "b": false, "n": 1});
        assert_eq!(safe_integer(&raw, "i"), Some(42));
        assert_eq!(safe_integer(&raw, "f"), Some(1));
        assert_eq!(safe_bool(&raw, "t"), Some(true));
        assert_eq!(safe_bool(&raw, "b"), Some(false));
        assert_eq!(safe_bool(&raw, "n"), Some(true));
    }

    #[test]
    fn test_parse8601() {
        assert_eq!(parse8601("2021-01-01T00:00:00Z"), Some(1_609_459_200_000));
        assert_eq!(parse8601("2021-01-01T00:00:00.123456789Z"), Some(1_609_459_200_123));
        assert_eq!(parse8601("2021-01-01T00:00:00.5"), Some(1_609_459_200_500));
        assert_eq!(parse8601("yesterday"), None);
        assert_eq!(iso8601(1_609_459_200_000).as_deref(), Some("2021-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_array_rows() {
        let row = json!([1609459200000i64, "1", "2", "0.5", "1.5", "100"]);
        assert_eq!(safe_integer_at(&row, 0), Some(1_609_459_200_000));
        assert_eq!(safe_decimal_at(&row, 2), Some(dec!(2)));
        assert_eq!(safe_decimal_at(&row, 9), None);
    }
}
