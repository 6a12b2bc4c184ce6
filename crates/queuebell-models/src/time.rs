//! Lenient timestamp handling.
//!
//! Records written by older console builds store times as epoch
//! milliseconds, newer ones as RFC 3339 strings. Both are accepted on read;
//! writes always use RFC 3339.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// Parses a timestamp from epoch milliseconds, epoch seconds or RFC 3339.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let raw = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            // Values below 1e11 are seconds, not milliseconds.
            let ms = if raw.abs() < 100_000_000_000 { raw * 1000 } else { raw };
            Utc.timestamp_millis_opt(ms).single()
        }
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
                return Some(dt.with_timezone(&Utc));
            }
            s.trim().parse::<i64>().ok().and_then(|n| parse_timestamp(&Value::from(n)))
        }
        _ => None,
    }
}

/// Serde adapter for `Option<DateTime<Utc>>` fields that may arrive as numbers.
pub mod flexible {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(parse_timestamp))
    }
}
