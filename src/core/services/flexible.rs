//! Tolerant field decoders for Archive.org JSON.
//!
//! The same metadata field may arrive as a string, an array of strings, a
//! number or null depending on who uploaded the item. Use these with
//! `#[serde(default, deserialize_with = "...")]`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn scalar_to_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn collect_strings(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        other => scalar_to_string(other).into_iter().collect(),
    }
}

/// String, array (first non-empty element), number or null.
pub fn first_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| collect_strings(&v).into_iter().next()))
}

/// Like [`first_string`] but arrays are joined with `"; "`.
pub fn joined_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        let parts = collect_strings(&v);
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }))
}

pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(|v| collect_strings(&v)).unwrap_or_default())
}

fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric(s),
        Value::Array(items) => items.iter().find_map(number_from),
        _ => None,
    }
}

/// Accepts plain numbers and `mm:ss` / `hh:mm:ss` durations.
fn parse_numeric(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<f64>() {
        return n.is_finite().then_some(n);
    }
    if s.contains(':') {
        let mut total = 0.0;
        for part in s.split(':') {
            let n: f64 = part.trim().parse().ok()?;
            total = total * 60.0 + n;
        }
        return Some(total);
    }
    None
}

/// Number or numeric string; anything else becomes `None`.
pub fn flexible_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from))
}

/// Track numbers show up as "3", "03", "3/12" or 3.
pub fn flexible_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(|v| match v {
        Value::String(s) => {
            let head = s.split('/').next().unwrap_or_default().trim();
            head.parse::<u32>().ok()
        }
        other => number_from(other)
            .filter(|n| *n >= 0.0 && *n <= u32::MAX as f64)
            .map(|n| n as u32),
    }))
}

pub fn flexible_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(number_from)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Item {
        #[serde(default, deserialize_with = "first_string")]
        venue: Option<String>,
        #[serde(default, deserialize_with = "joined_string")]
        description: Option<String>,
        #[serde(default, deserialize_with = "string_list")]
        subject: Vec<String>,
        #[serde(default, deserialize_with = "flexible_f64")]
        length: Option<f64>,
        #[serde(default, deserialize_with = "flexible_u32")]
        track: Option<u32>,
        #[serde(default, deserialize_with = "flexible_u64")]
        size: Option<u64>,
    }

    fn parse(json: &str) -> Item {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_string_or_array() {
        let item = parse(r#"{"venue": "Winterland"}"#);
        assert_eq!(item.venue.as_deref(), Some("Winterland"));

        let item = parse(r#"{"venue": ["", "Winterland Arena", "Winterland"]}"#);
        assert_eq!(item.venue.as_deref(), Some("Winterland Arena"));

        let item = parse(r#"{"venue": null, "description": ["Set 1", "Set 2"]}"#);
        assert!(item.venue.is_none());
        assert_eq!(item.description.as_deref(), Some("Set 1; Set 2"));

        let item = parse(r#"{"venue": "   ", "subject": "Grateful Dead"}"#);
        assert!(item.venue.is_none());
        assert_eq!(item.subject, vec!["Grateful Dead".to_string()]);

        let item = parse(r#"{"subject": ["Live", 1977, null]}"#);
        assert_eq!(item.subject, vec!["Live".to_string(), "1977".to_string()]);
    }

    #[test]
    fn test_missing_fields_default() {
        let item = parse("{}");
        assert!(item.venue.is_none());
        assert!(item.subject.is_empty());
        assert!(item.length.is_none());
    }

    #[test]
    fn test_numbers() {
        let item = parse(r#"{"length": "671.32", "track": "03", "size": "16000000"}"#);
        assert_eq!(item.length, Some(671.32));
        assert_eq!(item.track, Some(3));
        assert_eq!(item.size, Some(16_000_000));

        let item = parse(r#"{"length": "11:11", "track": "2/12", "size": 42}"#);
        assert_eq!(item.length, Some(671.0));
        assert_eq!(item.track, Some(2));
        assert_eq!(item.size, Some(42));

        let item = parse(r#"{"length": "unknown", "track": "a", "size": -1}"#);
        assert!(item.length.is_none());
        assert!(item.track.is_none());
        assert!(item.size.is_none());
    }
}
