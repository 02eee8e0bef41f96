//! Lenient JSON extraction from oracle text.
//!
//! Oracles are asked for raw JSON but often wrap it in markdown fences or
//! surround it with prose. These helpers pull out the first JSON object and
//! read loosely typed fields from it.

use serde::Deserialize;
use serde_json::Value;

/// Strip markdown code fences, returning the fenced body or the trimmed text.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    text
}

/// The first JSON object found in `text`, fenced or bare.
pub fn parse_json_object(text: &str) -> Option<Value> {
    let candidate = extract_json(text);
    if let Ok(value) = serde_json::from_str::<Value>(candidate)
        && value.is_object()
    {
        return Some(value);
    }
    for (idx, ch) in text.char_indices() {
        if ch != '{' {
            continue;
        }
        let mut deserializer = serde_json::Deserializer::from_str(&text[idx..]);
        if let Ok(value) = Value::deserialize(&mut deserializer)
            && value.is_object()
        {
            return Some(value);
        }
    }
    None
}

/// Trimmed non-empty string at `key`.
pub fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// List of strings at `key`. A single string is split on commas.
pub fn string_list(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Boolean at `key`, accepting `"true"`/`"yes"` strings.
pub fn bool_field(value: &Value, key: &str) -> Option<bool> {
    match value.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        _ => None,
    }
}

/// Number at `key`, accepting numeric strings.
pub fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// At most `max` characters of `text`, for logs and error messages.
pub fn snippet(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// First of `keys` present in `value`; lets callers accept aliases.
pub fn first_key<'a>(value: &Value, keys: &[&'a str]) -> Option<&'a str> {
    keys.iter().copied().find(|k| value.get(*k).is_some())
}
