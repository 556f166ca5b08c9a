//! Feature extraction from request payloads
//!
//! Request features are either a nested mapping or a bare string. Both are
//! turned into a flat, sparse map of numeric features.

use crate::error::ModelError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Sparse numeric features keyed by name
pub type FeatureMap = BTreeMap<String, f64>;

/// Flatten request features into numeric features.
///
/// - nested keys are joined with `.`
/// - booleans become 0/1
/// - string values become `key=value` indicators
/// - a bare string becomes lower-cased token counts
/// - nulls are dropped
pub fn extract_features(features: &Value) -> Result<FeatureMap, ModelError> {
    match features {
        Value::Object(map) => {
            let mut out = FeatureMap::new();
            flatten_object("", map, &mut out);
            Ok(out)
        }
        Value::String(text) => Ok(tokenize(text)),
        other => Err(ModelError::InvalidFeatures(format!(
            "expected a mapping or a string, got {}",
            other
        ))),
    }
}

fn flatten_object(prefix: &str, map: &Map<String, Value>, out: &mut FeatureMap) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        insert_value(name, value, out);
    }
}

fn insert_value(name: String, value: &Value, out: &mut FeatureMap) {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            out.insert(name, if *b { 1.0 } else { 0.0 });
        }
        Value::Number(n) => {
            if let Some(v) = n.as_f64() {
                out.insert(name, v);
            }
        }
        Value::String(s) => {
            out.insert(format!("{}={}", name, s), 1.0);
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                insert_value(format!("{}.{}", name, i), item, out);
            }
        }
        Value::Object(map) => flatten_object(&name, map, out),
    }
}

fn tokenize(text: &str) -> FeatureMap {
    let mut counts = FeatureMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *counts.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_mapping() {
        let x = extract_features(&json!({
            "distance": 2.5,
            "rush_hour": true,
            "vendor": "acme",
            "pickup": {"lat": 40.7, "zone": null},
            "history": [1, 2]
        }))
        .unwrap();

        assert_eq!(x["distance"], 2.5);
        assert_eq!(x["rush_hour"], 1.0);
        assert_eq!(x["vendor=acme"], 1.0);
        assert_eq!(x["pickup.lat"], 40.7);
        assert!(!x.contains_key("pickup.zone"));
        assert_eq!(x["history.0"], 1.0);
        assert_eq!(x["history.1"], 2.0);
    }

    #[test]
    fn test_string_becomes_token_counts() {
        let x = extract_features(&json!("Free money, FREE prizes!")).unwrap();
        assert_eq!(x["free"], 2.0);
        assert_eq!(x["money"], 1.0);
        assert_eq!(x["prizes"], 1.0);
        assert_eq!(x.len(), 3);
    }

    #[test]
    fn test_empty_mapping_is_valid() {
        assert!(extract_features(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_scalars() {
        assert!(extract_features(&json!(3)).is_err());
        assert!(extract_features(&json!(null)).is_err());
    }
}
