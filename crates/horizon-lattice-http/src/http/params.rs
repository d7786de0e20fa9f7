//! Request parameters.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{NetworkError, Result};

/// Request parameters, kept sorted by key.
///
/// Parameters are encoded into the query string or the body depending on the
/// method and serializer. Because the map is ordered (and `serde_json` objects
/// are ordered too), two parameter sets with the same content always produce
/// the same canonical form regardless of insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Parameters(BTreeMap<String, Value>);

impl Parameters {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build parameters from any value that serializes to a JSON object.
    ///
    /// `()`/`None` produce an empty set. Anything other than an object or
    /// null is rejected with [`NetworkError::Serialization`].
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(NetworkError::Serialization(format!(
                "parameters must serialize to an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Insert a parameter, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a parameter by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Flatten into string pairs for form/query encoding.
    ///
    /// Strings are used verbatim, null becomes an empty string, other scalars
    /// use their JSON text, and arrays/objects are encoded as compact JSON.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Canonical text used for cache keys.
    ///
    /// Keys are sorted at every nesting level.
    pub fn canonical(&self) -> String {
        let map: serde_json::Map<String, Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), sorted(v)))
            .collect();
        Value::Object(map).to_string()
    }

    /// Borrow as a JSON object value for JSON bodies.
    pub(crate) fn to_json(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Copy of `value` with object keys inserted in sorted order.
///
/// `serde_json::Map` keeps insertion order when `preserve_order` is enabled.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_serialize_object() {
        let params = Parameters::from_serialize(&json!({"b": 2, "a": "x"})).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a"), Some(&json!("x")));
    }

    #[test]
    fn test_from_serialize_null_is_empty() {
        let params = Parameters::from_serialize(&()).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn test_from_serialize_rejects_non_object() {
        let err = Parameters::from_serialize(&vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, NetworkError::Serialization(_)));
    }

    #[test]
    fn test_canonical_ignores_insertion_order() {
        let a = Parameters::new()
            .with("page", 1)
            .with("filter", json!({"z": true, "a": [1, 2]}));
        let b = Parameters::from_serialize(&json!({
            "filter": {"a": [1, 2], "z": true},
            "page": 1
        }))
        .unwrap();
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_canonical_sorts_nested_keys() {
        let params = Parameters::new().with(
            "outer",
            json!({"b": {"y": 1, "x": 2}, "a": [{"d": 1, "c": 2}]}),
        );
        assert_eq!(
            params.canonical(),
            r#"{"outer":{"a":[{"c":2,"d":1}],"b":{"x":2,"y":1}}}"#
        );
    }

    #[test]
    fn test_to_pairs() {
        let params = Parameters::new()
            .with("name", "lattice")
            .with("count", 3)
            .with("tags", json!(["a", "b"]))
            .with("none", Value::Null);
        let pairs = params.to_pairs();
        assert_eq!(
            pairs,
            vec![
                ("count".to_string(), "3".to_string()),
                ("name".to_string(), "lattice".to_string()),
                ("none".to_string(), String::new()),
                ("tags".to_string(), "[\"a\",\"b\"]".to_string()),
            ]
        );
    }
}
