use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// A named feature value. Extractors (§4.3) only ever produce these three shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(n) => Some(*n),
            FeatureValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FeatureValue::Text(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FeatureValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Number(v as f64)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

/// A mapping from named keys (event-type dependent) to feature values, §3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Features(pub HashMap<String, FeatureValue>);

impl Features {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FeatureValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FeatureValue> {
        self.0.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(FeatureValue::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.0
            .get(key)
            .and_then(FeatureValue::as_bool)
            .unwrap_or(false)
    }

    /// The numeric subset of the map, ints/floats/bools -> 1/0, used as the anomaly
    /// detector's feature vector (§4.4). Ordered by key so vector layout is stable.
    pub fn numeric_vector(&self) -> Vec<(String, f64)> {
        let mut pairs: Vec<(String, f64)> = self
            .0
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(&self.0).unwrap_or(JsonValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_vector_excludes_text_and_is_sorted() {
        let mut f = Features::new();
        f.insert("b_flag", true);
        f.insert("a_count", 3.0);
        f.insert("name", "mimikatz.exe");

        let v = f.numeric_vector();
        assert_eq!(v, vec![("a_count".to_string(), 3.0), ("b_flag".to_string(), 1.0)]);
    }
}
