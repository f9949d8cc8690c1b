//! Normalized artwork metadata

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Canonical key to string value, kept in key order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert, replacing any previous value. Blank values are ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }
        self.0.insert(key.into(), trimmed.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge `fresh` into `self`. Keys already present keep their value.
    ///
    /// Returns the number of keys added.
    pub fn merge_missing(&mut self, fresh: Metadata) -> usize {
        let mut added = 0;
        for (key, value) in fresh.0 {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.0.entry(key) {
                slot.insert(value);
                added += 1;
            }
        }
        added
    }
}

impl FromIterator<(String, String)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut m = Metadata::new();
        for (k, v) in iter {
            m.insert(k, v);
        }
        m
    }
}

/// Render a JSON scalar as metadata text; null, arrays and objects yield `None`
pub fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// Older manifests store `null` for "no metadata" and occasionally numbers.
impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(k, v)| scalar_to_string(&v).map(|s| (k, s)))
            .collect())
    }
}
