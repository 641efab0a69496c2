use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An owned, case-insensitive copy of a request's headers.
///
/// Names are stored lowercased; values keep their order of arrival.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderSnapshot(BTreeMap<String, Vec<String>>);

impl HeaderSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value of `name`, if any. An empty name never matches.
    pub fn get(&self, name: &str) -> Option<&str> {
        if name.is_empty() {
            return None;
        }
        self.0
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Copy of this snapshot with the named headers removed.
    pub fn without(&self, names: &[String]) -> Self {
        let mut filtered = self.clone();
        for name in names {
            filtered.0.remove(&name.to_ascii_lowercase());
        }
        filtered
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for HeaderSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut snapshot = HeaderSnapshot::new();
        for (name, value) in iter {
            snapshot.append(name.as_ref(), value);
        }
        snapshot
    }
}
