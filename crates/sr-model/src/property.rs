//! Mechanism property lists.
//!
//! A property list is the name/value configuration attached to a mechanism
//! (plug-in options, advertised mechanism options). Keys are unique. A key
//! may be present without a value, which mechanisms treat differently from
//! an absent key.
//!
//! In serialized form a valueless property is written as an empty string.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Name/value options for a mechanism.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct PropertyList {
    entries: BTreeMap<String, Option<String>>,
}

impl PropertyList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property, failing if the key is already present.
    ///
    /// ## Errors
    ///
    /// Returns [`ModelError::DuplicateProperty`] if `key` exists.
    pub fn add(&mut self, key: impl Into<String>, value: Option<String>) -> ModelResult<()> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(ModelError::DuplicateProperty(key));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Sets a property, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Option<String>) {
        self.entries.insert(key.into(), value);
    }

    /// Builder-style [`set`](Self::set) with a value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, Some(value.into()));
        self
    }

    /// Builder-style [`set`](Self::set) without a value.
    #[must_use]
    pub fn with_flag(mut self, key: impl Into<String>) -> Self {
        self.set(key, None);
        self
    }

    /// Removes a property, returning whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Returns the value of `key`: `None` if absent, `Some(None)` if present
    /// without a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.entries.get(key).map(Option::as_deref)
    }

    /// Returns the value of `key` when it is present with a value.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).flatten()
    }

    /// Parses the value of `key` as a boolean.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.value(key).and_then(|v| v.parse().ok())
    }

    /// Whether `key` is present, with or without a value.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<BTreeMap<String, String>> for PropertyList {
    fn from(map: BTreeMap<String, String>) -> Self {
        let entries = map
            .into_iter()
            .map(|(k, v)| (k, if v.is_empty() { None } else { Some(v) }))
            .collect();
        Self { entries }
    }
}

impl From<PropertyList> for BTreeMap<String, String> {
    fn from(list: PropertyList) -> Self {
        list.entries
            .into_iter()
            .map(|(k, v)| (k, v.unwrap_or_default()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertyList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = Self::new();
        for (k, v) in iter {
            list.set(k, Some(v.into()));
        }
        list
    }
}
