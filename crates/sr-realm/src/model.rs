//! The committed set of realm definitions.

use std::collections::BTreeMap;

use sr_core::{Error, Result};

use crate::definition::RealmDefinition;

/// Realm definitions keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealmModel {
    realms: BTreeMap<String, RealmDefinition>,
}

impl RealmModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The definition of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RealmDefinition> {
        self.realms.get(name)
    }

    /// Whether `name` is defined.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.realms.contains_key(name)
    }

    /// Realm names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.realms.keys().cloned().collect()
    }

    /// Iterates over definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &RealmDefinition> {
        self.realms.values()
    }

    /// Number of realms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.realms.len()
    }

    /// Whether no realm is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.realms.is_empty()
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Result<&mut RealmDefinition> {
        self.realms
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("realm '{name}'")))
    }

    pub(crate) fn insert(&mut self, definition: RealmDefinition) {
        self.realms.insert(definition.name.clone(), definition);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<RealmDefinition> {
        self.realms.remove(name)
    }
}
