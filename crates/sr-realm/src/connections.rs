//! Outbound directory connections realms refer to by name.

use std::sync::Arc;

use dashmap::DashMap;
use sr_ldap::ConnectionHandler;

/// Named directory connections shared by every realm.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, Arc<dyn ConnectionHandler>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous handler.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn ConnectionHandler>) {
        let name = name.into();
        tracing::debug!(connection = %name, "registering outbound connection");
        self.connections.insert(name, handler);
    }

    /// Returns the handler registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ConnectionHandler>> {
        self.connections.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    /// Removes the handler registered under `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn ConnectionHandler>> {
        self.connections.remove(name).map(|(_, handler)| handler)
    }
}
