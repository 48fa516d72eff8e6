//! Realm registry.
//!
//! Process-wide mapping from realm name to the assembled [`SecurityRealm`].
//! Consumers hold a [`RealmRegistry`] and may only look realms up; the
//! configuration layer holds the single [`RealmRegistrar`] created alongside
//! it and is the only party able to publish or withdraw realms.
//!
//! Entries are `Arc` handles replaced under a write lock. A reader clones the
//! handle and releases the lock immediately, so it observes either the old
//! or the new realm, never a partially built one, and never holds the lock
//! while authenticating.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use sr_core::{Error, Result};

use crate::mechanism::SecurityRealm;

/// Capability check invoked before every lookup.
///
/// Hosts that restrict realm access to trusted code install their own
/// guard; everybody else uses [`PermitAll`].
pub trait LookupGuard: Send + Sync {
    /// Checks whether the caller may look up `realm`.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::PermissionDenied`] to refuse the lookup.
    fn check(&self, realm: &str) -> Result<()>;
}

/// Guard that allows every lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAll;

impl LookupGuard for PermitAll {
    fn check(&self, _realm: &str) -> Result<()> {
        Ok(())
    }
}

/// Guard refusing every lookup, for hosts that wire realms explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl LookupGuard for DenyAll {
    fn check(&self, realm: &str) -> Result<()> {
        Err(Error::PermissionDenied(format!("lookup of realm '{realm}'")))
    }
}

struct Inner {
    realms: RwLock<HashMap<String, Arc<dyn SecurityRealm>>>,
    guard: Arc<dyn LookupGuard>,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.realms.read().keys().cloned().collect();
        names.sort_unstable();
        f.debug_struct("RealmRegistry").field("realms", &names).finish()
    }
}

/// Read-only view of the realm registry.
#[derive(Debug, Clone)]
pub struct RealmRegistry {
    inner: Arc<Inner>,
}

impl RealmRegistry {
    /// Creates a registry with the permissive guard and its registrar.
    #[must_use]
    pub fn channel() -> (Self, RealmRegistrar) {
        Self::with_guard(Arc::new(PermitAll))
    }

    /// Creates a registry protected by `guard` and its registrar.
    #[must_use]
    pub fn with_guard(guard: Arc<dyn LookupGuard>) -> (Self, RealmRegistrar) {
        let inner = Arc::new(Inner {
            realms: RwLock::new(HashMap::new()),
            guard,
        });
        (
            Self {
                inner: Arc::clone(&inner),
            },
            RealmRegistrar { inner },
        )
    }

    /// Looks up the realm registered under `name`.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::PermissionDenied`] if the guard refuses the lookup.
    pub fn lookup(&self, name: &str) -> Result<Option<Arc<dyn SecurityRealm>>> {
        self.inner.guard.check(name)?;
        Ok(self.inner.realms.read().get(name).cloned())
    }

    /// Lists registered realm names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.realms.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

/// Write access to the realm registry.
///
/// Deliberately not `Clone`: there is one writer per registry.
#[derive(Debug)]
pub struct RealmRegistrar {
    inner: Arc<Inner>,
}

impl RealmRegistrar {
    /// Publishes `realm` under `name`, replacing any previous handle.
    pub fn register(&self, name: impl Into<String>, realm: Arc<dyn SecurityRealm>) {
        let name = name.into();
        tracing::debug!(realm = %name, "publishing realm");
        self.inner.realms.write().insert(name, realm);
    }

    /// Withdraws the realm registered under `name`. No-op when absent.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn SecurityRealm>> {
        let removed = self.inner.realms.write().remove(name);
        if removed.is_some() {
            tracing::debug!(realm = %name, "withdrew realm");
        }
        removed
    }

    /// Publishes and withdraws several realms under a single write lock.
    pub fn apply(
        &self,
        publish: Vec<(String, Arc<dyn SecurityRealm>)>,
        withdraw: &[String],
    ) {
        let mut realms = self.inner.realms.write();
        for name in withdraw {
            realms.remove(name);
        }
        for (name, realm) in publish {
            realms.insert(name, realm);
        }
    }

    /// Returns a read-only view of the same registry.
    #[must_use]
    pub fn reader(&self) -> RealmRegistry {
        RealmRegistry {
            inner: Arc::clone(&self.inner),
        }
    }
}
