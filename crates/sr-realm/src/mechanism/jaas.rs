//! Login-context authentication.
//!
//! The host registers named [`LoginContext`]s; a realm refers to one by
//! name. Until that name is registered the mechanism is not ready, so a
//! realm can be configured before the host finishes wiring its login
//! modules.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::SecretString;
use sr_core::{Error, Result};
use sr_spi::{
    AuthMechanism, AuthenticatedIdentity, AuthenticationProvider, CredentialHandler, Credentials,
    Evidence,
};

/// A host-supplied login routine.
pub trait LoginContext: Send + Sync + Debug {
    /// Checks `password` for `username` and returns the user's groups.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::AuthenticationFailed`] to reject the login.
    fn login(&self, username: &str, password: &SecretString) -> Result<Vec<String>>;
}

/// Login contexts by name. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct LoginContextRegistry {
    contexts: Arc<DashMap<String, Arc<dyn LoginContext>>>,
}

impl LoginContextRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `context` under `name`.
    pub fn register(&self, name: impl Into<String>, context: Arc<dyn LoginContext>) {
        self.contexts.insert(name.into(), context);
    }

    /// Returns the context registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn LoginContext>> {
        self.contexts.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.contexts.contains_key(name)
    }
}

/// Authentication through a named login context.
#[derive(Debug)]
pub struct JaasAuthentication {
    name: String,
    registry: LoginContextRegistry,
    assign_groups: bool,
}

impl JaasAuthentication {
    /// Creates the mechanism.
    #[must_use]
    pub fn new(name: impl Into<String>, registry: LoginContextRegistry, assign_groups: bool) -> Self {
        Self {
            name: name.into(),
            registry,
            assign_groups,
        }
    }
}

impl AuthenticationProvider for JaasAuthentication {
    fn preferred_mechanism(&self) -> AuthMechanism {
        AuthMechanism::Plain
    }

    fn is_ready(&self) -> bool {
        self.registry.contains(&self.name)
    }

    fn credential_handler(&self) -> Result<Arc<dyn CredentialHandler>> {
        let context = self
            .registry
            .get(&self.name)
            .ok_or_else(|| Error::not_ready(format!("login context '{}' is not registered", self.name)))?;
        let handler: Arc<dyn CredentialHandler> = Arc::new(LoginHandler {
            context,
            assign_groups: self.assign_groups,
        });
        Ok(handler)
    }
}

#[derive(Debug)]
struct LoginHandler {
    context: Arc<dyn LoginContext>,
    assign_groups: bool,
}

#[async_trait]
impl CredentialHandler for LoginHandler {
    async fn verify(&self, credentials: &Credentials) -> Result<AuthenticatedIdentity> {
        let Evidence::Password(password) = &credentials.evidence else {
            return Err(Error::AuthenticationFailed);
        };
        let groups = self.context.login(&credentials.username, password)?;
        let mut identity = AuthenticatedIdentity::new(credentials.username.clone());
        if self.assign_groups {
            identity.groups = groups;
        }
        Ok(identity)
    }
}
