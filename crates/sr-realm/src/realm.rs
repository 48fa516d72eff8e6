//! Assembled realms.
//!
//! A [`Realm`] combines one authentication mechanism with an optional
//! authorization mechanism and is what the registry hands to consumers.
//! [`BuildContext`] turns a validated [`RealmDefinition`] into a realm.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sr_core::{Error, EventType, Result, SecurityEvent};
use sr_ldap::{ConnectionHandler, LdapAuthenticationProvider, LdapSubjectSupplemental};
use sr_model::{PrincipalKind, PropertyList, RealmPrincipal, Subject};
use sr_spi::{
    AuthMechanism, AuthenticationProvider, Credentials, PluginRegistry, SecurityRealm,
    SubjectSupplemental,
};

use crate::connections::ConnectionRegistry;
use crate::definition::{AuthenticationDefinition, AuthorizationDefinition, RealmDefinition};
use crate::mechanism::{
    JaasAuthentication, KerberosAuthentication, LoginContextRegistry, PropertiesAuthentication,
    PropertiesAuthorization, UsersAuthentication,
};

/// A running realm.
pub struct Realm {
    name: String,
    authentication: Arc<dyn AuthenticationProvider>,
    authorization: Option<Arc<dyn SubjectSupplemental>>,
    map_groups_to_roles: bool,
}

impl Realm {
    /// Assembles a realm.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        authentication: Arc<dyn AuthenticationProvider>,
        authorization: Option<Arc<dyn SubjectSupplemental>>,
    ) -> Self {
        Self {
            name: name.into(),
            authentication,
            authorization,
            map_groups_to_roles: false,
        }
    }

    /// Adds a role principal for every group principal.
    #[must_use]
    pub const fn map_groups_to_roles(mut self, enabled: bool) -> Self {
        self.map_groups_to_roles = enabled;
        self
    }

    /// Whether groups are mapped to roles.
    #[must_use]
    pub const fn maps_groups_to_roles(&self) -> bool {
        self.map_groups_to_roles
    }

    /// Whether an authorization mechanism is mounted.
    #[must_use]
    pub const fn has_authorization(&self) -> bool {
        self.authorization.is_some()
    }

    async fn establish(&self, credentials: &Credentials) -> Result<Subject> {
        let handler = self.authentication.credential_handler()?;
        let identity = handler.verify(credentials).await?;

        let mut subject = Subject::for_user(RealmPrincipal::user_in(&self.name, identity.name)?);
        for group in &identity.groups {
            subject.add(RealmPrincipal::group_in(&self.name, group)?);
        }

        if let Some(authorization) = &self.authorization {
            authorization.supplement(&mut subject, &identity.state).await?;
        }

        if self.map_groups_to_roles {
            let groups: Vec<String> = subject.groups().into_iter().map(str::to_string).collect();
            for group in groups {
                subject.add(RealmPrincipal::with_realm(PrincipalKind::Role, &self.name, group)?);
            }
        }
        Ok(subject)
    }
}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("name", &self.name)
            .field("authentication", &self.authentication)
            .field("authorization", &self.authorization)
            .field("map_groups_to_roles", &self.map_groups_to_roles)
            .finish()
    }
}

#[async_trait]
impl SecurityRealm for Realm {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_mechanisms(&self) -> Vec<AuthMechanism> {
        let mut mechanisms = vec![self.authentication.preferred_mechanism()];
        for mechanism in self.authentication.supplemental_mechanisms() {
            if !mechanisms.contains(&mechanism) {
                mechanisms.push(mechanism);
            }
        }
        mechanisms
    }

    fn mechanism_options(&self, mechanism: AuthMechanism) -> PropertyList {
        if self.authentication.supports(mechanism) {
            self.authentication.mechanism_options(mechanism)
        } else {
            PropertyList::new()
        }
    }

    fn is_ready(&self, mechanism: AuthMechanism) -> bool {
        self.authentication.supports(mechanism) && self.authentication.is_ready()
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Subject> {
        if !self.authentication.is_ready() {
            return Err(Error::not_ready(format!(
                "realm '{}' has not finished setting up {}",
                self.name,
                self.authentication.preferred_mechanism().as_str()
            )));
        }

        match self.establish(credentials).await {
            Ok(subject) => {
                SecurityEvent::builder(EventType::AuthenticationSucceeded)
                    .realm(&self.name)
                    .principal(&credentials.username)
                    .detail("evidence", credentials.evidence.label())
                    .emit();
                Ok(subject)
            }
            Err(e) => {
                SecurityEvent::builder(EventType::AuthenticationFailed)
                    .realm(&self.name)
                    .principal(&credentials.username)
                    .failure(e.to_string())
                    .emit();
                Err(e)
            }
        }
    }
}

/// Everything needed to turn definitions into running mechanisms.
///
/// Clones share the same registries.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    /// Outbound directory connections.
    pub connections: ConnectionRegistry,
    /// Plug-in factories.
    pub plugins: Arc<PluginRegistry>,
    /// Host login contexts.
    pub login_contexts: LoginContextRegistry,
}

impl BuildContext {
    /// Creates a context with empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a realm from a definition that passed validation.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::ConfigurationInvalid`] if the mechanism counts are
    /// wrong, or any error raised while constructing a mechanism (unreadable
    /// file, unknown connection, plug-in resolution failure).
    pub fn build_realm(&self, definition: &RealmDefinition) -> Result<Realm> {
        let [authentication] = definition.authentication.as_slice() else {
            return Err(Error::config(format!(
                "realm '{}' must have exactly one authentication mechanism",
                definition.name
            )));
        };
        let authorization = match definition.authorization.as_slice() {
            [] => None,
            [authorization] => Some(self.build_authorization(definition, authorization)?),
            _ => {
                return Err(Error::config(format!(
                    "realm '{}' has conflicting authorization mechanisms",
                    definition.name
                )))
            }
        };
        let authentication = self.build_authentication(definition, authentication)?;

        tracing::debug!(
            realm = %definition.name,
            mechanism = ?authentication.preferred_mechanism(),
            authorization = authorization.is_some(),
            "built realm"
        );
        Ok(Realm::new(definition.name.clone(), authentication, authorization)
            .map_groups_to_roles(definition.map_groups_to_roles))
    }

    fn build_authentication(
        &self,
        realm: &RealmDefinition,
        definition: &AuthenticationDefinition,
    ) -> Result<Arc<dyn AuthenticationProvider>> {
        let provider: Arc<dyn AuthenticationProvider> = match definition {
            AuthenticationDefinition::Properties { path, plain_text } => {
                Arc::new(PropertiesAuthentication::load(path, &realm.name, *plain_text)?)
            }
            AuthenticationDefinition::Users { users } => {
                Arc::new(UsersAuthentication::new(&realm.name, users))
            }
            AuthenticationDefinition::Ldap {
                connection,
                user_search,
                allow_empty_passwords,
            } => Arc::new(
                LdapAuthenticationProvider::new(self.connection(connection)?, user_search.build()?)
                    .allow_empty_passwords(*allow_empty_passwords),
            ),
            AuthenticationDefinition::Kerberos { remove_realm } => {
                Arc::new(KerberosAuthentication::new(realm.keytab_count(), *remove_realm))
            }
            AuthenticationDefinition::Jaas { name, assign_groups } => Arc::new(
                JaasAuthentication::new(name.clone(), self.login_contexts.clone(), *assign_groups),
            ),
            AuthenticationDefinition::Plugin { name, properties } => {
                self.plugins
                    .load_authentication(&realm.plugin_modules, name, properties)?
            }
        };
        Ok(provider)
    }

    fn build_authorization(
        &self,
        realm: &RealmDefinition,
        definition: &AuthorizationDefinition,
    ) -> Result<Arc<dyn SubjectSupplemental>> {
        let supplemental: Arc<dyn SubjectSupplemental> = match definition {
            AuthorizationDefinition::Properties { path } => {
                Arc::new(PropertiesAuthorization::load(path)?)
            }
            AuthorizationDefinition::Ldap {
                connection,
                username_to_dn,
                group_search,
            } => {
                let connection = match connection {
                    Some(name) => name.as_str(),
                    None => ldap_authentication_connection(realm).ok_or_else(|| {
                        Error::config(format!(
                            "LDAP authorization in realm '{}' needs a connection",
                            realm.name
                        ))
                    })?,
                };
                let user_searcher = username_to_dn.as_ref().map(|s| s.build()).transpose()?;
                let force = username_to_dn.as_ref().is_some_and(|s| s.force_search());
                Arc::new(
                    LdapSubjectSupplemental::new(
                        self.connection(connection)?,
                        user_searcher,
                        group_search.build()?,
                        group_search.group_name(),
                    )
                    .force(force),
                )
            }
            AuthorizationDefinition::Plugin { name, properties } => {
                self.plugins
                    .load_authorization(&realm.plugin_modules, name, properties)?
            }
        };
        Ok(supplemental)
    }

    fn connection(&self, name: &str) -> Result<Arc<dyn ConnectionHandler>> {
        self.connections
            .get(name)
            .ok_or_else(|| Error::config(format!("outbound connection '{name}' does not exist")))
    }
}

/// The connection of the realm's LDAP authentication mechanism, if any.
pub(crate) fn ldap_authentication_connection(realm: &RealmDefinition) -> Option<&str> {
    realm.authentication.iter().find_map(|m| match m {
        AuthenticationDefinition::Ldap { connection, .. } => Some(connection.as_str()),
        _ => None,
    })
}
