//! Mechanism selection and validation.
//!
//! A [`Change`] is a sequence of [`Operation`]s applied as a unit. Processing
//! runs in three stages:
//!
//! 1. **Apply**: every operation is applied to a working copy of the
//!    [`RealmModel`]. Outside of boot, each operation schedules the
//!    validation steps it can invalidate.
//! 2. **Validate**: once all operations are applied, the scheduled steps run
//!    in order, each at most once. A booting change instead validates every
//!    touched realm once, so a bulk load is not rejected half way through.
//! 3. **Activate**: every realm that needs a restart is built, then all of
//!    them are published to the registry together.
//!
//! Any failure discards the working copy. The committed model and the
//! registry are left exactly as they were.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use sr_core::{Error, EventType, Result, SecurityEvent};
use sr_spi::{RealmRegistrar, SecurityRealm};

use crate::definition::{
    AuthenticationDefinition, AuthorizationDefinition, KerberosIdentity, KeytabDefinition,
    MechanismKind, RealmDefinition,
};
use crate::model::RealmModel;
use crate::realm::{ldap_authentication_connection, BuildContext};

// ============================================================================
// Operations
// ============================================================================

/// One configuration operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Adds a realm together with any mechanisms it already defines.
    AddRealm(RealmDefinition),
    /// Removes a realm.
    RemoveRealm {
        /// Realm name.
        realm: String,
    },
    /// Adds an authentication mechanism.
    AddAuthentication {
        /// Realm name.
        realm: String,
        /// The mechanism.
        mechanism: AuthenticationDefinition,
    },
    /// Replaces the authentication mechanism of the same kind.
    UpdateAuthentication {
        /// Realm name.
        realm: String,
        /// The new mechanism.
        mechanism: AuthenticationDefinition,
    },
    /// Removes the authentication mechanism of `kind`.
    RemoveAuthentication {
        /// Realm name.
        realm: String,
        /// Mechanism kind.
        kind: MechanismKind,
    },
    /// Adds an authorization mechanism.
    AddAuthorization {
        /// Realm name.
        realm: String,
        /// The mechanism.
        mechanism: AuthorizationDefinition,
    },
    /// Replaces the authorization mechanism of the same kind.
    UpdateAuthorization {
        /// Realm name.
        realm: String,
        /// The new mechanism.
        mechanism: AuthorizationDefinition,
    },
    /// Removes the authorization mechanism of `kind`.
    RemoveAuthorization {
        /// Realm name.
        realm: String,
        /// Mechanism kind.
        kind: MechanismKind,
    },
    /// Toggles group-to-role mapping. Takes effect on reload.
    SetMapGroupsToRoles {
        /// Realm name.
        realm: String,
        /// New value.
        enabled: bool,
    },
    /// Declares the realm's Kerberos server identity, with no keytab.
    AddKerberosIdentity {
        /// Realm name.
        realm: String,
    },
    /// Adds a keytab to the Kerberos server identity.
    AddKeytab {
        /// Realm name.
        realm: String,
        /// The keytab.
        keytab: KeytabDefinition,
    },
    /// Removes the keytab for `principal`.
    RemoveKeytab {
        /// Realm name.
        realm: String,
        /// Service principal of the keytab.
        principal: String,
    },
    /// Declares a module plug-ins are loaded from.
    AddPluginModule {
        /// Realm name.
        realm: String,
        /// Module name.
        module: String,
    },
}

/// What an operation requires before it takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Restart {
    /// The running realm is kept until the host reloads.
    Reload,
    /// The realm is rebuilt and swapped in the registry.
    ResourceServices,
}

impl Operation {
    /// The realm the operation targets.
    #[must_use]
    pub fn realm(&self) -> &str {
        match self {
            Self::AddRealm(definition) => &definition.name,
            Self::RemoveRealm { realm }
            | Self::AddAuthentication { realm, .. }
            | Self::UpdateAuthentication { realm, .. }
            | Self::RemoveAuthentication { realm, .. }
            | Self::AddAuthorization { realm, .. }
            | Self::UpdateAuthorization { realm, .. }
            | Self::RemoveAuthorization { realm, .. }
            | Self::SetMapGroupsToRoles { realm, .. }
            | Self::AddKerberosIdentity { realm }
            | Self::AddKeytab { realm, .. }
            | Self::RemoveKeytab { realm, .. }
            | Self::AddPluginModule { realm, .. } => realm,
        }
    }

    /// What the operation requires before it takes effect.
    #[must_use]
    pub const fn restart(&self) -> Restart {
        match self {
            Self::SetMapGroupsToRoles { .. } => Restart::Reload,
            _ => Restart::ResourceServices,
        }
    }
}

/// A set of operations applied as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Change {
    /// Part of the initial bulk load.
    pub booting: bool,
    /// Operations in application order.
    pub operations: Vec<Operation>,
}

impl Change {
    /// Creates an empty runtime change.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty booting change.
    #[must_use]
    pub fn booting() -> Self {
        Self {
            booting: true,
            operations: Vec::new(),
        }
    }

    /// Appends an operation.
    #[must_use]
    pub fn with(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }
}

/// Result of an accepted change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeOutcome {
    /// Realms built and published.
    pub restarted: Vec<String>,
    /// Realms withdrawn from the registry.
    pub removed: Vec<String>,
    /// Realms whose running instance is stale until [`MechanismProtocol::reload`].
    pub reload_required: Vec<String>,
}

// ============================================================================
// Validation steps
// ============================================================================

/// Check run when group-to-role mapping is switched off.
///
/// Hosts that derive access control from roles install a check that refuses
/// the change while the realm is still relied upon.
pub trait RbacCheck: Send + Sync {
    /// Checks whether `realm` may stop mapping groups to roles.
    ///
    /// ## Errors
    ///
    /// Returns an error to reject the change.
    fn check(&self, realm: &str) -> Result<()>;
}

/// Check that accepts every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitRbac;

impl RbacCheck for PermitRbac {
    fn check(&self, _realm: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Authentication(String),
    Authorization(String),
    Kerberos(String),
    References(String),
    Rbac(String),
}

impl Step {
    fn realm(&self) -> &str {
        match self {
            Self::Authentication(realm)
            | Self::Authorization(realm)
            | Self::Kerberos(realm)
            | Self::References(realm)
            | Self::Rbac(realm) => realm,
        }
    }
}

#[derive(Debug, Default)]
struct Schedule {
    steps: Vec<Step>,
}

impl Schedule {
    fn push(&mut self, step: Step) {
        if !self.steps.contains(&step) {
            self.steps.push(step);
        }
    }

    fn full(&mut self, realm: &str) {
        self.push(Step::Authentication(realm.to_string()));
        self.push(Step::Authorization(realm.to_string()));
        self.push(Step::Kerberos(realm.to_string()));
        self.push(Step::References(realm.to_string()));
    }
}

// ============================================================================
// Protocol
// ============================================================================

/// Owns the committed realm model and the registry's write handle.
///
/// Changes take `&mut self`, so they are serialized by construction.
pub struct MechanismProtocol {
    model: RealmModel,
    registrar: RealmRegistrar,
    context: BuildContext,
    rbac: Arc<dyn RbacCheck>,
    reload_required: BTreeSet<String>,
}

impl MechanismProtocol {
    /// Creates a protocol publishing through `registrar`.
    #[must_use]
    pub fn new(registrar: RealmRegistrar, context: BuildContext) -> Self {
        Self {
            model: RealmModel::default(),
            registrar,
            context,
            rbac: Arc::new(PermitRbac),
            reload_required: BTreeSet::new(),
        }
    }

    /// Installs the check run when group-to-role mapping is switched off.
    #[must_use]
    pub fn with_rbac_check(mut self, check: Arc<dyn RbacCheck>) -> Self {
        self.rbac = check;
        self
    }

    /// The committed model.
    #[must_use]
    pub fn model(&self) -> &RealmModel {
        &self.model
    }

    /// The build context shared with running realms.
    #[must_use]
    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// Realms whose running instance predates an accepted change.
    #[must_use]
    pub fn reload_required(&self) -> Vec<String> {
        self.reload_required.iter().cloned().collect()
    }

    /// Applies `change` as a unit.
    ///
    /// ## Errors
    ///
    /// Returns the first error from any stage. Nothing is committed or
    /// published in that case.
    pub fn apply(&mut self, change: Change) -> Result<ChangeOutcome> {
        match self.process(&change) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let realms: BTreeSet<&str> = change.operations.iter().map(Operation::realm).collect();
                for realm in realms {
                    SecurityEvent::builder(EventType::ConfigurationRejected)
                        .realm(realm)
                        .detail("booting", change.booting.to_string())
                        .failure(e.to_string())
                        .emit();
                }
                Err(e)
            }
        }
    }

    fn process(&mut self, change: &Change) -> Result<ChangeOutcome> {
        // Apply.
        let mut working = self.model.clone();
        let mut schedule = Schedule::default();
        let mut touched: Vec<&str> = Vec::new();
        for operation in &change.operations {
            apply_operation(&mut working, operation, change.booting, &mut schedule)?;
            if !touched.contains(&operation.realm()) {
                touched.push(operation.realm());
            }
        }
        if change.booting {
            for realm in &touched {
                schedule.full(realm);
            }
        }

        // Validate.
        for step in &schedule.steps {
            let Some(definition) = working.get(step.realm()) else {
                continue;
            };
            self.validate(step, definition)?;
        }

        // Activate.
        let mut outcome = ChangeOutcome::default();
        let mut publish: Vec<(String, Arc<dyn SecurityRealm>)> = Vec::new();
        let mut reload = Vec::new();
        for realm in touched {
            let Some(definition) = working.get(realm) else {
                if self.model.contains(realm) {
                    outcome.removed.push(realm.to_string());
                }
                continue;
            };
            let restart = change
                .operations
                .iter()
                .filter(|op| op.realm() == realm)
                .map(Operation::restart)
                .max();
            if restart == Some(Restart::Reload) {
                match self.model.get(realm) {
                    Some(current) if current == definition => continue,
                    Some(_) => {
                        reload.push(realm.to_string());
                        continue;
                    }
                    None => {}
                }
            }
            let built: Arc<dyn SecurityRealm> = Arc::new(self.context.build_realm(definition)?);
            publish.push((realm.to_string(), built));
        }

        outcome.restarted = publish.iter().map(|(name, _)| name.clone()).collect();
        self.registrar.apply(publish, &outcome.removed);
        self.model = working;

        for realm in &outcome.restarted {
            self.reload_required.remove(realm);
            SecurityEvent::builder(EventType::RealmActivated)
                .realm(realm)
                .detail("booting", change.booting.to_string())
                .emit();
        }
        for realm in &outcome.removed {
            self.reload_required.remove(realm);
            SecurityEvent::builder(EventType::RealmRemoved).realm(realm).emit();
        }
        for realm in reload {
            SecurityEvent::builder(EventType::ReloadRequired).realm(&realm).emit();
            self.reload_required.insert(realm);
        }
        outcome.reload_required = self.reload_required();

        tracing::info!(
            operations = change.operations.len(),
            booting = change.booting,
            restarted = outcome.restarted.len(),
            removed = outcome.removed.len(),
            "configuration change applied"
        );
        Ok(outcome)
    }

    /// Re-runs every invariant on the committed definition of `realm`.
    ///
    /// Needed when the model was edited without going through [`Self::apply`].
    ///
    /// ## Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown realm, or the first
    /// violated invariant.
    pub fn revalidate(&self, realm: &str) -> Result<()> {
        let definition = self
            .model
            .get(realm)
            .ok_or_else(|| Error::not_found(format!("realm '{realm}'")))?;
        let mut schedule = Schedule::default();
        schedule.full(realm);
        for step in &schedule.steps {
            self.validate(step, definition)?;
        }
        Ok(())
    }

    /// Rebuilds every realm flagged as reload-required and publishes them.
    ///
    /// ## Errors
    ///
    /// Returns the first build error; nothing is published in that case.
    pub fn reload(&mut self) -> Result<Vec<String>> {
        let mut publish: Vec<(String, Arc<dyn SecurityRealm>)> = Vec::new();
        for realm in &self.reload_required {
            let definition = self
                .model
                .get(realm)
                .ok_or_else(|| Error::not_found(format!("realm '{realm}'")))?;
            let built: Arc<dyn SecurityRealm> = Arc::new(self.context.build_realm(definition)?);
            publish.push((realm.clone(), built));
        }
        let reloaded: Vec<String> = std::mem::take(&mut self.reload_required).into_iter().collect();
        self.registrar.apply(publish, &[]);
        for realm in &reloaded {
            SecurityEvent::builder(EventType::RealmActivated)
                .realm(realm)
                .detail("reload", "true")
                .emit();
        }
        Ok(reloaded)
    }

    fn validate(&self, step: &Step, definition: &RealmDefinition) -> Result<()> {
        match step {
            Step::Authentication(_) => validate_authentication(definition),
            Step::Authorization(_) => validate_authorization(definition),
            Step::Kerberos(_) => validate_kerberos(definition),
            Step::References(_) => self.validate_references(definition),
            Step::Rbac(realm) => self.rbac.check(realm),
        }
    }

    fn validate_references(&self, definition: &RealmDefinition) -> Result<()> {
        let mut connections: Vec<&str> = Vec::new();
        for mechanism in &definition.authentication {
            if let AuthenticationDefinition::Ldap { connection, .. } = mechanism {
                connections.push(connection);
            }
        }
        for mechanism in &definition.authorization {
            if let AuthorizationDefinition::Ldap {
                connection: Some(connection),
                ..
            } = mechanism
            {
                connections.push(connection);
            }
        }
        for connection in connections {
            if !self.context.connections.contains(connection) {
                return Err(Error::config(format!(
                    "outbound connection '{connection}' referenced by realm '{}' does not exist",
                    definition.name
                )));
            }
        }

        let uses_plugins = definition.authentication_of(MechanismKind::Plugin).is_some()
            || definition.authorization_of(MechanismKind::Plugin).is_some();
        if uses_plugins {
            if definition.plugin_modules.is_empty() {
                return Err(Error::PluginNotFound(format!(
                    "realm '{}' uses a plug-in but declares no plug-in module",
                    definition.name
                )));
            }
            for module in &definition.plugin_modules {
                if !self.context.plugins.has_module(module) {
                    return Err(Error::PluginNotFound(format!("module '{module}'")));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MechanismProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MechanismProtocol")
            .field("realms", &self.model.names())
            .field("reload_required", &self.reload_required)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Apply
// ============================================================================

fn apply_operation(
    model: &mut RealmModel,
    operation: &Operation,
    booting: bool,
    schedule: &mut Schedule,
) -> Result<()> {
    let name = operation.realm().to_string();
    let mut later = |step: fn(String) -> Step| {
        if !booting {
            schedule.push(step(name.clone()));
        }
    };

    match operation {
        Operation::AddRealm(definition) => {
            if model.contains(&definition.name) {
                return Err(Error::config(format!("realm '{}' already exists", definition.name)));
            }
            model.insert(definition.clone());
            later(Step::Authentication);
            later(Step::Authorization);
            later(Step::Kerberos);
            later(Step::References);
        }
        Operation::RemoveRealm { realm } => {
            if model.remove(realm).is_none() {
                return Err(Error::not_found(format!("realm '{realm}'")));
            }
        }
        Operation::AddAuthentication { realm, mechanism } => {
            let definition = model.get_mut(realm)?;
            if definition.authentication_of(mechanism.kind()).is_some() {
                return Err(Error::config(format!(
                    "realm '{realm}' already has {} authentication",
                    mechanism.kind()
                )));
            }
            definition.authentication.push(mechanism.clone());
            later(Step::Authentication);
            later(Step::Authorization);
            later(Step::Kerberos);
            later(Step::References);
        }
        Operation::UpdateAuthentication { realm, mechanism } => {
            let definition = model.get_mut(realm)?;
            let slot = definition
                .authentication
                .iter_mut()
                .find(|m| m.kind() == mechanism.kind())
                .ok_or_else(|| missing(realm, mechanism.kind(), "authentication"))?;
            *slot = mechanism.clone();
            later(Step::Authentication);
            later(Step::Authorization);
            later(Step::Kerberos);
            later(Step::References);
        }
        Operation::RemoveAuthentication { realm, kind } => {
            let definition = model.get_mut(realm)?;
            let before = definition.authentication.len();
            definition.authentication.retain(|m| m.kind() != *kind);
            if definition.authentication.len() == before {
                return Err(missing(realm, *kind, "authentication"));
            }
            later(Step::Authentication);
            later(Step::Authorization);
        }
        Operation::AddAuthorization { realm, mechanism } => {
            let definition = model.get_mut(realm)?;
            if definition.authorization_of(mechanism.kind()).is_some() {
                return Err(Error::config(format!(
                    "realm '{realm}' already has {} authorization",
                    mechanism.kind()
                )));
            }
            definition.authorization.push(mechanism.clone());
            later(Step::Authorization);
            later(Step::References);
        }
        Operation::UpdateAuthorization { realm, mechanism } => {
            let definition = model.get_mut(realm)?;
            let slot = definition
                .authorization
                .iter_mut()
                .find(|m| m.kind() == mechanism.kind())
                .ok_or_else(|| missing(realm, mechanism.kind(), "authorization"))?;
            *slot = mechanism.clone();
            later(Step::Authorization);
            later(Step::References);
        }
        Operation::RemoveAuthorization { realm, kind } => {
            let definition = model.get_mut(realm)?;
            let before = definition.authorization.len();
            definition.authorization.retain(|m| m.kind() != *kind);
            if definition.authorization.len() == before {
                return Err(missing(realm, *kind, "authorization"));
            }
            later(Step::Authorization);
        }
        Operation::SetMapGroupsToRoles { realm, enabled } => {
            let definition = model.get_mut(realm)?;
            let was_enabled = definition.map_groups_to_roles;
            definition.map_groups_to_roles = *enabled;
            if was_enabled && !*enabled {
                later(Step::Rbac);
            }
        }
        Operation::AddKerberosIdentity { realm } => {
            let definition = model.get_mut(realm)?;
            if definition.kerberos.is_some() {
                return Err(Error::config(format!(
                    "realm '{realm}' already has a Kerberos server identity"
                )));
            }
            definition.kerberos = Some(KerberosIdentity::default());
        }
        Operation::AddKeytab { realm, keytab } => {
            let identity = model
                .get_mut(realm)?
                .kerberos
                .as_mut()
                .ok_or_else(|| Error::config(format!("realm '{realm}' has no Kerberos server identity")))?;
            if identity.keytabs.iter().any(|k| k.principal == keytab.principal) {
                return Err(Error::config(format!(
                    "realm '{realm}' already has a keytab for '{}'",
                    keytab.principal
                )));
            }
            identity.keytabs.push(keytab.clone());
        }
        Operation::RemoveKeytab { realm, principal } => {
            let identity = model
                .get_mut(realm)?
                .kerberos
                .as_mut()
                .ok_or_else(|| Error::config(format!("realm '{realm}' has no Kerberos server identity")))?;
            let before = identity.keytabs.len();
            identity.keytabs.retain(|k| k.principal != *principal);
            if identity.keytabs.len() == before {
                return Err(Error::not_found(format!("keytab '{principal}' in realm '{realm}'")));
            }
            later(Step::Kerberos);
        }
        Operation::AddPluginModule { realm, module } => {
            let definition = model.get_mut(realm)?;
            if definition.plugin_modules.contains(module) {
                return Err(Error::config(format!(
                    "realm '{realm}' already declares module '{module}'"
                )));
            }
            definition.plugin_modules.push(module.clone());
            later(Step::References);
        }
    }
    Ok(())
}

fn missing(realm: &str, kind: MechanismKind, mount: &str) -> Error {
    Error::not_found(format!("{kind} {mount} in realm '{realm}'"))
}

// ============================================================================
// Validate
// ============================================================================

fn kinds(mechanisms: impl Iterator<Item = MechanismKind>) -> String {
    mechanisms.map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
}

fn validate_authentication(definition: &RealmDefinition) -> Result<()> {
    match definition.authentication.len() {
        0 => Err(Error::config(format!(
            "realm '{}' has no authentication mechanism",
            definition.name
        ))),
        1 => Ok(()),
        _ => Err(Error::config(format!(
            "realm '{}' has conflicting authentication mechanisms ({})",
            definition.name,
            kinds(definition.authentication.iter().map(AuthenticationDefinition::kind))
        ))),
    }
}

fn validate_authorization(definition: &RealmDefinition) -> Result<()> {
    if definition.authorization.len() > 1 {
        return Err(Error::config(format!(
            "realm '{}' has conflicting authorization mechanisms ({})",
            definition.name,
            kinds(definition.authorization.iter().map(AuthorizationDefinition::kind))
        )));
    }

    if let Some(AuthorizationDefinition::Ldap {
        connection,
        username_to_dn,
        ..
    }) = definition.authorization.first()
    {
        if ldap_authentication_connection(definition).is_none() {
            if connection.is_none() {
                return Err(Error::config(format!(
                    "LDAP authorization in realm '{}' must name a connection when authentication is not LDAP",
                    definition.name
                )));
            }
            if username_to_dn.is_none() {
                return Err(Error::config(format!(
                    "LDAP authorization in realm '{}' must define username-to-dn when authentication is not LDAP",
                    definition.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_kerberos(definition: &RealmDefinition) -> Result<()> {
    if definition.authentication_of(MechanismKind::Kerberos).is_some() && definition.keytab_count() == 0 {
        return Err(Error::config(format!(
            "Kerberos authentication in realm '{}' requires a server identity with at least one keytab",
            definition.name
        )));
    }
    Ok(())
}
