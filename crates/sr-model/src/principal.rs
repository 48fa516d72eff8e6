//! Realm principals.
//!
//! A principal is an immutable identity handed out by a realm after
//! authentication: the user itself, and the groups and roles that
//! authorization attached to it. A principal may be qualified by the realm
//! that produced it, in which case its full name is `name@realm`.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{ModelError, ModelResult};

/// Salt mixed into the hash when a principal carries no realm.
const NO_REALM_SALT: u32 = 101;

/// The concrete variant of a principal.
///
/// Two principals of different kinds are never equal, even with the same
/// name and realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrincipalKind {
    /// The authenticated user.
    User,
    /// A group the user belongs to.
    Group,
    /// A role assigned to the user.
    Role,
}

impl PrincipalKind {
    const fn salt(self) -> u32 {
        match self {
            Self::User => 17,
            Self::Group => 31,
            Self::Role => 43,
        }
    }
}

/// An identity produced by a security realm.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RealmPrincipal {
    kind: PrincipalKind,
    name: String,
    realm: Option<String>,
}

impl RealmPrincipal {
    /// Creates a principal that is not qualified by a realm.
    ///
    /// ## Errors
    ///
    /// Returns [`ModelError::EmptyName`] if `name` is empty.
    pub fn new(kind: PrincipalKind, name: impl Into<String>) -> ModelResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ModelError::EmptyName);
        }
        Ok(Self {
            kind,
            name,
            realm: None,
        })
    }

    /// Creates a principal qualified by `realm`.
    ///
    /// ## Errors
    ///
    /// Returns [`ModelError::EmptyName`] if `name` is empty.
    pub fn with_realm(
        kind: PrincipalKind,
        realm: impl Into<String>,
        name: impl Into<String>,
    ) -> ModelResult<Self> {
        let mut principal = Self::new(kind, name)?;
        principal.realm = Some(realm.into());
        Ok(principal)
    }

    /// Creates an unqualified user principal.
    ///
    /// ## Errors
    ///
    /// Returns [`ModelError::EmptyName`] if `name` is empty.
    pub fn user(name: impl Into<String>) -> ModelResult<Self> {
        Self::new(PrincipalKind::User, name)
    }

    /// Creates a user principal qualified by `realm`.
    ///
    /// ## Errors
    ///
    /// Returns [`ModelError::EmptyName`] if `name` is empty.
    pub fn user_in(realm: impl Into<String>, name: impl Into<String>) -> ModelResult<Self> {
        Self::with_realm(PrincipalKind::User, realm, name)
    }

    /// Creates an unqualified group principal.
    ///
    /// ## Errors
    ///
    /// Returns [`ModelError::EmptyName`] if `name` is empty.
    pub fn group(name: impl Into<String>) -> ModelResult<Self> {
        Self::new(PrincipalKind::Group, name)
    }

    /// Creates a group principal qualified by `realm`.
    ///
    /// ## Errors
    ///
    /// Returns [`ModelError::EmptyName`] if `name` is empty.
    pub fn group_in(realm: impl Into<String>, name: impl Into<String>) -> ModelResult<Self> {
        Self::with_realm(PrincipalKind::Group, realm, name)
    }

    /// Creates an unqualified role principal.
    ///
    /// ## Errors
    ///
    /// Returns [`ModelError::EmptyName`] if `name` is empty.
    pub fn role(name: impl Into<String>) -> ModelResult<Self> {
        Self::new(PrincipalKind::Role, name)
    }

    /// Returns the principal kind.
    #[must_use]
    pub const fn kind(&self) -> PrincipalKind {
        self.kind
    }

    /// Returns the bare name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the qualifying realm, if any.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    /// Returns `name` or `name@realm`.
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.realm {
            Some(realm) => format!("{}@{realm}", self.name),
            None => self.name.clone(),
        }
    }
}

impl Hash for RealmPrincipal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.kind.salt().hash(state);
        match &self.realm {
            Some(realm) => realm.hash(state),
            None => NO_REALM_SALT.hash(state),
        }
    }
}

impl fmt::Display for RealmPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(realm) = &self.realm {
            write!(f, "@{realm}")?;
        }
        Ok(())
    }
}
