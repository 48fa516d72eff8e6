//! Authenticated subjects.

use std::collections::HashSet;

use crate::principal::{PrincipalKind, RealmPrincipal};

/// The principals established for one authentication.
///
/// Principals are kept in a set, so supplementing the same subject twice
/// with the same groups leaves it unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    principals: HashSet<RealmPrincipal>,
}

impl Subject {
    /// Creates an empty subject.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a subject holding a single user principal.
    #[must_use]
    pub fn for_user(user: RealmPrincipal) -> Self {
        let mut subject = Self::new();
        subject.add(user);
        subject
    }

    /// Adds a principal. Returns `false` if it was already present.
    pub fn add(&mut self, principal: RealmPrincipal) -> bool {
        self.principals.insert(principal)
    }

    /// Checks whether the subject holds `principal`.
    #[must_use]
    pub fn contains(&self, principal: &RealmPrincipal) -> bool {
        self.principals.contains(principal)
    }

    /// Returns the user principal, if one was established.
    #[must_use]
    pub fn user(&self) -> Option<&RealmPrincipal> {
        self.principals
            .iter()
            .find(|p| p.kind() == PrincipalKind::User)
    }

    /// Returns the group names, sorted.
    #[must_use]
    pub fn groups(&self) -> Vec<&str> {
        self.names_of(PrincipalKind::Group)
    }

    /// Returns the role names, sorted.
    #[must_use]
    pub fn roles(&self) -> Vec<&str> {
        self.names_of(PrincipalKind::Role)
    }

    /// Iterates over all principals in no particular order.
    pub fn principals(&self) -> impl Iterator<Item = &RealmPrincipal> {
        self.principals.iter()
    }

    /// Number of principals held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.principals.len()
    }

    /// Whether the subject holds no principal.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    fn names_of(&self, kind: PrincipalKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .principals
            .iter()
            .filter(|p| p.kind() == kind)
            .map(RealmPrincipal::name)
            .collect();
        names.sort_unstable();
        names
    }
}
