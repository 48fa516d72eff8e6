//! Group search.
//!
//! A [`GroupSearcher`] finds the groups an entry directly belongs to, either
//! by reading a membership attribute on the entry itself
//! ([`PrincipalToGroupSearcher`]) or by searching for groups that list the
//! entry as a member ([`GroupToPrincipalSearcher`]). [`GroupResolver`] walks
//! the membership graph, optionally following groups of groups.

use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ldap_escape, GroupName, SearchScope};
use crate::connection::DirectoryConnection;
use crate::entry::{rdn_value, LdapEntry};
use crate::error::{LdapError, LdapResult};

/// Finds the groups an entry directly belongs to.
#[async_trait]
pub trait GroupSearcher: Send + Sync + Debug {
    /// Returns the direct groups of `member`, each with its simple name set.
    ///
    /// ## Errors
    ///
    /// Returns [`LdapError::NotFound`] for a dangling group reference that is
    /// not skipped, or a transport error.
    async fn direct_groups(
        &self,
        conn: &mut dyn DirectoryConnection,
        member: &LdapEntry,
    ) -> LdapResult<Vec<LdapEntry>>;
}

fn named(entry: LdapEntry, name_attribute: &str) -> LdapEntry {
    let simple = entry
        .get_attr(name_attribute)
        .or_else(|| rdn_value(&entry.dn))
        .map(str::to_string);
    match simple {
        Some(simple) => entry.with_simple_name(simple),
        None => entry,
    }
}

fn require_attribute(value: &str, what: &str) -> LdapResult<String> {
    if value.trim().is_empty() {
        return Err(LdapError::config(format!("{what} must not be empty")));
    }
    Ok(value.to_string())
}

/// Reads group DNs from a multi-valued attribute on the member entry.
#[derive(Debug, Clone)]
pub struct PrincipalToGroupSearcher {
    group_attribute: String,
    group_name_attribute: String,
    resolve_names: bool,
    skip_missing_groups: bool,
}

impl PrincipalToGroupSearcher {
    /// Creates a searcher reading `group_attribute`.
    ///
    /// ## Errors
    ///
    /// Returns [`LdapError::Configuration`] if an attribute name is empty.
    pub fn new(group_attribute: &str, group_name_attribute: &str) -> LdapResult<Self> {
        Ok(Self {
            group_attribute: require_attribute(group_attribute, "group attribute")?,
            group_name_attribute: require_attribute(group_name_attribute, "group name attribute")?,
            resolve_names: true,
            skip_missing_groups: false,
        })
    }

    /// Whether simple names are read from the group entries.
    #[must_use]
    pub const fn resolve_names(mut self, resolve: bool) -> Self {
        self.resolve_names = resolve;
        self
    }

    /// Whether references to missing groups are ignored.
    #[must_use]
    pub const fn skip_missing_groups(mut self, skip: bool) -> Self {
        self.skip_missing_groups = skip;
        self
    }

    async fn membership(
        &self,
        conn: &mut dyn DirectoryConnection,
        member: &LdapEntry,
    ) -> LdapResult<Vec<String>> {
        if let Some(values) = member.get_attrs(&self.group_attribute) {
            return Ok(values.to_vec());
        }
        let read = conn.read(&member.dn, &[self.group_attribute.as_str()]).await?;
        Ok(read
            .and_then(|entry| entry.get_attrs(&self.group_attribute).map(<[String]>::to_vec))
            .unwrap_or_default())
    }
}

#[async_trait]
impl GroupSearcher for PrincipalToGroupSearcher {
    async fn direct_groups(
        &self,
        conn: &mut dyn DirectoryConnection,
        member: &LdapEntry,
    ) -> LdapResult<Vec<LdapEntry>> {
        let mut groups = Vec::new();
        for dn in self.membership(conn, member).await? {
            let attributes = [self.group_name_attribute.as_str(), self.group_attribute.as_str()];
            match conn.read(&dn, &attributes).await? {
                Some(entry) if self.resolve_names => {
                    groups.push(named(entry, &self.group_name_attribute));
                }
                Some(entry) => groups.push(entry),
                None if self.skip_missing_groups => {
                    tracing::debug!(group = %dn, member = %member.dn, "skipping missing group");
                }
                None => return Err(LdapError::not_found(dn)),
            }
        }
        Ok(groups)
    }
}

/// Searches for group entries whose membership attribute names the member.
#[derive(Debug, Clone)]
pub struct GroupToPrincipalSearcher {
    base_dn: String,
    scope: SearchScope,
    principal_attribute: String,
    group_name_attribute: String,
    search_by: GroupName,
}

impl GroupToPrincipalSearcher {
    /// Creates a searcher over `base_dn`.
    ///
    /// ## Errors
    ///
    /// Returns [`LdapError::Configuration`] if the base DN or an attribute
    /// name is empty.
    pub fn new(
        base_dn: &str,
        recursive: bool,
        principal_attribute: &str,
        group_name_attribute: &str,
    ) -> LdapResult<Self> {
        Ok(Self {
            base_dn: require_attribute(base_dn, "group base DN")?,
            scope: SearchScope::from_recursive(recursive),
            principal_attribute: require_attribute(principal_attribute, "principal attribute")?,
            group_name_attribute: require_attribute(group_name_attribute, "group name attribute")?,
            search_by: GroupName::Distinguished,
        })
    }

    /// Whether members are referenced by DN or by simple name.
    #[must_use]
    pub const fn search_by(mut self, search_by: GroupName) -> Self {
        self.search_by = search_by;
        self
    }

    /// The filter sent for `member`.
    #[must_use]
    pub fn filter_for(&self, member: &LdapEntry) -> String {
        let value = match self.search_by {
            GroupName::Distinguished => member.dn.as_str(),
            GroupName::Simple => member.display_name(),
        };
        format!("({}={})", self.principal_attribute, ldap_escape(value))
    }
}

#[async_trait]
impl GroupSearcher for GroupToPrincipalSearcher {
    async fn direct_groups(
        &self,
        conn: &mut dyn DirectoryConnection,
        member: &LdapEntry,
    ) -> LdapResult<Vec<LdapEntry>> {
        let filter = self.filter_for(member);
        let entries = conn
            .search(
                &self.base_dn,
                self.scope,
                &filter,
                &[self.group_name_attribute.as_str()],
            )
            .await?;
        Ok(entries
            .into_iter()
            .map(|entry| named(entry, &self.group_name_attribute))
            .collect())
    }
}

/// Walks group membership from a user entry.
#[derive(Debug, Clone)]
pub struct GroupResolver {
    searcher: Arc<dyn GroupSearcher>,
    iterative: bool,
}

impl GroupResolver {
    /// Creates a resolver. With `iterative`, groups of groups are followed.
    #[must_use]
    pub fn new(searcher: Arc<dyn GroupSearcher>, iterative: bool) -> Self {
        Self {
            searcher,
            iterative,
        }
    }

    /// Returns every group reachable from `user`, each exactly once.
    ///
    /// DNs are compared case-insensitively, so cycles in the membership
    /// graph terminate.
    ///
    /// ## Errors
    ///
    /// Propagates errors from the underlying [`GroupSearcher`].
    pub async fn resolve(
        &self,
        conn: &mut dyn DirectoryConnection,
        user: &LdapEntry,
    ) -> LdapResult<Vec<LdapEntry>> {
        let mut visited = HashSet::from([user.dn.to_lowercase()]);
        let mut groups = Vec::new();
        let mut pending = VecDeque::from([user.clone()]);

        while let Some(member) = pending.pop_front() {
            for group in self.searcher.direct_groups(conn, &member).await? {
                if !visited.insert(group.dn.to_lowercase()) {
                    continue;
                }
                if self.iterative {
                    pending.push_back(group.clone());
                }
                groups.push(group);
            }
        }

        tracing::debug!(user = %user.dn, groups = groups.len(), "resolved group membership");
        Ok(groups)
    }
}
