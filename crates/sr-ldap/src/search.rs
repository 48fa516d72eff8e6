//! User search.
//!
//! Resolves a supplied username to exactly one directory entry. Three
//! strategies are available:
//!
//! - [`DnUserSearcher`] treats the name as a DN.
//! - [`FilterUserSearcher::simple`] searches for `(attribute=name)`.
//! - [`FilterUserSearcher::advanced`] substitutes the name into a filter
//!   template.
//!
//! Supplied names are always escaped before they reach a filter.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::config::{ldap_escape, SearchScope};
use crate::connection::DirectoryConnection;
use crate::entry::{rdn_value, LdapEntry};
use crate::error::{LdapError, LdapResult};

/// Placeholder replaced by the escaped username in filter templates.
const PLACEHOLDER: &str = "{0}";

/// Resolves a supplied name to one directory entry.
#[async_trait]
pub trait UserSearcher: Send + Sync + Debug {
    /// Finds the entry for `supplied_name`.
    ///
    /// ## Errors
    ///
    /// - [`LdapError::NotFound`] if nothing matched
    /// - [`LdapError::Ambiguous`] if more than one entry matched
    /// - [`LdapError::InvalidDn`] if the configured DN attribute is missing
    /// - transport errors from the connection
    async fn user_search(
        &self,
        conn: &mut dyn DirectoryConnection,
        supplied_name: &str,
    ) -> LdapResult<LdapEntry>;
}

/// The supplied name is the DN.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnUserSearcher {
    force: bool,
}

impl DnUserSearcher {
    /// Creates a searcher. With `force`, the entry is read to confirm it
    /// exists.
    #[must_use]
    pub const fn new(force: bool) -> Self {
        Self { force }
    }
}

#[async_trait]
impl UserSearcher for DnUserSearcher {
    async fn user_search(
        &self,
        conn: &mut dyn DirectoryConnection,
        supplied_name: &str,
    ) -> LdapResult<LdapEntry> {
        let entry = if self.force {
            conn.read(supplied_name, &[])
                .await?
                .ok_or_else(|| LdapError::not_found(supplied_name))?
        } else {
            LdapEntry::new(supplied_name)
        };
        let simple = rdn_value(supplied_name).unwrap_or(supplied_name).to_string();
        Ok(entry.with_simple_name(simple))
    }
}

/// A validated filter template containing `{0}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTemplate(String);

impl FilterTemplate {
    /// Parses and validates a template.
    ///
    /// ## Errors
    ///
    /// Returns [`LdapError::Configuration`] if the template does not start
    /// with `(`, has unbalanced parentheses or lacks the `{0}` placeholder.
    pub fn parse(template: impl Into<String>) -> LdapResult<Self> {
        let template = template.into();
        if !template.starts_with('(') {
            return Err(LdapError::config(format!(
                "filter '{template}' must start with '('"
            )));
        }
        let mut depth: i32 = 0;
        for c in template.chars() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                break;
            }
        }
        if depth != 0 {
            return Err(LdapError::config(format!(
                "filter '{template}' has unbalanced parentheses"
            )));
        }
        if !template.contains(PLACEHOLDER) {
            return Err(LdapError::config(format!(
                "filter '{template}' does not contain {PLACEHOLDER}"
            )));
        }
        Ok(Self(template))
    }

    /// Substitutes the escaped `value`.
    #[must_use]
    pub fn render(&self, value: &str) -> String {
        self.0.replace(PLACEHOLDER, &ldap_escape(value))
    }

    /// The raw template.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Searches a subtree with a filter built from the supplied name.
#[derive(Debug, Clone)]
pub struct FilterUserSearcher {
    base_dn: String,
    scope: SearchScope,
    filter: FilterTemplate,
    username_attribute: Option<String>,
    user_dn_attribute: Option<String>,
}

impl FilterUserSearcher {
    /// Searches for `(attribute={0})`. The matched entry keeps the supplied
    /// name as its simple name.
    ///
    /// ## Errors
    ///
    /// Returns [`LdapError::Configuration`] if `base_dn` or `attribute` is
    /// empty.
    pub fn simple(base_dn: &str, recursive: bool, attribute: &str) -> LdapResult<Self> {
        if attribute.trim().is_empty() {
            return Err(LdapError::config("username attribute must not be empty"));
        }
        Self::build(
            base_dn,
            recursive,
            FilterTemplate::parse(format!("({attribute}={PLACEHOLDER})"))?,
            None,
        )
    }

    /// Searches with a filter template. When `username_attribute` is set,
    /// its value on the matched entry becomes the simple name.
    ///
    /// ## Errors
    ///
    /// Returns [`LdapError::Configuration`] if `base_dn` is empty or the
    /// template is malformed.
    pub fn advanced(
        base_dn: &str,
        recursive: bool,
        filter: &str,
        username_attribute: Option<String>,
    ) -> LdapResult<Self> {
        Self::build(
            base_dn,
            recursive,
            FilterTemplate::parse(filter)?,
            username_attribute,
        )
    }

    fn build(
        base_dn: &str,
        recursive: bool,
        filter: FilterTemplate,
        username_attribute: Option<String>,
    ) -> LdapResult<Self> {
        if base_dn.trim().is_empty() {
            return Err(LdapError::config("base DN must not be empty"));
        }
        Ok(Self {
            base_dn: base_dn.to_string(),
            scope: SearchScope::from_recursive(recursive),
            filter,
            username_attribute,
            user_dn_attribute: None,
        })
    }

    /// Takes the DN from `attribute` instead of the entry DN.
    #[must_use]
    pub fn with_user_dn_attribute(mut self, attribute: Option<String>) -> Self {
        self.user_dn_attribute = attribute;
        self
    }

    /// The filter sent for `supplied_name`.
    #[must_use]
    pub fn filter_for(&self, supplied_name: &str) -> String {
        self.filter.render(supplied_name)
    }
}

#[async_trait]
impl UserSearcher for FilterUserSearcher {
    async fn user_search(
        &self,
        conn: &mut dyn DirectoryConnection,
        supplied_name: &str,
    ) -> LdapResult<LdapEntry> {
        let filter = self.filter_for(supplied_name);
        let attributes: Vec<&str> = self
            .username_attribute
            .iter()
            .chain(self.user_dn_attribute.iter())
            .map(String::as_str)
            .collect();

        tracing::debug!(base_dn = %self.base_dn, filter = %filter, "searching for user");
        let mut entries = conn
            .search(&self.base_dn, self.scope, &filter, &attributes)
            .await?;

        let mut entry = match entries.len() {
            0 => return Err(LdapError::not_found(supplied_name)),
            1 => entries.remove(0),
            count => {
                return Err(LdapError::Ambiguous {
                    name: supplied_name.to_string(),
                    count,
                })
            }
        };

        if let Some(attr) = &self.user_dn_attribute {
            entry.dn = entry
                .get_attr(attr)
                .ok_or_else(|| {
                    LdapError::InvalidDn(format!(
                        "entry '{}' has no '{attr}' attribute",
                        entry.dn
                    ))
                })?
                .to_string();
        }

        let simple = match &self.username_attribute {
            Some(attr) => entry
                .get_attr(attr)
                .map_or_else(|| supplied_name.to_string(), str::to_string),
            None => supplied_name.to_string(),
        };
        Ok(entry.with_simple_name(simple))
    }
}
