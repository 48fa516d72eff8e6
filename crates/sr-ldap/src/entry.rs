//! Directory entries returned by searches.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use ldap3::SearchEntry;

/// An LDAP entry with parsed attributes.
///
/// Two entries are the same entry when their DNs are equal; attributes are
/// not compared.
#[derive(Debug, Clone)]
pub struct LdapEntry {
    /// Distinguished Name.
    pub dn: String,

    /// Name the entry is known by, when a search established one.
    pub simple_name: Option<String>,

    /// Attributes (all values are multi-valued).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            simple_name: None,
            attributes: HashMap::new(),
        }
    }

    /// Creates an entry from an ldap3 search result.
    #[must_use]
    pub fn from_search_entry(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            simple_name: None,
            attributes: entry.attrs,
        }
    }

    /// Sets the simple name.
    #[must_use]
    pub fn with_simple_name(mut self, name: impl Into<String>) -> Self {
        self.simple_name = Some(name.into());
        self
    }

    /// Adds an attribute value.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Gets all values of an attribute. Attribute names are case-insensitive.
    #[must_use]
    pub fn get_attrs(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// Gets the first value of an attribute.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.get_attrs(name)
            .and_then(<[String]>::first)
            .map(String::as_str)
    }

    /// Checks if the entry has an attribute.
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.get_attrs(name).is_some()
    }

    /// The simple name if known, otherwise the value of the leading RDN.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.simple_name
            .as_deref()
            .or_else(|| rdn_value(&self.dn))
            .unwrap_or(&self.dn)
    }
}

impl PartialEq for LdapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dn == other.dn
    }
}

impl Eq for LdapEntry {}

impl Hash for LdapEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dn.hash(state);
    }
}

/// Value of the leading RDN of `dn`, e.g. `alice` for
/// `uid=alice,ou=people,dc=example,dc=com`.
#[must_use]
pub fn rdn_value(dn: &str) -> Option<&str> {
    let rdn = dn.split(',').next()?;
    let (_, value) = rdn.split_once('=')?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
