//! In-memory directory.
//!
//! [`MemoryDirectory`] implements [`ConnectionHandler`] and
//! [`DirectoryConnection`] over a map of entries, so searchers and mechanisms
//! can be exercised without a server. It understands the filter subset the
//! searchers emit: `&`, `|`, `!`, equality, presence and substring
//! assertions, with case-insensitive matching.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};

use crate::config::SearchScope;
use crate::connection::{ConnectionHandler, DirectoryConnection};
use crate::entry::LdapEntry;
use crate::error::{LdapError, LdapResult};

#[derive(Debug)]
struct State {
    entries: BTreeMap<String, LdapEntry>,
    passwords: HashMap<String, String>,
    available: bool,
    searches: usize,
}

/// A directory held in memory.
///
/// Clones share the same entries.
#[derive(Clone)]
pub struct MemoryDirectory {
    state: Arc<RwLock<State>>,
}

impl MemoryDirectory {
    /// Creates an empty, available directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                entries: BTreeMap::new(),
                passwords: HashMap::new(),
                available: true,
                searches: 0,
            })),
        }
    }

    /// Adds `entry`, replacing any entry with the same DN.
    pub fn add_entry(&self, entry: LdapEntry) {
        self.state.write().entries.insert(normalize(&entry.dn), entry);
    }

    /// Removes the entry at `dn`.
    pub fn remove_entry(&self, dn: &str) -> Option<LdapEntry> {
        self.state.write().entries.remove(&normalize(dn))
    }

    /// Sets the password a bind as `dn` must present.
    pub fn set_password(&self, dn: &str, password: impl Into<String>) {
        self.state.write().passwords.insert(normalize(dn), password.into());
    }

    /// Simulates the server going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.state.write().available = available;
    }

    /// Number of searches (including reads) served so far.
    #[must_use]
    pub fn search_count(&self) -> usize {
        self.state.read().searches
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryDirectory")
            .field("entries", &state.entries.len())
            .field("available", &state.available)
            .finish()
    }
}

#[async_trait]
impl ConnectionHandler for MemoryDirectory {
    async fn connect(&self) -> LdapResult<Box<dyn DirectoryConnection>> {
        if !self.state.read().available {
            return Err(LdapError::connection("directory unavailable"));
        }
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
        }))
    }

    async fn verify_password(&self, dn: &str, password: &SecretString) -> LdapResult<bool> {
        let state = self.state.read();
        if !state.available {
            return Err(LdapError::connection("directory unavailable"));
        }
        Ok(state
            .passwords
            .get(&normalize(dn))
            .is_some_and(|stored| stored == password.expose_secret()))
    }
}

struct MemoryConnection {
    state: Arc<RwLock<State>>,
}

#[async_trait]
impl DirectoryConnection for MemoryConnection {
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        _attributes: &[&str],
    ) -> LdapResult<Vec<LdapEntry>> {
        let filter = Filter::parse(filter)?;
        let mut state = self.state.write();
        if !state.available {
            return Err(LdapError::search("directory unavailable"));
        }
        state.searches += 1;

        let base = components(base_dn);
        Ok(state
            .entries
            .values()
            .filter(|entry| in_scope(&components(&entry.dn), &base, scope))
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect())
    }
}

fn normalize(dn: &str) -> String {
    components(dn).join(",")
}

fn components(dn: &str) -> Vec<String> {
    dn.split(',')
        .map(|rdn| rdn.trim().to_lowercase())
        .filter(|rdn| !rdn.is_empty())
        .collect()
}

fn in_scope(dn: &[String], base: &[String], scope: SearchScope) -> bool {
    if dn.len() < base.len() || !dn.ends_with(base) {
        return false;
    }
    match scope {
        SearchScope::Base => dn.len() == base.len(),
        SearchScope::OneLevel => dn.len() == base.len() + 1,
        SearchScope::Subtree => true,
    }
}

#[derive(Debug, PartialEq)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, String),
    Substring(String, Vec<String>),
}

impl Filter {
    fn parse(input: &str) -> LdapResult<Self> {
        let mut parser = Parser { input, pos: 0 };
        let filter = parser.filter()?;
        if parser.pos != input.len() {
            return Err(LdapError::config(format!("trailing characters in filter '{input}'")));
        }
        Ok(filter)
    }

    fn matches(&self, entry: &LdapEntry) -> bool {
        match self {
            Self::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Self::Not(filter) => !filter.matches(entry),
            Self::Present(attr) => attr.eq_ignore_ascii_case("objectClass") || entry.has_attr(attr),
            Self::Equal(attr, value) => values(entry, attr).any(|v| v == *value),
            Self::Substring(attr, pieces) => values(entry, attr).any(|v| substring_match(&v, pieces)),
        }
    }
}

fn values<'a>(entry: &'a LdapEntry, attr: &str) -> impl Iterator<Item = String> + 'a {
    entry
        .get_attrs(attr)
        .unwrap_or_default()
        .iter()
        .map(|v| v.to_lowercase())
}

fn substring_match(value: &str, pieces: &[String]) -> bool {
    let Some((first, rest)) = pieces.split_first() else {
        return true;
    };
    let Some(mut remaining) = value.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for piece in middle {
        match remaining.find(piece.as_str()) {
            Some(at) => remaining = &remaining[at + piece.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, c: u8) -> LdapResult<()> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(LdapError::config(format!(
                "expected '{}' at offset {} in filter '{}'",
                c as char, self.pos, self.input
            )))
        }
    }

    fn filter(&mut self) -> LdapResult<Filter> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            _ => self.item()?,
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn list(&mut self) -> LdapResult<Vec<Filter>> {
        let mut filters = Vec::new();
        while self.peek() == Some(b'(') {
            filters.push(self.filter()?);
        }
        Ok(filters)
    }

    fn item(&mut self) -> LdapResult<Filter> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b')' || c == b'(' {
                break;
            }
            self.pos += 1;
        }
        let item = &self.input[start..self.pos];
        let (attr, value) = item
            .split_once('=')
            .filter(|(attr, _)| !attr.is_empty())
            .ok_or_else(|| LdapError::config(format!("malformed assertion '{item}'")))?;

        let attr = attr.to_string();
        if value == "*" {
            return Ok(Filter::Present(attr));
        }
        if value.contains('*') {
            let pieces = value.split('*').map(|p| unescape(p).to_lowercase()).collect();
            return Ok(Filter::Substring(attr, pieces));
        }
        Ok(Filter::Equal(attr, unescape(value).to_lowercase()))
    }
}

fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some(byte) = value
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
