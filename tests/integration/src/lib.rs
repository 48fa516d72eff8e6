//! Shared fixtures for the end-to-end tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use sr_ldap::memory::MemoryDirectory;
use sr_ldap::{GroupName, GroupSearchConfig, LdapEntry, UserSearchConfig};
use sr_realm::{
    AuthenticationDefinition, AuthorizationDefinition, BuildContext, MechanismProtocol,
    RealmDefinition,
};
use sr_spi::RealmRegistry;

/// Name of the in-memory directory connection.
pub const CORP: &str = "corp";

/// Base DN of user entries.
pub const PEOPLE: &str = "ou=people,dc=example,dc=com";

/// Base DN of group entries.
pub const GROUPS: &str = "ou=groups,dc=example,dc=com";

/// A protocol wired to a fresh registry and an in-memory directory.
pub struct TestEnv {
    /// Reader side of the registry.
    pub registry: RealmRegistry,
    /// The protocol under test.
    pub protocol: MechanismProtocol,
    /// Directory registered as [`CORP`].
    pub directory: MemoryDirectory,
    /// Context shared with the protocol.
    pub context: BuildContext,
}

impl TestEnv {
    /// Creates the environment.
    #[must_use]
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("sr_realm=debug,sr_ldap=debug")
            .with_test_writer()
            .try_init();

        let directory = corporate_directory();
        let context = BuildContext::new();
        context
            .connections
            .register(CORP, Arc::new(directory.clone()));

        let (registry, registrar) = RealmRegistry::channel();
        let protocol = MechanismProtocol::new(registrar, context.clone());
        Self {
            registry,
            protocol,
            directory,
            context,
        }
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// User DN for `uid`.
#[must_use]
pub fn user_dn(uid: &str) -> String {
    format!("uid={uid},{PEOPLE}")
}

/// Group DN for `cn`.
#[must_use]
pub fn group_dn(cn: &str) -> String {
    format!("cn={cn},{GROUPS}")
}

/// A directory where:
///
/// - `alice` (password `wonderland`) is in `admins`, itself in `operators`
/// - `bob` (password `builder`) is in no group
/// - `dave` (password `cycle`) is in `ring-a`; `ring-a` and `ring-b` are
///   members of each other
/// - two entries share `uid=carol`
#[must_use]
pub fn corporate_directory() -> MemoryDirectory {
    let dir = MemoryDirectory::new();

    dir.add_entry(
        LdapEntry::new(user_dn("alice"))
            .with_attr("uid", "alice")
            .with_attr("memberOf", group_dn("admins")),
    );
    dir.set_password(&user_dn("alice"), "wonderland");
    dir.add_entry(LdapEntry::new(user_dn("bob")).with_attr("uid", "bob"));
    dir.set_password(&user_dn("bob"), "builder");
    dir.add_entry(
        LdapEntry::new(user_dn("dave"))
            .with_attr("uid", "dave")
            .with_attr("memberOf", group_dn("ring-a")),
    );
    dir.set_password(&user_dn("dave"), "cycle");

    dir.add_entry(LdapEntry::new(format!("uid=carol,ou=sales,{PEOPLE}")).with_attr("uid", "carol"));
    dir.add_entry(LdapEntry::new(format!("uid=carol,ou=legal,{PEOPLE}")).with_attr("uid", "carol"));

    dir.add_entry(
        LdapEntry::new(group_dn("admins"))
            .with_attr("cn", "admins")
            .with_attr("memberOf", group_dn("operators")),
    );
    dir.add_entry(LdapEntry::new(group_dn("operators")).with_attr("cn", "operators"));
    dir.add_entry(
        LdapEntry::new(group_dn("ring-a"))
            .with_attr("cn", "ring-a")
            .with_attr("memberOf", group_dn("ring-b")),
    );
    dir.add_entry(
        LdapEntry::new(group_dn("ring-b"))
            .with_attr("cn", "ring-b")
            .with_attr("memberOf", group_dn("ring-a")),
    );
    dir
}

/// Inline users authentication.
#[must_use]
pub fn users(entries: &[(&str, &str)]) -> AuthenticationDefinition {
    AuthenticationDefinition::Users {
        users: entries
            .iter()
            .map(|(user, password)| ((*user).to_string(), (*password).to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// LDAP authentication matching `uid` under [`PEOPLE`].
#[must_use]
pub fn ldap_authentication() -> AuthenticationDefinition {
    AuthenticationDefinition::Ldap {
        connection: CORP.to_string(),
        user_search: UserSearchConfig::UsernameFilter {
            base_dn: PEOPLE.to_string(),
            recursive: true,
            attribute: "uid".to_string(),
            user_dn_attribute: None,
            force: false,
        },
        allow_empty_passwords: false,
    }
}

/// Iterative principal-to-group search using `memberOf`.
#[must_use]
pub fn group_search() -> GroupSearchConfig {
    GroupSearchConfig::PrincipalToGroup {
        group_attribute: "memberOf".to_string(),
        group_name: GroupName::Simple,
        group_name_attribute: "cn".to_string(),
        iterative: true,
        skip_missing_groups: false,
    }
}

/// LDAP authorization reusing the authentication connection and entry.
#[must_use]
pub fn ldap_authorization() -> AuthorizationDefinition {
    AuthorizationDefinition::Ldap {
        connection: None,
        username_to_dn: None,
        group_search: group_search(),
    }
}

/// A realm authenticating and authorizing against [`CORP`].
#[must_use]
pub fn ldap_realm(name: &str) -> RealmDefinition {
    RealmDefinition::new(name)
        .with_authentication(ldap_authentication())
        .with_authorization(ldap_authorization())
}
