//! LDAP realms against the in-memory directory.

use sr_core::Error;
use sr_integration_tests::{
    group_search, ldap_realm, user_dn, users, TestEnv, CORP, PEOPLE,
};
use sr_ldap::{LdapEntry, UserSearchConfig};
use sr_realm::{AuthorizationDefinition, Change, Operation, RealmDefinition};
use sr_spi::Credentials;

const REALM: &str = "LdapRealm";

#[tokio::test]
async fn bind_and_nested_groups() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.protocol
        .apply(Change::new().with(Operation::AddRealm(ldap_realm(REALM).with_map_groups_to_roles(true))))?;
    let realm = env.registry.lookup(REALM)?.expect("realm published");

    let subject = realm.authenticate(&Credentials::password("alice", "wonderland")).await?;
    assert_eq!(subject.user().map(|u| u.full_name()), Some(format!("alice@{REALM}")));
    assert_eq!(subject.groups(), vec!["admins", "operators"]);
    assert_eq!(subject.roles(), vec!["admins", "operators"]);

    let bob = realm.authenticate(&Credentials::password("bob", "builder")).await?;
    assert!(bob.groups().is_empty());

    assert!(matches!(
        realm.authenticate(&Credentials::password("alice", "guess")).await,
        Err(Error::AuthenticationFailed)
    ));
    assert!(matches!(
        realm.authenticate(&Credentials::password("mallory", "guess")).await,
        Err(Error::AuthenticationFailed)
    ));
    assert!(matches!(
        realm.authenticate(&Credentials::password("alice", "")).await,
        Err(Error::AuthenticationFailed)
    ));
    Ok(())
}

#[tokio::test]
async fn cyclic_groups_terminate() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.protocol
        .apply(Change::new().with(Operation::AddRealm(ldap_realm(REALM))))?;
    let realm = env.registry.lookup(REALM)?.expect("realm published");

    let subject = realm.authenticate(&Credentials::password("dave", "cycle")).await?;
    assert_eq!(subject.groups(), vec!["ring-a", "ring-b"]);
    Ok(())
}

#[tokio::test]
async fn ambiguous_username_is_reported() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.protocol
        .apply(Change::new().with(Operation::AddRealm(ldap_realm(REALM))))?;
    let realm = env.registry.lookup(REALM)?.expect("realm published");

    let err = realm
        .authenticate(&Credentials::password("carol", "anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AmbiguousResult(ref msg) if msg.contains("carol")));
    Ok(())
}

#[tokio::test]
async fn group_changes_are_seen_on_next_authentication() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.protocol
        .apply(Change::new().with(Operation::AddRealm(ldap_realm(REALM))))?;
    let realm = env.registry.lookup(REALM)?.expect("realm published");

    env.directory.add_entry(
        LdapEntry::new(user_dn("bob"))
            .with_attr("uid", "bob")
            .with_attr("memberOf", sr_integration_tests::group_dn("operators")),
    );
    let subject = realm.authenticate(&Credentials::password("bob", "builder")).await?;
    assert_eq!(subject.groups(), vec!["operators"]);
    Ok(())
}

#[tokio::test]
async fn directory_outage_is_not_a_failed_login() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.protocol
        .apply(Change::new().with(Operation::AddRealm(ldap_realm(REALM))))?;
    let realm = env.registry.lookup(REALM)?.expect("realm published");

    env.directory.set_available(false);
    let err = realm
        .authenticate(&Credentials::password("alice", "wonderland"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));

    env.directory.set_available(true);
    assert!(realm.authenticate(&Credentials::password("alice", "wonderland")).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn ldap_groups_for_users_realm() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    let definition = RealmDefinition::new(REALM)
        .with_authentication(users(&[("alice", "local-password")]))
        .with_authorization(AuthorizationDefinition::Ldap {
            connection: Some(CORP.into()),
            username_to_dn: Some(UserSearchConfig::UsernameFilter {
                base_dn: PEOPLE.into(),
                recursive: false,
                attribute: "uid".into(),
                user_dn_attribute: None,
                force: false,
            }),
            group_search: group_search(),
        });
    env.protocol.apply(Change::new().with(Operation::AddRealm(definition)))?;
    let realm = env.registry.lookup(REALM)?.expect("realm published");

    let subject = realm
        .authenticate(&Credentials::password("alice", "local-password"))
        .await?;
    assert_eq!(subject.groups(), vec!["admins", "operators"]);
    Ok(())
}

#[tokio::test]
async fn standalone_ldap_authorization_needs_username_search() {
    let mut env = TestEnv::new();
    let definition = RealmDefinition::new(REALM)
        .with_authentication(users(&[("alice", "local-password")]))
        .with_authorization(AuthorizationDefinition::Ldap {
            connection: None,
            username_to_dn: None,
            group_search: group_search(),
        });

    let err = env
        .protocol
        .apply(Change::new().with(Operation::AddRealm(definition)))
        .unwrap_err();
    assert!(err.is_configuration_error());
    assert!(env.registry.names().is_empty());
}
