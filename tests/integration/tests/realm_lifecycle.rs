//! Realm lifecycle through the mechanism protocol.

use std::io::Write;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use sr_core::Error;
use sr_integration_tests::{users, TestEnv};
use sr_realm::mechanism::password_digest;
use sr_realm::{
    AuthenticationDefinition, AuthorizationDefinition, Change, KeytabDefinition, LoginContext,
    MechanismKind, Operation, RealmDefinition,
};
use sr_spi::{AuthMechanism, Credentials};

const REALM: &str = "ManagementRealm";

fn keytab() -> KeytabDefinition {
    KeytabDefinition {
        principal: "HTTP/mgmt.example.com@EXAMPLE.COM".into(),
        path: "/etc/krb5/mgmt.keytab".into(),
    }
}

#[tokio::test]
async fn rejected_change_keeps_previous_realm() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.protocol.apply(Change::new().with(Operation::AddRealm(
        RealmDefinition::new(REALM).with_authentication(users(&[("admin", "changeit")])),
    )))?;
    let before = env.registry.lookup(REALM)?.expect("realm published");

    let err = env
        .protocol
        .apply(Change::new().with(Operation::AddAuthentication {
            realm: REALM.into(),
            mechanism: AuthenticationDefinition::Properties {
                path: "mgmt-users.properties".into(),
                plain_text: true,
            },
        }))
        .unwrap_err();
    assert!(matches!(err, Error::ConfigurationInvalid(ref msg) if msg.contains("conflicting")));

    let after = env.registry.lookup(REALM)?.expect("realm still published");
    assert!(Arc::ptr_eq(&before, &after));
    let subject = after.authenticate(&Credentials::password("admin", "changeit")).await?;
    assert_eq!(subject.user().map(|u| u.name()), Some("admin"));
    Ok(())
}

#[tokio::test]
async fn sole_authentication_cannot_be_removed() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.protocol.apply(Change::new().with(Operation::AddRealm(
        RealmDefinition::new(REALM).with_authentication(users(&[("admin", "changeit")])),
    )))?;

    let result = env.protocol.apply(Change::new().with(Operation::RemoveAuthentication {
        realm: REALM.into(),
        kind: MechanismKind::Users,
    }));
    assert!(matches!(result, Err(Error::ConfigurationInvalid(ref msg)) if msg.contains("no authentication")));
    assert_eq!(
        env.protocol.model().get(REALM).map(|r| r.authentication.len()),
        Some(1)
    );
    assert!(env.registry.lookup(REALM)?.is_some());
    Ok(())
}

#[tokio::test]
async fn keytab_is_required_once_kerberos_is_added() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.protocol.apply(
        Change::new()
            .with(Operation::AddRealm(
                RealmDefinition::new(REALM).with_authentication(users(&[("admin", "changeit")])),
            ))
            .with(Operation::AddKerberosIdentity { realm: REALM.into() }),
    )?;
    assert_eq!(env.protocol.model().get(REALM).map(RealmDefinition::keytab_count), Some(0));

    let to_kerberos = || {
        Change::new()
            .with(Operation::RemoveAuthentication {
                realm: REALM.into(),
                kind: MechanismKind::Users,
            })
            .with(Operation::AddAuthentication {
                realm: REALM.into(),
                mechanism: AuthenticationDefinition::Kerberos { remove_realm: true },
            })
    };
    assert!(env.protocol.apply(to_kerberos()).is_err());

    env.protocol.apply(Change::new().with(Operation::AddKeytab {
        realm: REALM.into(),
        keytab: keytab(),
    }))?;
    env.protocol.apply(to_kerberos())?;

    let realm = env.registry.lookup(REALM)?.expect("realm published");
    assert!(realm.is_ready(AuthMechanism::Kerberos));
    let subject = realm.authenticate(&Credentials::kerberos("alice@EXAMPLE.COM")).await?;
    assert_eq!(subject.user().map(|u| u.full_name()), Some(format!("alice@{REALM}")));

    let removal = env.protocol.apply(Change::new().with(Operation::RemoveKeytab {
        realm: REALM.into(),
        principal: keytab().principal,
    }));
    assert!(removal.is_err());
    assert_eq!(env.protocol.model().get(REALM).map(RealmDefinition::keytab_count), Some(1));
    Ok(())
}

#[tokio::test]
async fn properties_realm_maps_groups_to_roles() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let users_path = dir.path().join("mgmt-users.properties");
    let groups_path = dir.path().join("mgmt-groups.properties");
    let mut users_file = std::fs::File::create(&users_path)?;
    writeln!(users_file, "# management users")?;
    writeln!(users_file, "admin={}", password_digest("admin", REALM, "changeit"))?;
    let mut groups_file = std::fs::File::create(&groups_path)?;
    writeln!(groups_file, "admin=SuperUser,Monitor")?;

    let mut env = TestEnv::new();
    env.protocol.apply(Change::new().with(Operation::AddRealm(
        RealmDefinition::new(REALM)
            .with_authentication(AuthenticationDefinition::Properties {
                path: users_path,
                plain_text: false,
            })
            .with_authorization(AuthorizationDefinition::Properties { path: groups_path })
            .with_map_groups_to_roles(true),
    )))?;

    let realm = env.registry.lookup(REALM)?.expect("realm published");
    assert_eq!(realm.supported_mechanisms(), vec![AuthMechanism::Plain, AuthMechanism::Digest]);
    assert_eq!(
        realm
            .mechanism_options(AuthMechanism::Digest)
            .get_bool("digest-plain-text"),
        Some(false)
    );

    let subject = realm.authenticate(&Credentials::password("admin", "changeit")).await?;
    assert_eq!(subject.groups(), vec!["Monitor", "SuperUser"]);
    assert_eq!(subject.roles(), vec!["Monitor", "SuperUser"]);

    let digest = password_digest("admin", REALM, "changeit");
    assert!(realm.authenticate(&Credentials::digest("admin", digest)).await.is_ok());
    assert!(matches!(
        realm.authenticate(&Credentials::password("admin", "guess")).await,
        Err(Error::AuthenticationFailed)
    ));
    Ok(())
}

#[tokio::test]
async fn role_mapping_waits_for_reload() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.protocol.apply(Change::new().with(Operation::AddRealm(
        RealmDefinition::new(REALM).with_authentication(users(&[("admin", "changeit")])),
    )))?;
    let outcome = env.protocol.apply(Change::new().with(Operation::SetMapGroupsToRoles {
        realm: REALM.into(),
        enabled: true,
    }))?;
    assert!(outcome.restarted.is_empty());
    assert_eq!(outcome.reload_required, vec![REALM.to_string()]);

    let stale = env.registry.lookup(REALM)?.expect("realm published");
    assert_eq!(env.protocol.reload()?, vec![REALM.to_string()]);
    let fresh = env.registry.lookup(REALM)?.expect("realm published");
    assert!(!Arc::ptr_eq(&stale, &fresh));
    assert!(env.protocol.reload_required().is_empty());
    Ok(())
}

#[derive(Debug)]
struct HostLogin;

impl LoginContext for HostLogin {
    fn login(&self, username: &str, password: &SecretString) -> sr_core::Result<Vec<String>> {
        if username == "operator" && password.expose_secret() == "s3cret" {
            Ok(vec!["Operators".to_string()])
        } else {
            Err(Error::AuthenticationFailed)
        }
    }
}

#[tokio::test]
async fn login_context_realm_is_ready_once_registered() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.protocol.apply(Change::new().with(Operation::AddRealm(
        RealmDefinition::new(REALM)
            .with_authentication(AuthenticationDefinition::Jaas {
                name: "host".into(),
                assign_groups: true,
            })
            .with_map_groups_to_roles(true),
    )))?;

    let realm = env.registry.lookup(REALM)?.expect("realm published");
    assert!(!realm.is_ready(AuthMechanism::Plain));
    assert!(matches!(
        realm.authenticate(&Credentials::password("operator", "s3cret")).await,
        Err(Error::NotReady(_))
    ));

    env.context.login_contexts.register("host", Arc::new(HostLogin));
    assert!(realm.is_ready(AuthMechanism::Plain));
    let subject = realm.authenticate(&Credentials::password("operator", "s3cret")).await?;
    assert_eq!(subject.groups(), vec!["Operators"]);
    assert_eq!(subject.roles(), vec!["Operators"]);
    Ok(())
}

#[tokio::test]
async fn removed_realm_is_withdrawn() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.protocol.apply(Change::new().with(Operation::AddRealm(
        RealmDefinition::new(REALM).with_authentication(users(&[("admin", "changeit")])),
    )))?;
    let held = env.registry.lookup(REALM)?.expect("realm published");

    let outcome = env
        .protocol
        .apply(Change::new().with(Operation::RemoveRealm { realm: REALM.into() }))?;
    assert_eq!(outcome.removed, vec![REALM.to_string()]);
    assert!(env.registry.lookup(REALM)?.is_none());

    // Holders of the old instance can finish their work.
    assert!(held.authenticate(&Credentials::password("admin", "changeit")).await.is_ok());
    Ok(())
}
