//! Booting realms from a management configuration file.

use std::fs;

use sr_core::Error;
use sr_integration_tests::TestEnv;
use sr_realm::mechanism::password_digest;
use sr_realm::ManagementConfig;
use sr_spi::{AuthMechanism, Credentials};

const CONFIG: &str = r#"
[[realm]]
name = "ManagementRealm"
map-groups-to-roles = true

[[realm.authentication]]
type = "properties"
path = "mgmt-users.properties"

[[realm.authorization]]
type = "properties"
path = "mgmt-groups.properties"

[[realm]]
name = "LdapRealm"

[[realm.authentication]]
type = "ldap"
connection = "corp"

[realm.authentication.user-search]
type = "username-filter"
base-dn = "ou=people,dc=example,dc=com"
recursive = true

[[realm.authorization]]
type = "ldap"

[realm.authorization.group-search]
type = "principal-to-group"
group-name-attribute = "cn"
iterative = true

[[realm]]
name = "KerberosRealm"

[[realm.authentication]]
type = "kerberos"
remove-realm = true

[realm.kerberos]
keytabs = [{ principal = "HTTP/mgmt.example.com@EXAMPLE.COM", path = "mgmt.keytab" }]
"#;

#[tokio::test]
async fn boots_every_realm_from_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("mgmt-users.properties"),
        format!("admin={}\n", password_digest("admin", "ManagementRealm", "changeit")),
    )?;
    fs::write(dir.path().join("mgmt-groups.properties"), "admin=SuperUser\n")?;
    let path = dir.path().join("management.toml");
    fs::write(&path, CONFIG)?;

    let mut env = TestEnv::new();
    let config = ManagementConfig::load(&path)?;
    config.register_connections(&env.context.connections)?;
    let outcome = env.protocol.apply(config.into_change())?;
    assert_eq!(outcome.restarted.len(), 3);
    assert_eq!(
        env.registry.names(),
        vec!["KerberosRealm", "LdapRealm", "ManagementRealm"]
    );

    let management = env.registry.lookup("ManagementRealm")?.expect("published");
    let subject = management
        .authenticate(&Credentials::password("admin", "changeit"))
        .await?;
    assert_eq!(subject.roles(), vec!["SuperUser"]);

    let ldap = env.registry.lookup("LdapRealm")?.expect("published");
    let subject = ldap.authenticate(&Credentials::password("alice", "wonderland")).await?;
    assert_eq!(subject.groups(), vec!["admins", "operators"]);

    let kerberos = env.registry.lookup("KerberosRealm")?.expect("published");
    assert!(kerberos.is_ready(AuthMechanism::Kerberos));
    Ok(())
}

#[tokio::test]
async fn invalid_boot_publishes_nothing() -> anyhow::Result<()> {
    let config = ManagementConfig::from_toml_str(
        r#"
[[realm]]
name = "Good"
[[realm.authentication]]
type = "users"
users = { admin = "changeit" }

[[realm]]
name = "Empty"
"#,
    )?;

    let mut env = TestEnv::new();
    let err = env.protocol.apply(config.into_change()).unwrap_err();
    assert!(matches!(err, Error::ConfigurationInvalid(ref msg) if msg.contains("Empty")));
    assert!(env.registry.names().is_empty());
    assert!(env.protocol.model().is_empty());
    Ok(())
}

#[test]
fn missing_file_is_io() {
    let err = ManagementConfig::load(std::path::Path::new("/nonexistent/management.toml")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
