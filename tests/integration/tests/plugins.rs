//! Plug-in mechanisms mounted through realm definitions.

use std::sync::Arc;

use async_trait::async_trait;
use sr_core::{Error, Result};
use sr_integration_tests::{users, TestEnv};
use sr_model::{PropertyList, RealmPrincipal, SharedState, Subject};
use sr_realm::{AuthenticationDefinition, AuthorizationDefinition, Change, Operation, RealmDefinition};
use sr_spi::{
    AuthMechanism, AuthenticatedIdentity, AuthenticationProvider, CredentialHandler, Credentials,
    Evidence, PluginFactory, PluginInstance, SubjectSupplemental,
};

const REALM: &str = "PluginRealm";
const MODULE: &str = "com.acme.security";

/// Accepts any user whose password equals the configured `master-key`.
#[derive(Debug)]
struct MasterKey {
    key: String,
}

#[async_trait]
impl CredentialHandler for MasterKey {
    async fn verify(&self, credentials: &Credentials) -> Result<AuthenticatedIdentity> {
        use secrecy::ExposeSecret;
        match &credentials.evidence {
            Evidence::Password(password) if password.expose_secret() == self.key => {
                Ok(AuthenticatedIdentity::new(credentials.username.clone()))
            }
            _ => Err(Error::AuthenticationFailed),
        }
    }
}

#[derive(Debug)]
struct MasterKeyProvider {
    handler: Arc<MasterKey>,
}

impl AuthenticationProvider for MasterKeyProvider {
    fn preferred_mechanism(&self) -> AuthMechanism {
        AuthMechanism::Plain
    }

    fn credential_handler(&self) -> Result<Arc<dyn CredentialHandler>> {
        let handler: Arc<dyn CredentialHandler> = self.handler.clone();
        Ok(handler)
    }
}

#[derive(Debug)]
struct Auditors;

#[async_trait]
impl SubjectSupplemental for Auditors {
    async fn supplement(&self, subject: &mut Subject, _state: &SharedState) -> Result<()> {
        let realm = subject.user().and_then(|u| u.realm()).unwrap_or(REALM).to_string();
        subject.add(RealmPrincipal::group_in(realm, "Auditor")?);
        Ok(())
    }
}

#[derive(Debug)]
struct MasterKeyFactory;

impl PluginFactory for MasterKeyFactory {
    fn name(&self) -> &str {
        "master-key"
    }

    fn create(&self, options: &PropertyList) -> Result<PluginInstance> {
        let key = options
            .value("master-key")
            .ok_or_else(|| Error::config("master-key option is required"))?;
        Ok(PluginInstance::Authentication(Arc::new(MasterKeyProvider {
            handler: Arc::new(MasterKey { key: key.to_string() }),
        })))
    }
}

#[derive(Debug)]
struct AuditorsFactory;

impl PluginFactory for AuditorsFactory {
    fn name(&self) -> &str {
        "auditors"
    }

    fn create(&self, _options: &PropertyList) -> Result<PluginInstance> {
        Ok(PluginInstance::Authorization(Arc::new(Auditors)))
    }
}

fn env() -> TestEnv {
    let env = TestEnv::new();
    env.context.plugins.register(MODULE, Arc::new(MasterKeyFactory));
    env.context.plugins.register(MODULE, Arc::new(AuditorsFactory));
    env
}

fn master_key() -> AuthenticationDefinition {
    AuthenticationDefinition::Plugin {
        name: "master-key".into(),
        properties: PropertyList::new().with("master-key", "open-sesame"),
    }
}

#[tokio::test]
async fn plugins_serve_both_mount_points() -> anyhow::Result<()> {
    let mut env = env();
    env.protocol.apply(Change::new().with(Operation::AddRealm(
        RealmDefinition::new(REALM)
            .with_plugin_module(MODULE)
            .with_authentication(master_key())
            .with_authorization(AuthorizationDefinition::Plugin {
                name: "auditors".into(),
                properties: PropertyList::new(),
            }),
    )))?;

    let realm = env.registry.lookup(REALM)?.expect("realm published");
    let subject = realm.authenticate(&Credentials::password("anyone", "open-sesame")).await?;
    assert_eq!(subject.groups(), vec!["Auditor"]);
    assert!(matches!(
        realm.authenticate(&Credentials::password("anyone", "closed")).await,
        Err(Error::AuthenticationFailed)
    ));
    Ok(())
}

#[tokio::test]
async fn unknown_module_is_rejected() {
    let mut env = env();
    let err = env
        .protocol
        .apply(Change::new().with(Operation::AddRealm(
            RealmDefinition::new(REALM)
                .with_plugin_module("com.example.missing")
                .with_authentication(master_key()),
        )))
        .unwrap_err();
    assert!(matches!(err, Error::PluginNotFound(ref msg) if msg.contains("com.example.missing")));
    assert!(env.registry.names().is_empty());
}

#[tokio::test]
async fn unknown_plugin_name_is_rejected() {
    let mut env = env();
    let err = env
        .protocol
        .apply(Change::new().with(Operation::AddRealm(
            RealmDefinition::new(REALM)
                .with_plugin_module(MODULE)
                .with_authentication(AuthenticationDefinition::Plugin {
                    name: "nonexistent".into(),
                    properties: PropertyList::new(),
                }),
        )))
        .unwrap_err();
    assert!(matches!(err, Error::PluginNotFound(_)));
}

#[tokio::test]
async fn wrong_capability_is_not_conforming() {
    let mut env = env();
    let err = env
        .protocol
        .apply(Change::new().with(Operation::AddRealm(
            RealmDefinition::new(REALM)
                .with_plugin_module(MODULE)
                .with_authentication(AuthenticationDefinition::Plugin {
                    name: "auditors".into(),
                    properties: PropertyList::new(),
                }),
        )))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::PluginNotConforming { ref name, capability: "authentication" } if name == "auditors"
    ));
}

#[tokio::test]
async fn module_can_be_declared_after_the_realm() -> anyhow::Result<()> {
    let mut env = env();
    env.protocol.apply(Change::new().with(Operation::AddRealm(
        RealmDefinition::new(REALM).with_authentication(users(&[("admin", "changeit")])),
    )))?;

    env.protocol.apply(
        Change::new()
            .with(Operation::AddPluginModule {
                realm: REALM.into(),
                module: MODULE.into(),
            })
            .with(Operation::AddAuthorization {
                realm: REALM.into(),
                mechanism: AuthorizationDefinition::Plugin {
                    name: "auditors".into(),
                    properties: PropertyList::new(),
                },
            }),
    )?;

    let realm = env.registry.lookup(REALM)?.expect("realm published");
    let subject = realm.authenticate(&Credentials::password("admin", "changeit")).await?;
    assert_eq!(subject.groups(), vec!["Auditor"]);
    Ok(())
}

#[tokio::test]
async fn unknown_module_declared_later_is_rejected() -> anyhow::Result<()> {
    let mut env = env();
    env.protocol.apply(Change::new().with(Operation::AddRealm(
        RealmDefinition::new(REALM)
            .with_plugin_module(MODULE)
            .with_authentication(master_key()),
    )))?;
    let before = env.registry.lookup(REALM)?.expect("realm published");

    let err = env
        .protocol
        .apply(Change::new().with(Operation::AddPluginModule {
            realm: REALM.into(),
            module: "com.example.missing".into(),
        }))
        .unwrap_err();
    assert!(matches!(err, Error::PluginNotFound(ref msg) if msg.contains("com.example.missing")));
    assert_eq!(
        env.protocol.model().get(REALM).map(|r| r.plugin_modules.clone()),
        Some(vec![MODULE.to_string()])
    );
    let after = env.registry.lookup(REALM)?.expect("realm still published");
    assert!(Arc::ptr_eq(&before, &after));

    env.protocol.revalidate(REALM)?;
    env.protocol.apply(Change::new().with(Operation::AddAuthorization {
        realm: REALM.into(),
        mechanism: AuthorizationDefinition::Plugin {
            name: "auditors".into(),
            properties: PropertyList::new(),
        },
    }))?;
    Ok(())
}

#[tokio::test]
async fn plugin_options_are_validated_by_the_plugin() {
    let mut env = env();
    let err = env
        .protocol
        .apply(Change::new().with(Operation::AddRealm(
            RealmDefinition::new(REALM)
                .with_plugin_module(MODULE)
                .with_authentication(AuthenticationDefinition::Plugin {
                    name: "master-key".into(),
                    properties: PropertyList::new(),
                }),
        )))
        .unwrap_err();
    assert!(matches!(err, Error::ConfigurationInvalid(ref msg) if msg.contains("master-key")));
}
