//! Plug-in loader.
//!
//! Externally supplied mechanisms are registered as named factories grouped
//! by module. A realm declares the modules it draws plug-ins from; mounting a
//! plug-in looks the name up in those modules, instantiates it with the
//! mechanism's property list and checks that it provides the capability the
//! mount point needs.
//!
//! The loader never interprets the options it passes through.

use std::fmt::Debug;
use std::sync::Arc;

use dashmap::DashMap;
use sr_core::{Error, Result};
use sr_model::PropertyList;

use crate::mechanism::{AuthenticationProvider, SubjectSupplemental};

/// What a plug-in factory produced.
#[derive(Debug, Clone)]
pub enum PluginInstance {
    /// An authentication mechanism only.
    Authentication(Arc<dyn AuthenticationProvider>),
    /// An authorization mechanism only.
    Authorization(Arc<dyn SubjectSupplemental>),
    /// A plug-in that can serve both mount points.
    Both {
        /// The authentication side.
        authentication: Arc<dyn AuthenticationProvider>,
        /// The authorization side.
        authorization: Arc<dyn SubjectSupplemental>,
    },
}

impl PluginInstance {
    fn into_authentication(self) -> Option<Arc<dyn AuthenticationProvider>> {
        match self {
            Self::Authentication(provider) | Self::Both { authentication: provider, .. } => {
                Some(provider)
            }
            Self::Authorization(_) => None,
        }
    }

    fn into_authorization(self) -> Option<Arc<dyn SubjectSupplemental>> {
        match self {
            Self::Authorization(supplemental) | Self::Both { authorization: supplemental, .. } => {
                Some(supplemental)
            }
            Self::Authentication(_) => None,
        }
    }
}

/// Factory for one named plug-in.
pub trait PluginFactory: Send + Sync + Debug {
    /// The plug-in name mechanisms refer to.
    fn name(&self) -> &str;

    /// Instantiates the plug-in with its configured options.
    ///
    /// ## Errors
    ///
    /// Returns an error if the plug-in rejects its options.
    fn create(&self, options: &PropertyList) -> Result<PluginInstance>;
}

/// Registry of plug-in factories keyed by module.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    modules: DashMap<String, Vec<Arc<dyn PluginFactory>>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `module`.
    pub fn register(&self, module: impl Into<String>, factory: Arc<dyn PluginFactory>) {
        let module = module.into();
        tracing::debug!(module = %module, plugin = factory.name(), "registering plug-in factory");
        self.modules.entry(module).or_default().push(factory);
    }

    /// Whether `module` has been registered.
    #[must_use]
    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// Lists plug-in names registered under `module`.
    #[must_use]
    pub fn list_plugins(&self, module: &str) -> Vec<String> {
        self.modules
            .get(module)
            .map(|factories| factories.iter().map(|f| f.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Loads the authentication plug-in `name` from `modules`.
    ///
    /// ## Errors
    ///
    /// - [`Error::PluginNotFound`] if a module is unknown or no module
    ///   provides `name`
    /// - [`Error::PluginNotConforming`] if the plug-in is authorization-only
    pub fn load_authentication(
        &self,
        modules: &[String],
        name: &str,
        options: &PropertyList,
    ) -> Result<Arc<dyn AuthenticationProvider>> {
        let instance = self.instantiate(modules, name, options)?;
        instance
            .into_authentication()
            .ok_or_else(|| Error::PluginNotConforming {
                name: name.to_string(),
                capability: "authentication",
            })
    }

    /// Loads the authorization plug-in `name` from `modules`.
    ///
    /// ## Errors
    ///
    /// - [`Error::PluginNotFound`] if a module is unknown or no module
    ///   provides `name`
    /// - [`Error::PluginNotConforming`] if the plug-in is authentication-only
    pub fn load_authorization(
        &self,
        modules: &[String],
        name: &str,
        options: &PropertyList,
    ) -> Result<Arc<dyn SubjectSupplemental>> {
        let instance = self.instantiate(modules, name, options)?;
        instance
            .into_authorization()
            .ok_or_else(|| Error::PluginNotConforming {
                name: name.to_string(),
                capability: "authorization",
            })
    }

    fn instantiate(
        &self,
        modules: &[String],
        name: &str,
        options: &PropertyList,
    ) -> Result<PluginInstance> {
        let factory = self.find(modules, name)?;
        tracing::debug!(plugin = name, options = options.len(), "instantiating plug-in");
        factory.create(options)
    }

    fn find(&self, modules: &[String], name: &str) -> Result<Arc<dyn PluginFactory>> {
        for module in modules {
            let factories = self
                .modules
                .get(module)
                .ok_or_else(|| Error::PluginNotFound(format!("module '{module}'")))?;
            if let Some(factory) = factories.iter().find(|f| f.name() == name) {
                return Ok(Arc::clone(factory));
            }
        }
        Err(Error::PluginNotFound(format!(
            "'{name}' in modules [{}]",
            modules.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use sr_model::{SharedState, Subject};

    use super::*;
    use crate::mechanism::{AuthMechanism, CredentialHandler};

    #[derive(Debug)]
    struct NoopAuthentication;

    impl AuthenticationProvider for NoopAuthentication {
        fn preferred_mechanism(&self) -> AuthMechanism {
            AuthMechanism::Custom
        }

        fn credential_handler(&self) -> Result<Arc<dyn CredentialHandler>> {
            Err(Error::not_ready("noop"))
        }
    }

    #[derive(Debug)]
    struct NoopAuthorization;

    #[async_trait]
    impl SubjectSupplemental for NoopAuthorization {
        async fn supplement(&self, _subject: &mut Subject, _state: &SharedState) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Factory {
        name: &'static str,
        authorization_only: bool,
    }

    impl PluginFactory for Factory {
        fn name(&self) -> &str {
            self.name
        }

        fn create(&self, options: &PropertyList) -> Result<PluginInstance> {
            if options.contains_key("reject") {
                return Err(Error::config("rejected option"));
            }
            if self.authorization_only {
                Ok(PluginInstance::Authorization(Arc::new(NoopAuthorization)))
            } else {
                Ok(PluginInstance::Authentication(Arc::new(NoopAuthentication)))
            }
        }
    }

    fn registry() -> PluginRegistry {
        let registry = PluginRegistry::new();
        registry.register(
            "com.acme.auth",
            Arc::new(Factory {
                name: "acme-auth",
                authorization_only: false,
            }),
        );
        registry.register(
            "com.acme.auth",
            Arc::new(Factory {
                name: "acme-groups",
                authorization_only: true,
            }),
        );
        registry
    }

    #[test]
    fn loads_plugin_from_declared_module() {
        let registry = registry();
        let modules = vec!["com.acme.auth".to_string()];
        let provider = registry
            .load_authentication(&modules, "acme-auth", &PropertyList::new())
            .unwrap();
        assert_eq!(provider.preferred_mechanism(), AuthMechanism::Custom);
        assert!(registry
            .load_authorization(&modules, "acme-groups", &PropertyList::new())
            .is_ok());
        assert_eq!(registry.list_plugins("com.acme.auth").len(), 2);
    }

    #[test]
    fn unknown_plugin_and_module_are_not_found() {
        let registry = registry();
        let modules = vec!["com.acme.auth".to_string()];
        let err = registry
            .load_authentication(&modules, "missing", &PropertyList::new())
            .unwrap_err();
        assert!(matches!(err, Error::PluginNotFound(_)));

        let err = registry
            .load_authentication(&["com.other".to_string()], "acme-auth", &PropertyList::new())
            .unwrap_err();
        assert!(matches!(err, Error::PluginNotFound(msg) if msg.contains("com.other")));
    }

    #[test]
    fn wrong_capability_is_not_conforming() {
        let registry = registry();
        let modules = vec!["com.acme.auth".to_string()];
        let err = registry
            .load_authentication(&modules, "acme-groups", &PropertyList::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PluginNotConforming { capability: "authentication", .. }
        ));
    }

    #[test]
    fn factory_errors_propagate() {
        let registry = registry();
        let modules = vec!["com.acme.auth".to_string()];
        let options = PropertyList::new().with_flag("reject");
        let err = registry
            .load_authentication(&modules, "acme-auth", &options)
            .unwrap_err();
        assert!(matches!(err, Error::ConfigurationInvalid(_)));
    }
}
