//! Inline user store.

use std::collections::BTreeMap;
use std::sync::Arc;

use sr_core::Result;
use sr_model::PropertyList;
use sr_spi::{AuthMechanism, AuthenticationProvider, CredentialHandler};

use super::properties::{PasswordStore, DIGEST_PLAIN_TEXT};

/// Authentication against users listed in the realm definition.
///
/// Passwords are held in clear text, so both plain and digest
/// authentication are available.
#[derive(Debug)]
pub struct UsersAuthentication {
    store: Arc<PasswordStore>,
}

impl UsersAuthentication {
    /// Creates the mechanism for `realm`.
    #[must_use]
    pub fn new(realm: &str, users: &BTreeMap<String, String>) -> Self {
        let users = users.iter().map(|(user, password)| (user.clone(), password.clone()));
        Self {
            store: Arc::new(PasswordStore::new(realm, true, users)),
        }
    }

    /// Number of users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuthenticationProvider for UsersAuthentication {
    fn preferred_mechanism(&self) -> AuthMechanism {
        AuthMechanism::Plain
    }

    fn supplemental_mechanisms(&self) -> Vec<AuthMechanism> {
        vec![AuthMechanism::Digest]
    }

    fn mechanism_options(&self, mechanism: AuthMechanism) -> PropertyList {
        match mechanism {
            AuthMechanism::Digest => PropertyList::new().with(DIGEST_PLAIN_TEXT, "true"),
            _ => PropertyList::new(),
        }
    }

    fn credential_handler(&self) -> Result<Arc<dyn CredentialHandler>> {
        let handler: Arc<dyn CredentialHandler> = self.store.clone();
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use sr_core::Error;
    use sr_spi::Credentials;

    use super::*;
    use crate::mechanism::properties::password_digest;

    #[tokio::test]
    async fn verifies_inline_users() {
        let users = BTreeMap::from([("admin".to_string(), "changeit".to_string())]);
        let auth = UsersAuthentication::new("ManagementRealm", &users);
        let handler = auth.credential_handler().unwrap();

        let identity = handler
            .verify(&Credentials::password("admin", "changeit"))
            .await
            .unwrap();
        assert_eq!(identity.name, "admin");

        let digest = password_digest("admin", "ManagementRealm", "changeit");
        assert!(handler.verify(&Credentials::digest("admin", digest)).await.is_ok());
        assert!(matches!(
            handler.verify(&Credentials::password("admin", "wrong")).await,
            Err(Error::AuthenticationFailed)
        ));
        assert_eq!(auth.len(), 1);
    }
}
