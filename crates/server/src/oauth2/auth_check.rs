//! Resource-owner credential verification used by the password grant.

use async_trait::async_trait;

use crate::config::UserConfig;
use crate::oauth2::password::SecretHasher;

/// Host-supplied username/password verifier.
#[async_trait]
pub trait AuthCheck: Send + Sync {
    /// The user id for valid credentials, `None` otherwise.
    async fn check_credentials(&self, username: &str, password: &str) -> Option<i64>;
}

/// Verifies against the `users` section of the configuration.
#[derive(Clone, Debug, Default)]
pub struct ConfiguredUsers {
    users: Vec<UserConfig>,
}

impl ConfiguredUsers {
    pub fn new(users: Vec<UserConfig>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl AuthCheck for ConfiguredUsers {
    async fn check_credentials(&self, username: &str, password: &str) -> Option<i64> {
        let user = self.users.iter().find(|u| u.username == username)?;
        SecretHasher::verify_blocking(password.to_string(), user.password_hash.clone())
            .await
            .then_some(user.user_id)
    }
}
