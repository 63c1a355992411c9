//! Thin wrapper over the identity provider.

use std::sync::Arc;

use taskmaster_core::{Session, UserId};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::provider::IdentityProvider;

/// Translates auth calls into provider calls and provider failures into [`GatewayError`].
pub struct AuthGateway<P> {
    provider: Arc<P>,
}

impl<P> Clone for AuthGateway<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<P: IdentityProvider> AuthGateway<P> {
    /// Wrap a shared provider.
    pub const fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Borrow the shared provider.
    pub const fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Create or resume an anonymous session.
    ///
    /// # Errors
    /// Returns [`GatewayError::Transport`] when the provider rejects or fails the call.
    pub async fn sign_in_anonymously(&self) -> Result<Session, GatewayError> {
        let result = self.provider.sign_in_anonymously().await;
        Self::log_outcome("anonymous", result.map_err(GatewayError::transport))
    }

    /// Sign in to an existing account.
    ///
    /// # Errors
    /// Returns [`GatewayError::Transport`] when the provider rejects or fails the call.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, GatewayError> {
        let result = self.provider.sign_in_with_password(email, password).await;
        Self::log_outcome("password", result.map_err(GatewayError::transport))
    }

    /// Create a new account.
    ///
    /// # Errors
    /// Returns [`GatewayError::Transport`] when the provider rejects or fails the call.
    pub async fn sign_up_with_password(&self, email: &str, password: &str) -> Result<Session, GatewayError> {
        let result = self.provider.sign_up_with_password(email, password).await;
        Self::log_outcome("sign-up", result.map_err(GatewayError::transport))
    }

    /// Clear the session.
    pub fn sign_out(&self) {
        self.provider.sign_out();
        info!("Signed out");
    }

    /// Current session, if any.
    pub fn current_session(&self) -> Option<Session> {
        self.provider.current_session()
    }

    /// Identifier of the signed-in user.
    ///
    /// # Errors
    /// Returns [`GatewayError::NotAuthenticated`] when nobody is signed in.
    pub fn current_user(&self) -> Result<UserId, GatewayError> {
        self.current_session()
            .map(|session| session.user_id)
            .ok_or(GatewayError::NotAuthenticated)
    }

    /// Observe session changes.
    pub fn watch_session(&self) -> watch::Receiver<Option<Session>> {
        self.provider.watch_session()
    }

    fn log_outcome(method: &str, result: Result<Session, GatewayError>) -> Result<Session, GatewayError> {
        match &result {
            Ok(session) => info!(method, user = %session.user_id, "Signed in"),
            Err(err) => warn!(method, error = %err, "Sign-in failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmaster_store_memory::MemoryIdentityProvider;

    fn gateway() -> AuthGateway<MemoryIdentityProvider> {
        AuthGateway::new(Arc::new(MemoryIdentityProvider::with_settings(4, 6)))
    }

    #[tokio::test]
    async fn sign_up_publishes_session_to_watchers() -> Result<(), GatewayError> {
        let auth = gateway();
        let watcher = auth.watch_session();
        let session = auth.sign_up_with_password("a@example.com", "secret1").await?;
        assert_eq!(watcher.borrow().as_ref(), Some(&session));
        assert_eq!(auth.current_user()?, session.user_id);
        Ok(())
    }

    #[tokio::test]
    async fn provider_rejection_surfaces_provider_message() {
        let auth = gateway();
        let Err(err) = auth.sign_in_with_password("a@example.com", "secret1").await else {
            panic!("unknown account must be rejected");
        };
        assert!(matches!(err, GatewayError::Transport(_)));
        assert_eq!(err.to_string(), "The email or password is incorrect.");
        assert!(auth.current_session().is_none());
    }

    #[tokio::test]
    async fn sign_out_clears_current_user() -> Result<(), GatewayError> {
        let auth = gateway();
        auth.sign_in_anonymously().await?;
        auth.sign_out();
        assert!(matches!(auth.current_user(), Err(GatewayError::NotAuthenticated)));
        Ok(())
    }
}
