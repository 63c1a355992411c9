//! Provider abstractions the gateways are written against.

use std::any::Any;
use std::future::Future;

use anyhow::Error;
use taskmaster_core::{Session, Task, TaskId, UserId};
use taskmaster_store_memory::{
    AuthError, ConditionalWrite, MemoryDocumentStore, MemoryIdentityProvider, StoreError,
};
use tokio::sync::{mpsc, watch};

/// Remote identity service.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Error type bubbled up from the provider.
    type Error: Into<Error> + Send;

    /// Create or resume an anonymous session.
    ///
    /// # Errors
    /// Returns a provider-specific error when the sign-in is rejected or fails.
    fn sign_in_anonymously(&self) -> impl Future<Output = Result<Session, Self::Error>> + Send;

    /// Sign in to an existing email account.
    ///
    /// # Errors
    /// Returns a provider-specific error when the credentials are rejected.
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Session, Self::Error>> + Send;

    /// Create an email account and sign in to it.
    ///
    /// # Errors
    /// Returns a provider-specific error when the account cannot be created.
    fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Session, Self::Error>> + Send;

    /// Clear the local and remote session.
    fn sign_out(&self);

    /// Authoritative current session.
    fn current_session(&self) -> Option<Session>;

    /// Observe every session change, including provider-side expiry.
    fn watch_session(&self) -> watch::Receiver<Option<Session>>;
}

/// Outcome of a conditional completion write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionWrite {
    /// The new flag was stored.
    Applied,
    /// The document no longer exists.
    Missing,
    /// The stored flag changed since it was read.
    PreconditionFailed,
}

/// Remote document collection holding tasks.
pub trait DocumentStore: Send + Sync + 'static {
    /// Error type bubbled up from the backing store.
    type Error: Into<Error> + Send;

    /// Persist a new document and return its server-assigned id.
    ///
    /// # Errors
    /// Returns a store-specific error when the write fails.
    fn create(&self, task: &Task) -> impl Future<Output = Result<TaskId, Self::Error>> + Send;

    /// Read one document.
    ///
    /// # Errors
    /// Returns a store-specific error when the read fails.
    fn get(&self, id: &TaskId) -> impl Future<Output = Result<Option<Task>, Self::Error>> + Send;

    /// Check whether a document exists.
    ///
    /// # Errors
    /// Returns a store-specific error when the check fails.
    fn exists(&self, id: &TaskId) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Overwrite the full document at `task.id`.
    ///
    /// # Errors
    /// Returns a store-specific error when the write fails.
    fn replace(&self, task: &Task) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Set the completion flag only if the stored flag still equals `expected`.
    ///
    /// # Errors
    /// Returns a store-specific error when the write fails.
    fn set_completed_if(
        &self,
        id: &TaskId,
        expected: bool,
        completed: bool,
    ) -> impl Future<Output = Result<CompletionWrite, Self::Error>> + Send;

    /// Delete one document.
    ///
    /// # Errors
    /// Returns a store-specific error when the delete fails.
    fn delete(&self, id: &TaskId) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Open a live query over `owner`'s tasks, newest first.
    ///
    /// # Errors
    /// Returns a store-specific error when the query cannot be registered.
    fn listen(
        &self,
        owner: &UserId,
    ) -> impl Future<Output = Result<LiveQuery<Self::Error>, Self::Error>> + Send;
}

/// Channel end of a live query plus the guard keeping it registered.
///
/// Dropping it closes the query.
pub struct LiveQuery<E> {
    rx: mpsc::UnboundedReceiver<Result<Vec<Task>, E>>,
    _registration: Box<dyn Any + Send + Sync>,
}

impl<E> LiveQuery<E> {
    /// Pair a receiver with the value whose drop unregisters the query.
    pub fn new<R>(rx: mpsc::UnboundedReceiver<Result<Vec<Task>, E>>, registration: R) -> Self
    where
        R: Any + Send + Sync,
    {
        Self {
            rx,
            _registration: Box::new(registration),
        }
    }

    /// Next full result set; `None` once the store closed the query.
    pub async fn next(&mut self) -> Option<Result<Vec<Task>, E>> {
        self.rx.recv().await
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    type Error = AuthError;

    async fn sign_in_anonymously(&self) -> Result<Session, Self::Error> {
        Self::sign_in_anonymously(self)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, Self::Error> {
        let provider = self.clone();
        let (email, password) = (email.to_owned(), password.to_owned());
        // bcrypt verification is CPU bound
        tokio::task::spawn_blocking(move || provider.sign_in_with_password(&email, &password))
            .await
            .map_err(|e| AuthError::Join(e.to_string()))?
    }

    async fn sign_up_with_password(&self, email: &str, password: &str) -> Result<Session, Self::Error> {
        let provider = self.clone();
        let (email, password) = (email.to_owned(), password.to_owned());
        tokio::task::spawn_blocking(move || provider.sign_up_with_password(&email, &password))
            .await
            .map_err(|e| AuthError::Join(e.to_string()))?
    }

    fn sign_out(&self) {
        Self::sign_out(self);
    }

    fn current_session(&self) -> Option<Session> {
        Self::current_session(self)
    }

    fn watch_session(&self) -> watch::Receiver<Option<Session>> {
        self.watch()
    }
}

impl DocumentStore for MemoryDocumentStore {
    type Error = StoreError;

    async fn create(&self, task: &Task) -> Result<TaskId, Self::Error> {
        Self::create(self, task).map(|stored| stored.id)
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>, Self::Error> {
        Self::get(self, id)
    }

    async fn exists(&self, id: &TaskId) -> Result<bool, Self::Error> {
        Self::exists(self, id)
    }

    async fn replace(&self, task: &Task) -> Result<(), Self::Error> {
        Self::set(self, task).map(|_| ())
    }

    async fn set_completed_if(
        &self,
        id: &TaskId,
        expected: bool,
        completed: bool,
    ) -> Result<CompletionWrite, Self::Error> {
        Ok(match Self::set_completed_if(self, id, expected, completed)? {
            ConditionalWrite::Applied(_) => CompletionWrite::Applied,
            ConditionalWrite::Missing => CompletionWrite::Missing,
            ConditionalWrite::PreconditionFailed => CompletionWrite::PreconditionFailed,
        })
    }

    async fn delete(&self, id: &TaskId) -> Result<(), Self::Error> {
        Self::delete(self, id).map(|_| ())
    }

    async fn listen(&self, owner: &UserId) -> Result<LiveQuery<Self::Error>, Self::Error> {
        let (rx, registration) = Self::listen(self, owner)?.into_parts();
        Ok(LiveQuery::new(rx, registration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn password_calls_yield_to_other_tasks_while_hashing() -> anyhow::Result<()> {
        let provider = MemoryIdentityProvider::with_settings(4, 6);
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            })
        };

        let session =
            IdentityProvider::sign_up_with_password(&provider, "alice@example.com", "secret1").await?;
        let during_sign_up = ticks.load(Ordering::SeqCst);
        IdentityProvider::sign_in_with_password(&provider, "alice@example.com", "secret1").await?;
        ticker.abort();

        assert!(during_sign_up > 0);
        assert!(ticks.load(Ordering::SeqCst) > during_sign_up);
        assert_eq!(provider.current_session(), Some(session));
        Ok(())
    }

    #[tokio::test]
    async fn rejected_password_survives_the_blocking_pool() -> anyhow::Result<()> {
        let provider = MemoryIdentityProvider::with_settings(4, 6);
        IdentityProvider::sign_up_with_password(&provider, "alice@example.com", "secret1").await?;
        IdentityProvider::sign_out(&provider);

        let result =
            IdentityProvider::sign_in_with_password(&provider, "alice@example.com", "wrong-password").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        assert!(provider.current_session().is_none());
        Ok(())
    }
}
