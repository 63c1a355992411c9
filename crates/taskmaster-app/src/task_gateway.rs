//! Owner-checked task operations over the document store.

use std::sync::Arc;

use taskmaster_core::{Task, TaskId, UserId};
use tracing::{debug, info};

use crate::auth_gateway::AuthGateway;
use crate::error::GatewayError;
use crate::provider::{CompletionWrite, DocumentStore, IdentityProvider, LiveQuery};

/// Task Store Gateway: every call re-reads the caller from the identity provider.
pub struct TaskGateway<P, S> {
    auth: AuthGateway<P>,
    store: Arc<S>,
}

impl<P, S> Clone for TaskGateway<P, S> {
    fn clone(&self) -> Self {
        Self {
            auth: self.auth.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<P, S> TaskGateway<P, S>
where
    P: IdentityProvider,
    S: DocumentStore,
{
    /// Construct a gateway over shared providers.
    pub const fn new(auth: AuthGateway<P>, store: Arc<S>) -> Self {
        Self { auth, store }
    }

    /// Borrow the auth gateway used for caller lookup.
    pub const fn auth(&self) -> &AuthGateway<P> {
        &self.auth
    }

    /// Open the live task feed for the signed-in user.
    ///
    /// Without a session the feed yields one empty list and ends.
    pub async fn subscribe_tasks(&self) -> TaskSubscription<S::Error> {
        let Ok(owner) = self.auth.current_user() else {
            debug!("No session; task feed is empty");
            return TaskSubscription::signed_out();
        };
        match self.store.listen(&owner).await {
            Ok(query) => {
                debug!(%owner, "Task feed opened");
                TaskSubscription {
                    state: FeedState::Live(query),
                    owner: Some(owner),
                }
            }
            Err(err) => TaskSubscription {
                state: FeedState::Failed(Some(GatewayError::transport(err))),
                owner: Some(owner),
            },
        }
    }

    /// Persist a new task owned by the caller and return its id.
    ///
    /// Any `user_id` on the input is replaced with the caller's id.
    ///
    /// # Errors
    /// Returns [`GatewayError::NotAuthenticated`] without a session or
    /// [`GatewayError::Transport`] when the store write fails.
    pub async fn create_task(&self, task: Task) -> Result<TaskId, GatewayError> {
        let owner = self.auth.current_user()?;
        let task = Task {
            user_id: owner.clone(),
            ..task
        };
        let id = self.store.create(&task).await.map_err(GatewayError::transport)?;
        info!(%id, %owner, "Task created");
        Ok(id)
    }

    /// Overwrite an existing task owned by the caller.
    ///
    /// Both the stored record and `task.user_id` must belong to the caller.
    ///
    /// # Errors
    /// Returns [`GatewayError::NotAuthenticated`], [`GatewayError::NotFound`] when no
    /// record has that id, [`GatewayError::Unauthorized`] when either owner is not the
    /// caller, or [`GatewayError::Transport`].
    pub async fn replace_task(&self, task: Task) -> Result<(), GatewayError> {
        let owner = self.auth.current_user()?;
        if !task.is_owned_by(&owner) {
            return Err(GatewayError::Unauthorized);
        }
        self.owned_task(&task.id).await?;
        self.store.replace(&task).await.map_err(GatewayError::transport)?;
        info!(id = %task.id, "Task replaced");
        Ok(())
    }

    /// Delete a task after checking the stored owner.
    ///
    /// A missing task is reported as [`GatewayError::Unauthorized`].
    ///
    /// # Errors
    /// Returns [`GatewayError::NotAuthenticated`], [`GatewayError::Unauthorized`], or
    /// [`GatewayError::Transport`].
    pub async fn delete_task(&self, id: &TaskId) -> Result<(), GatewayError> {
        let owner = self.auth.current_user()?;
        let stored = self.store.get(id).await.map_err(GatewayError::transport)?;
        if !stored.is_some_and(|task| task.is_owned_by(&owner)) {
            return Err(GatewayError::Unauthorized);
        }
        self.store.delete(id).await.map_err(GatewayError::transport)?;
        info!(%id, "Task deleted");
        Ok(())
    }

    /// Invert the completion flag and return the new value.
    ///
    /// The write only applies if the flag is unchanged since it was read.
    ///
    /// # Errors
    /// Returns [`GatewayError::NotAuthenticated`], [`GatewayError::NotFound`],
    /// [`GatewayError::Unauthorized`], [`GatewayError::Conflict`] when another write won,
    /// or [`GatewayError::Transport`].
    pub async fn toggle_completion(&self, id: &TaskId) -> Result<bool, GatewayError> {
        let task = self.owned_task(id).await?;
        let completed = !task.is_completed;
        let outcome = self
            .store
            .set_completed_if(id, task.is_completed, completed)
            .await
            .map_err(GatewayError::transport)?;
        match outcome {
            CompletionWrite::Applied => {
                info!(%id, completed, "Task completion toggled");
                Ok(completed)
            }
            CompletionWrite::Missing => Err(GatewayError::NotFound),
            CompletionWrite::PreconditionFailed => Err(GatewayError::Conflict),
        }
    }

    /// Read one of the caller's tasks.
    ///
    /// # Errors
    /// Returns [`GatewayError::NotAuthenticated`], [`GatewayError::NotFound`],
    /// [`GatewayError::Unauthorized`], or [`GatewayError::Transport`].
    pub async fn get_task(&self, id: &TaskId) -> Result<Task, GatewayError> {
        self.owned_task(id).await
    }

    /// Whether the caller owns a task with this id.
    ///
    /// # Errors
    /// Returns [`GatewayError::NotAuthenticated`] or [`GatewayError::Transport`].
    pub async fn task_exists(&self, id: &TaskId) -> Result<bool, GatewayError> {
        let owner = self.auth.current_user()?;
        if !self.store.exists(id).await.map_err(GatewayError::transport)? {
            return Ok(false);
        }
        let stored = self.store.get(id).await.map_err(GatewayError::transport)?;
        Ok(stored.is_some_and(|task| task.is_owned_by(&owner)))
    }

    async fn owned_task(&self, id: &TaskId) -> Result<Task, GatewayError> {
        let owner = self.auth.current_user()?;
        let task = self
            .store
            .get(id)
            .await
            .map_err(GatewayError::transport)?
            .ok_or(GatewayError::NotFound)?;
        if task.is_owned_by(&owner) {
            Ok(task)
        } else {
            Err(GatewayError::Unauthorized)
        }
    }
}

enum FeedState<E> {
    SignedOut { sent: bool },
    Live(LiveQuery<E>),
    Failed(Option<GatewayError>),
    Closed,
}

/// Sequence of full task lists for one user.
///
/// Ends after a transport error; resubscribing is up to the caller.
pub struct TaskSubscription<E> {
    state: FeedState<E>,
    owner: Option<UserId>,
}

impl<E> TaskSubscription<E>
where
    E: Into<anyhow::Error>,
{
    const fn signed_out() -> Self {
        Self {
            state: FeedState::SignedOut { sent: false },
            owner: None,
        }
    }

    /// User whose tasks this feed carries; `None` for the signed-out feed.
    pub const fn owner(&self) -> Option<&UserId> {
        self.owner.as_ref()
    }

    /// Next emission; `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Result<Vec<Task>, GatewayError>> {
        match &mut self.state {
            FeedState::SignedOut { sent } => {
                if *sent {
                    self.state = FeedState::Closed;
                    None
                } else {
                    *sent = true;
                    Some(Ok(Vec::new()))
                }
            }
            FeedState::Live(query) => match query.next().await {
                Some(Ok(tasks)) => Some(Ok(tasks)),
                Some(Err(err)) => {
                    self.state = FeedState::Closed;
                    Some(Err(GatewayError::transport(err)))
                }
                None => {
                    self.state = FeedState::Closed;
                    None
                }
            },
            FeedState::Failed(err) => {
                let err = err.take();
                self.state = FeedState::Closed;
                err.map(Err)
            }
            FeedState::Closed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmaster_core::{Category, Priority};
    use taskmaster_store_memory::{MemoryDocumentStore, MemoryIdentityProvider};

    type Gateway = TaskGateway<MemoryIdentityProvider, MemoryDocumentStore>;

    fn setup() -> (Gateway, MemoryIdentityProvider, MemoryDocumentStore) {
        let identity = MemoryIdentityProvider::with_settings(4, 6);
        let store = MemoryDocumentStore::default();
        let gateway = TaskGateway::new(
            AuthGateway::new(Arc::new(identity.clone())),
            Arc::new(store.clone()),
        );
        (gateway, identity, store)
    }

    fn milk() -> Task {
        Task::new("Buy milk")
            .with_priority(Priority::Low)
            .with_category(Category::Shopping)
    }

    #[tokio::test]
    async fn create_stamps_caller_regardless_of_input_owner() -> anyhow::Result<()> {
        let (gateway, identity, store) = setup();
        let alice = identity.sign_up_with_password("alice@example.com", "secret1")?.user_id;

        let forged = Task {
            user_id: UserId::from("mallory"),
            ..milk()
        };
        let id = gateway.create_task(forged).await?;
        let stored = store.get(&id)?.ok_or(GatewayError::NotFound)?;
        assert_eq!(stored.user_id, alice);
        Ok(())
    }

    #[tokio::test]
    async fn mutations_without_session_fail_and_leave_store_untouched() -> anyhow::Result<()> {
        let (gateway, identity, store) = setup();
        identity.sign_in_anonymously()?;
        let id = gateway.create_task(milk()).await?;
        let before = store.get(&id)?;
        identity.sign_out();

        assert!(matches!(gateway.create_task(milk()).await, Err(GatewayError::NotAuthenticated)));
        assert!(matches!(gateway.delete_task(&id).await, Err(GatewayError::NotAuthenticated)));
        assert!(matches!(gateway.toggle_completion(&id).await, Err(GatewayError::NotAuthenticated)));
        let replacement = before.clone().ok_or(GatewayError::NotFound)?;
        assert!(matches!(
            gateway.replace_task(replacement).await,
            Err(GatewayError::NotAuthenticated)
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&id)?, before);
        Ok(())
    }

    #[tokio::test]
    async fn non_owner_is_unauthorized_and_record_is_unchanged() -> anyhow::Result<()> {
        let (gateway, identity, store) = setup();
        identity.sign_up_with_password("alice@example.com", "secret1")?;
        let id = gateway.create_task(milk()).await?;
        let original = store.get(&id)?.ok_or(GatewayError::NotFound)?;

        identity.sign_up_with_password("bob@example.com", "secret1")?;
        assert!(matches!(gateway.toggle_completion(&id).await, Err(GatewayError::Unauthorized)));
        assert!(matches!(gateway.delete_task(&id).await, Err(GatewayError::Unauthorized)));
        let hijack = Task {
            title: "mine now".into(),
            ..original.clone()
        };
        assert!(matches!(gateway.replace_task(hijack).await, Err(GatewayError::Unauthorized)));
        assert!(matches!(gateway.get_task(&id).await, Err(GatewayError::Unauthorized)));
        assert!(!gateway.task_exists(&id).await?);

        assert_eq!(store.get(&id)?, Some(original));
        Ok(())
    }

    #[tokio::test]
    async fn replace_with_foreign_id_is_unauthorized_even_when_owner_is_caller() -> anyhow::Result<()> {
        let (gateway, identity, store) = setup();
        identity.sign_up_with_password("alice@example.com", "secret1")?;
        let id = gateway.create_task(milk()).await?;
        let original = store.get(&id)?.ok_or(GatewayError::NotFound)?;

        let bob = identity.sign_up_with_password("bob@example.com", "secret1")?.user_id;
        let forged = Task {
            user_id: bob,
            title: "pwned".into(),
            ..original.clone()
        };
        assert!(matches!(gateway.replace_task(forged).await, Err(GatewayError::Unauthorized)));
        assert_eq!(store.get(&id)?, Some(original));
        Ok(())
    }

    #[tokio::test]
    async fn replace_cannot_create_a_record_with_a_chosen_id() -> anyhow::Result<()> {
        let (gateway, identity, store) = setup();
        let owner = identity.sign_in_anonymously()?.user_id;
        let chosen = Task {
            id: TaskId::from("client-chosen"),
            user_id: owner,
            ..milk()
        };

        assert!(matches!(gateway.replace_task(chosen).await, Err(GatewayError::NotFound)));
        assert!(!store.exists(&TaskId::from("client-chosen"))?);
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn toggle_twice_restores_flag() -> anyhow::Result<()> {
        let (gateway, identity, _store) = setup();
        identity.sign_in_anonymously()?;
        let id = gateway.create_task(milk()).await?;

        assert!(gateway.toggle_completion(&id).await?);
        assert!(!gateway.toggle_completion(&id).await?);
        assert!(!gateway.get_task(&id).await?.is_completed);
        Ok(())
    }

    #[tokio::test]
    async fn toggle_on_deleted_task_is_not_found() -> anyhow::Result<()> {
        let (gateway, identity, _store) = setup();
        identity.sign_in_anonymously()?;
        let id = gateway.create_task(milk()).await?;
        gateway.delete_task(&id).await?;

        assert!(matches!(gateway.toggle_completion(&id).await, Err(GatewayError::NotFound)));
        assert!(matches!(gateway.delete_task(&id).await, Err(GatewayError::Unauthorized)));
        assert!(!gateway.task_exists(&id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn replace_overwrites_owned_task() -> anyhow::Result<()> {
        let (gateway, identity, _store) = setup();
        identity.sign_in_anonymously()?;
        let id = gateway.create_task(milk()).await?;

        let mut task = gateway.get_task(&id).await?;
        task.title = "Buy oat milk".into();
        task.is_completed = true;
        gateway.replace_task(task).await?;

        let stored = gateway.get_task(&id).await?;
        assert_eq!(stored.title, "Buy oat milk");
        assert!(stored.is_completed);
        Ok(())
    }

    #[tokio::test]
    async fn store_failures_surface_as_transport() -> anyhow::Result<()> {
        let (gateway, identity, store) = setup();
        identity.sign_in_anonymously()?;
        store.fail_with("quota exceeded");

        let Err(err) = gateway.create_task(milk()).await else {
            panic!("outage must fail the write");
        };
        assert!(matches!(err, GatewayError::Transport(_)));
        assert!(err.to_string().contains("quota exceeded"));
        Ok(())
    }

    #[tokio::test]
    async fn signed_out_feed_emits_empty_list_then_ends() {
        let (gateway, _identity, _store) = setup();
        let mut feed = gateway.subscribe_tasks().await;
        assert!(feed.owner().is_none());
        assert!(matches!(feed.next().await, Some(Ok(tasks)) if tasks.is_empty()));
        assert!(feed.next().await.is_none());
    }

    #[tokio::test]
    async fn feed_ends_after_transport_error() -> anyhow::Result<()> {
        let (gateway, identity, store) = setup();
        identity.sign_in_anonymously()?;
        let mut feed = gateway.subscribe_tasks().await;
        assert!(matches!(feed.next().await, Some(Ok(_))));

        store.interrupt_listeners("connection reset");
        assert!(matches!(feed.next().await, Some(Err(GatewayError::Transport(_)))));
        assert!(feed.next().await.is_none());
        Ok(())
    }
}
