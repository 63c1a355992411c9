//! In-process document collection with owner-filtered live queries.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use taskmaster_core::{Task, TaskId, UserId};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// Default collection name, matching the hosted backend.
pub const DEFAULT_COLLECTION: &str = "tasks";

/// One emission of a live query: the full, ordered result set or a terminal error.
pub type QueryEvent = Result<Vec<Task>, StoreError>;

/// Document collection keyed by server-assigned ids.
///
/// Cloning is cheap and shares the underlying collection.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<Inner>,
}

struct Inner {
    collection: String,
    state: Mutex<CollectionState>,
}

#[derive(Default)]
struct CollectionState {
    documents: HashMap<TaskId, StoredDocument>,
    listeners: HashMap<u64, ListenerEntry>,
    next_seq: u64,
    next_listener: u64,
    outage: Option<String>,
}

struct StoredDocument {
    body: Value,
    seq: u64,
}

struct ListenerEntry {
    owner: UserId,
    tx: mpsc::UnboundedSender<QueryEvent>,
}

/// Outcome of [`MemoryDocumentStore::set_completed_if`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalWrite {
    /// Precondition held; the updated task is returned.
    Applied(Task),
    /// No document with that id.
    Missing,
    /// Stored flag no longer equals the expected value.
    PreconditionFailed,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTION)
    }
}

impl MemoryDocumentStore {
    /// Create an empty collection.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                collection: collection.into(),
                state: Mutex::new(CollectionState::default()),
            }),
        }
    }

    /// Collection name used in logs.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    fn state(&self) -> MutexGuard<'_, CollectionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist `task` as a new document.
    ///
    /// The store assigns the identifier and both timestamps; any id already on
    /// the input is ignored.
    ///
    /// # Errors
    /// Returns an error during a simulated outage or when encoding fails.
    pub fn create(&self, task: &Task) -> Result<Task, StoreError> {
        let mut state = self.state();
        state.ensure_online()?;

        let now = OffsetDateTime::now_utc();
        let stored = Task {
            id: TaskId::generate(),
            created_at: Some(now),
            updated_at: Some(now),
            ..task.clone()
        };
        let body = serde_json::to_value(&stored)?;
        let seq = state.bump_seq();
        state
            .documents
            .insert(stored.id.clone(), StoredDocument { body, seq });
        state.publish(std::slice::from_ref(&stored.user_id));
        drop(state);

        info!(collection = %self.inner.collection, id = %stored.id, owner = %stored.user_id, "Created document");
        Ok(stored)
    }

    /// Read a single document.
    ///
    /// # Errors
    /// Returns an error during a simulated outage or when the document cannot be decoded.
    pub fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let state = self.state();
        state.ensure_online()?;
        state
            .documents
            .get(id)
            .map(|doc| decode(id, &doc.body))
            .transpose()
    }

    /// Check whether a document exists.
    ///
    /// # Errors
    /// Returns an error during a simulated outage.
    pub fn exists(&self, id: &TaskId) -> Result<bool, StoreError> {
        let state = self.state();
        state.ensure_online()?;
        Ok(state.documents.contains_key(id))
    }

    /// Overwrite the full document at `task.id`, creating it when absent.
    ///
    /// `userId` and `createdAt` are kept from the stored document; `updatedAt` is stamped now.
    ///
    /// # Errors
    /// Returns an error during a simulated outage, for tasks without an id, or when encoding fails.
    pub fn set(&self, task: &Task) -> Result<Task, StoreError> {
        if task.id.is_unassigned() {
            return Err(StoreError::MissingId);
        }
        let mut state = self.state();
        state.ensure_online()?;

        let now = OffsetDateTime::now_utc();
        let previous = state
            .documents
            .get(&task.id)
            .map(|doc| (doc.seq, decode(&task.id, &doc.body).ok()));
        let (seq, created_at, user_id) = match previous {
            Some((seq, Some(old))) => (seq, old.created_at, old.user_id),
            Some((seq, None)) => (seq, task.created_at.or(Some(now)), task.user_id.clone()),
            None => (state.bump_seq(), Some(now), task.user_id.clone()),
        };
        if user_id != task.user_id {
            warn!(id = %task.id, stored = %user_id, "Ignored owner change on replace");
        }

        let stored = Task {
            user_id,
            created_at,
            updated_at: Some(now),
            ..task.clone()
        };
        let body = serde_json::to_value(&stored)?;
        state
            .documents
            .insert(stored.id.clone(), StoredDocument { body, seq });
        state.publish(std::slice::from_ref(&stored.user_id));
        drop(state);

        info!(collection = %self.inner.collection, id = %stored.id, "Replaced document");
        Ok(stored)
    }

    /// Set the completion flag only if the stored flag still equals `expected`.
    ///
    /// # Errors
    /// Returns an error during a simulated outage or when the document cannot be decoded.
    pub fn set_completed_if(
        &self,
        id: &TaskId,
        expected: bool,
        completed: bool,
    ) -> Result<ConditionalWrite, StoreError> {
        let mut state = self.state();
        state.ensure_online()?;

        let Some(doc) = state.documents.get(id) else {
            return Ok(ConditionalWrite::Missing);
        };
        let current = decode(id, &doc.body)?;
        if current.is_completed != expected {
            debug!(%id, expected, "Completion precondition failed");
            return Ok(ConditionalWrite::PreconditionFailed);
        }

        let seq = doc.seq;
        let updated = Task {
            is_completed: completed,
            updated_at: Some(OffsetDateTime::now_utc()),
            ..current
        };
        let body = serde_json::to_value(&updated)?;
        state
            .documents
            .insert(id.clone(), StoredDocument { body, seq });
        state.publish(std::slice::from_ref(&updated.user_id));
        drop(state);

        info!(collection = %self.inner.collection, %id, completed, "Updated completion");
        Ok(ConditionalWrite::Applied(updated))
    }

    /// Delete a document. Returns whether it existed.
    ///
    /// # Errors
    /// Returns an error during a simulated outage.
    pub fn delete(&self, id: &TaskId) -> Result<bool, StoreError> {
        let mut state = self.state();
        state.ensure_online()?;

        let Some(doc) = state.documents.remove(id) else {
            return Ok(false);
        };
        if let Ok(task) = decode(id, &doc.body) {
            state.publish(std::slice::from_ref(&task.user_id));
        } else {
            let owners: Vec<UserId> = state
                .listeners
                .values()
                .map(|listener| listener.owner.clone())
                .collect();
            state.publish(&owners);
        }
        drop(state);

        info!(collection = %self.inner.collection, %id, "Deleted document");
        Ok(true)
    }

    /// One-shot query: `owner`'s tasks, newest first.
    ///
    /// # Errors
    /// Returns an error during a simulated outage.
    pub fn query(&self, owner: &UserId) -> Result<Vec<Task>, StoreError> {
        let state = self.state();
        state.ensure_online()?;
        Ok(state.query(owner))
    }

    /// Register a live query for `owner`.
    ///
    /// The current result set is delivered immediately, then again after every
    /// write that touches one of `owner`'s documents.
    ///
    /// # Errors
    /// Returns an error during a simulated outage.
    pub fn listen(&self, owner: &UserId) -> Result<Listener, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        state.ensure_online()?;

        let id = state.next_listener;
        state.next_listener += 1;
        // The receiver is still held here, so the initial send cannot fail.
        let _ = tx.send(Ok(state.query(owner)));
        state.listeners.insert(
            id,
            ListenerEntry {
                owner: owner.clone(),
                tx,
            },
        );
        drop(state);

        debug!(collection = %self.inner.collection, listener = id, %owner, "Registered listener");
        Ok(Listener {
            rx,
            registration: Registration {
                id,
                store: Arc::downgrade(&self.inner),
            },
        })
    }

    /// Number of registered live queries.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().documents.len()
    }

    /// Returns `true` when the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().documents.is_empty()
    }

    /// Simulate a backend outage: every call fails until [`Self::restore`].
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.state().outage = Some(reason.into());
    }

    /// End a simulated outage.
    pub fn restore(&self) {
        self.state().outage = None;
    }

    /// Terminate every live query with a transport error.
    pub fn interrupt_listeners(&self, reason: &str) {
        let mut state = self.state();
        let listeners = std::mem::take(&mut state.listeners);
        drop(state);

        warn!(collection = %self.inner.collection, count = listeners.len(), reason, "Interrupting listeners");
        for (_, listener) in listeners {
            let _ = listener
                .tx
                .send(Err(StoreError::Interrupted(reason.to_owned())));
        }
    }
}

impl CollectionState {
    fn ensure_online(&self) -> Result<(), StoreError> {
        self.outage
            .as_ref()
            .map_or(Ok(()), |reason| Err(StoreError::Unavailable(reason.clone())))
    }

    const fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn query(&self, owner: &UserId) -> Vec<Task> {
        let mut rows: Vec<(u64, Task)> = self
            .documents
            .iter()
            .filter_map(|(id, doc)| match decode(id, &doc.body) {
                Ok(task) => Some((doc.seq, task)),
                Err(err) => {
                    debug!(%id, error = %err, "Skipping undecodable document");
                    None
                }
            })
            .filter(|(_, task)| task.is_owned_by(owner))
            .collect();
        rows.sort_by_key(|(seq, task)| Reverse((task.created_at, *seq)));
        rows.into_iter().map(|(_, task)| task).collect()
    }

    fn publish(&mut self, owners: &[UserId]) {
        let mut closed = Vec::new();
        {
            let mut results: HashMap<&UserId, Vec<Task>> = HashMap::new();
            for (id, listener) in &self.listeners {
                if !owners.contains(&listener.owner) {
                    continue;
                }
                let tasks = results
                    .entry(&listener.owner)
                    .or_insert_with(|| self.query(&listener.owner))
                    .clone();
                if listener.tx.send(Ok(tasks)).is_err() {
                    closed.push(*id);
                }
            }
        }
        for id in closed {
            self.listeners.remove(&id);
        }
    }
}

fn decode(id: &TaskId, body: &Value) -> Result<Task, StoreError> {
    let mut task: Task = serde_json::from_value(body.clone()).map_err(|source| StoreError::Decode {
        id: id.clone(),
        source,
    })?;
    task.id = id.clone();
    Ok(task)
}

/// Receiving end of a live query.
///
/// Dropping the listener (or its [`Registration`]) unregisters the query.
pub struct Listener {
    rx: mpsc::UnboundedReceiver<QueryEvent>,
    registration: Registration,
}

impl Listener {
    /// Wait for the next emission; `None` once the query has been torn down.
    pub async fn next(&mut self) -> Option<QueryEvent> {
        self.rx.recv().await
    }

    /// Split into the raw channel and the registration guard.
    #[must_use]
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<QueryEvent>, Registration) {
        (self.rx, self.registration)
    }
}

/// Keeps a live query registered until dropped.
pub struct Registration {
    id: u64,
    store: Weak<Inner>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.listeners.remove(&self.id).is_some() {
                debug!(listener = self.id, "Unregistered listener");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskmaster_core::{Category, Priority};

    fn owned(title: &str, owner: &str) -> Task {
        Task {
            user_id: UserId::from(owner),
            ..Task::new(title)
        }
    }

    #[test]
    fn create_assigns_id_and_server_timestamps() -> Result<(), StoreError> {
        let store = MemoryDocumentStore::default();
        let mut input = owned("Buy milk", "alice");
        input.id = TaskId::from("client-chosen");

        let stored = store.create(&input)?;
        assert_ne!(stored.id, TaskId::from("client-chosen"));
        assert!(stored.created_at.is_some());
        assert_eq!(stored.created_at, stored.updated_at);

        let loaded = store.get(&stored.id)?.ok_or(StoreError::MissingId)?;
        assert_eq!(loaded, stored);
        Ok(())
    }

    #[test]
    fn query_filters_by_owner_and_orders_newest_first() -> Result<(), StoreError> {
        let store = MemoryDocumentStore::default();
        let first = store.create(&owned("first", "alice"))?;
        store.create(&owned("other", "bob"))?;
        let second = store.create(&owned("second", "alice"))?;

        let ids: Vec<TaskId> = store
            .query(&UserId::from("alice"))?
            .into_iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
        Ok(())
    }

    #[test]
    fn set_keeps_created_at_and_restamps_updated_at() -> Result<(), StoreError> {
        let store = MemoryDocumentStore::default();
        let stored = store.create(&owned("draft", "alice"))?;

        let edited = Task {
            title: "final".into(),
            created_at: None,
            priority: Priority::High,
            category: Category::Work,
            ..stored.clone()
        };
        let written = store.set(&edited)?;
        assert_eq!(written.created_at, stored.created_at);
        assert!(written.updated_at >= stored.updated_at);
        assert_eq!(store.get(&stored.id)?.map(|task| task.title), Some("final".into()));
        Ok(())
    }

    #[test]
    fn set_requires_an_identifier() {
        let store = MemoryDocumentStore::default();
        assert!(matches!(
            store.set(&owned("no id", "alice")),
            Err(StoreError::MissingId)
        ));
    }

    #[test]
    fn conditional_completion_checks_expected_value() -> Result<(), StoreError> {
        let store = MemoryDocumentStore::default();
        let stored = store.create(&owned("toggle", "alice"))?;

        assert_eq!(
            store.set_completed_if(&stored.id, true, false)?,
            ConditionalWrite::PreconditionFailed
        );
        let ConditionalWrite::Applied(updated) = store.set_completed_if(&stored.id, false, true)? else {
            panic!("expected write to apply");
        };
        assert!(updated.is_completed);
        assert_eq!(
            store.set_completed_if(&TaskId::from("gone"), false, true)?,
            ConditionalWrite::Missing
        );
        Ok(())
    }

    #[test]
    fn undecodable_documents_are_skipped_in_queries() -> Result<(), StoreError> {
        let store = MemoryDocumentStore::default();
        store.create(&owned("good", "alice"))?;
        {
            let mut state = store.state();
            let seq = state.bump_seq();
            state.documents.insert(
                TaskId::from("broken"),
                StoredDocument {
                    body: json!({ "title": "broken", "userId": "alice", "priority": "NOPE" }),
                    seq,
                },
            );
        }

        let titles: Vec<String> = store
            .query(&UserId::from("alice"))?
            .into_iter()
            .map(|task| task.title)
            .collect();
        assert_eq!(titles, vec!["good"]);
        assert!(store.get(&TaskId::from("broken")).is_err());
        Ok(())
    }

    #[test]
    fn outage_fails_every_call_until_restored() -> Result<(), StoreError> {
        let store = MemoryDocumentStore::default();
        store.fail_with("quota exceeded");
        assert!(matches!(
            store.create(&owned("x", "alice")),
            Err(StoreError::Unavailable(reason)) if reason == "quota exceeded"
        ));
        assert!(store.listen(&UserId::from("alice")).is_err());
        store.restore();
        store.create(&owned("x", "alice"))?;
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn listeners_receive_initial_and_follow_up_results() -> Result<(), StoreError> {
        let store = MemoryDocumentStore::default();
        let alice = UserId::from("alice");
        let mut listener = store.listen(&alice)?;

        assert_eq!(listener.next().await.transpose()?, Some(Vec::new()));

        let stored = store.create(&owned("Buy milk", "alice"))?;
        let emitted = listener.next().await.transpose()?.unwrap_or_default();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].id, stored.id);

        store.delete(&stored.id)?;
        assert_eq!(listener.next().await.transpose()?, Some(Vec::new()));
        Ok(())
    }

    #[tokio::test]
    async fn dropping_listener_unregisters_it() -> Result<(), StoreError> {
        let store = MemoryDocumentStore::default();
        let listener = store.listen(&UserId::from("alice"))?;
        assert_eq!(store.listener_count(), 1);
        drop(listener);
        assert_eq!(store.listener_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn interrupt_terminates_listeners_with_error() -> Result<(), StoreError> {
        let store = MemoryDocumentStore::default();
        let mut listener = store.listen(&UserId::from("alice"))?;
        let _initial = listener.next().await;

        store.interrupt_listeners("connection reset");
        assert!(matches!(listener.next().await, Some(Err(StoreError::Interrupted(_)))));
        assert!(listener.next().await.is_none());
        assert_eq!(store.listener_count(), 0);
        Ok(())
    }
}
