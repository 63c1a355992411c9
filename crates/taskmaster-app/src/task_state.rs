//! Observable task list plus the mutation calls the UI issues against it.

use std::future::Future;
use std::sync::Arc;

use taskmaster_core::{Category, Task, TaskFilter, TaskForm, TaskId, TaskStats};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::GatewayError;
use crate::provider::{DocumentStore, IdentityProvider};
use crate::task_gateway::TaskGateway;
use crate::task_sync::{self, ResubscribePolicy, SyncStatus};

/// Snapshot published by [`TaskStateHolder`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskViewState {
    /// Latest list emitted by the live feed, newest first.
    pub tasks: Vec<Task>,
    /// Message of the last failed call, if any.
    pub error: Option<String>,
    /// State of the live feed.
    pub sync: SyncStatus,
    in_flight: usize,
}

impl TaskViewState {
    /// Whether any mutating call is still running.
    pub const fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    /// Tasks in one category.
    pub fn tasks_by_category(&self, category: Category) -> Vec<Task> {
        self.filtered(TaskFilter::Category(category))
    }

    /// Tasks already done.
    pub fn completed_tasks(&self) -> Vec<Task> {
        self.filtered(TaskFilter::Completed)
    }

    /// Tasks still open.
    pub fn pending_tasks(&self) -> Vec<Task> {
        self.filtered(TaskFilter::Pending)
    }

    /// Tasks matching `filter`, keeping snapshot order.
    pub fn filtered(&self, filter: TaskFilter) -> Vec<Task> {
        filter.apply(&self.tasks)
    }

    /// Counters over the whole snapshot.
    pub fn stats(&self) -> TaskStats {
        TaskStats::from_tasks(&self.tasks)
    }
}

/// Owns the task snapshot for the current session.
///
/// The live feed is opened on construction and released by [`close`](Self::close) or drop.
/// Mutations never edit the snapshot; it only changes when the feed re-emits.
pub struct TaskStateHolder<P, S> {
    gateway: TaskGateway<P, S>,
    state: Arc<watch::Sender<TaskViewState>>,
    worker: Option<JoinHandle<()>>,
}

impl<P, S> TaskStateHolder<P, S>
where
    P: IdentityProvider,
    S: DocumentStore,
{
    /// Start following the session's tasks. Must be called inside a tokio runtime.
    pub fn new(gateway: TaskGateway<P, S>, policy: ResubscribePolicy) -> Self {
        let (state, _) = watch::channel(TaskViewState::default());
        let state = Arc::new(state);
        let worker = tokio::spawn(task_sync::run(gateway.clone(), policy, Arc::clone(&state)));
        Self {
            gateway,
            state,
            worker: Some(worker),
        }
    }

    /// Observe snapshot changes.
    pub fn watch(&self) -> watch::Receiver<TaskViewState> {
        self.state.subscribe()
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> TaskViewState {
        self.state.borrow().clone()
    }

    /// Borrow the gateway for direct reads.
    pub const fn gateway(&self) -> &TaskGateway<P, S> {
        &self.gateway
    }

    /// Create a task owned by the caller.
    pub fn add_task(&self, task: Task) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        self.launch("create", async move { gateway.create_task(task).await })
    }

    /// Validate an entry form and create the resulting task.
    pub fn add_from_form(&self, form: TaskForm) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        self.launch("create", async move {
            let task = form.into_task()?;
            gateway.create_task(task).await
        })
    }

    /// Apply an edit form on top of the stored task and replace it.
    pub fn edit_from_form(&self, id: TaskId, form: TaskForm) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        self.launch("edit", async move {
            let current = gateway.get_task(&id).await?;
            let task = form.apply_to(current)?;
            gateway.replace_task(task).await
        })
    }

    /// Overwrite a task.
    pub fn update_task(&self, task: Task) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        self.launch("replace", async move { gateway.replace_task(task).await })
    }

    /// Delete a task.
    pub fn delete_task(&self, id: TaskId) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        self.launch("delete", async move { gateway.delete_task(&id).await })
    }

    /// Flip a task's completion flag.
    pub fn toggle_task_completion(&self, id: TaskId) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        self.launch("toggle", async move { gateway.toggle_completion(&id).await })
    }

    /// Dismiss the published error.
    pub fn clear_error(&self) {
        self.state.send_modify(|view| view.error = None);
    }

    /// Stop the feed and wait until its listener is released.
    pub async fn close(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
            let _ = worker.await;
        }
    }

    fn launch<F, T>(&self, op: &'static str, call: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<T, GatewayError>> + Send + 'static,
        T: Send + 'static,
    {
        self.state.send_modify(|view| {
            view.in_flight += 1;
            view.error = None;
        });
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let error = call.await.err().map(|err| {
                warn!(op, error = %err, "Task call failed");
                err.to_string()
            });
            state.send_modify(|view| {
                view.in_flight = view.in_flight.saturating_sub(1);
                view.error = error;
            });
        })
    }
}

impl<P, S> Drop for TaskStateHolder<P, S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
