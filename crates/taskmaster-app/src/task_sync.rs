//! Background worker keeping the task snapshot in step with the live feed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::provider::{DocumentStore, IdentityProvider};
use crate::task_gateway::TaskGateway;
use crate::task_state::TaskViewState;

/// Exponential backoff applied when the live feed fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResubscribePolicy {
    initial_backoff: Duration,
    max_backoff: Duration,
    max_attempts: u32,
}

impl Default for ResubscribePolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 8)
    }
}

impl ResubscribePolicy {
    /// Build a policy; `max_attempts == 0` disables resubscription.
    pub const fn new(initial_backoff: Duration, max_backoff: Duration, max_attempts: u32) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            max_attempts,
        }
    }

    /// Delay before resubscription attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Attempts allowed after consecutive failures.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Where the live feed currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Nobody is signed in; the snapshot is empty.
    #[default]
    SignedOut,
    /// The feed is open and emitting.
    Live,
    /// The feed failed and is waiting before reopening.
    Retrying {
        /// Consecutive failed attempt number.
        attempt: u32,
    },
    /// Attempts exhausted; the last snapshot is kept.
    Stopped,
}

/// Follow the session forever, reopening the feed for every new user.
pub(crate) async fn run<P, S>(
    gateway: TaskGateway<P, S>,
    policy: ResubscribePolicy,
    state: Arc<watch::Sender<TaskViewState>>,
) where
    P: IdentityProvider,
    S: DocumentStore,
{
    let mut sessions = gateway.auth().watch_session();
    loop {
        sessions.borrow_and_update();
        tokio::select! {
            () = follow_session(&gateway, &policy, &state) => {
                if sessions.changed().await.is_err() {
                    return;
                }
            }
            changed = sessions.changed() => {
                if changed.is_err() {
                    return;
                }
                debug!("Session changed; reopening task feed");
            }
        }
    }
}

/// Drive one session's feed until it ends for good.
async fn follow_session<P, S>(
    gateway: &TaskGateway<P, S>,
    policy: &ResubscribePolicy,
    state: &watch::Sender<TaskViewState>,
) where
    P: IdentityProvider,
    S: DocumentStore,
{
    let mut attempt = 0_u32;
    loop {
        let mut feed = gateway.subscribe_tasks().await;
        let signed_in = feed.owner().is_some();
        let mut failure = None;
        while let Some(event) = feed.next().await {
            match event {
                Ok(tasks) => {
                    debug!(count = tasks.len(), "Task snapshot received");
                    let recovering = attempt > 0;
                    attempt = 0;
                    state.send_modify(|view| {
                        view.tasks = tasks;
                        view.sync = if signed_in { SyncStatus::Live } else { SyncStatus::SignedOut };
                        if recovering {
                            view.error = None;
                        }
                    });
                }
                Err(err) => failure = Some(err),
            }
        }
        if !signed_in {
            return;
        }
        let Some(err) = failure else {
            info!("Task feed closed by the store");
            state.send_modify(|view| view.sync = SyncStatus::Stopped);
            return;
        };

        attempt += 1;
        if attempt > policy.max_attempts() {
            warn!(error = %err, "Task feed failed; giving up");
            state.send_modify(|view| {
                view.error = Some(err.to_string());
                view.sync = SyncStatus::Stopped;
            });
            return;
        }
        let delay = policy.delay(attempt);
        warn!(attempt, ?delay, error = %err, "Task feed failed; resubscribing");
        state.send_modify(|view| {
            view.error = Some(err.to_string());
            view.sync = SyncStatus::Retrying { attempt };
        });
        tokio::time::sleep(delay).await;
    }
}
