//! Observable session plus loading and error tracking for auth calls.

use std::future::Future;
use std::sync::Arc;

use taskmaster_core::{CredentialsForm, CredentialsMode, Session};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::auth_gateway::AuthGateway;
use crate::error::GatewayError;
use crate::provider::IdentityProvider;

/// Snapshot published by [`AuthStateHolder`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthViewState {
    /// Mirror of the provider's session.
    pub session: Option<Session>,
    /// Message of the last failed call, if any.
    pub error: Option<String>,
    in_flight: usize,
}

impl AuthViewState {
    /// Whether any auth call is still running.
    pub const fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    /// Whether a session is present.
    pub const fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }
}

/// Owns the auth view state and mirrors provider-side session changes into it.
pub struct AuthStateHolder<P> {
    gateway: AuthGateway<P>,
    state: Arc<watch::Sender<AuthViewState>>,
    mirror: JoinHandle<()>,
}

impl<P: IdentityProvider> AuthStateHolder<P> {
    /// Start mirroring the provider session. Must be called inside a tokio runtime.
    pub fn new(gateway: AuthGateway<P>) -> Self {
        let mut sessions = gateway.watch_session();
        let initial = sessions.borrow_and_update().clone();
        let (state, _) = watch::channel(AuthViewState {
            session: initial,
            ..AuthViewState::default()
        });
        let state = Arc::new(state);

        let mirror_state = Arc::clone(&state);
        let mirror = tokio::spawn(async move {
            while sessions.changed().await.is_ok() {
                let session = sessions.borrow_and_update().clone();
                debug!(signed_in = session.is_some(), "Session mirrored");
                mirror_state.send_modify(|view| view.session = session);
            }
        });

        Self { gateway, state, mirror }
    }

    /// Observe state changes.
    pub fn watch(&self) -> watch::Receiver<AuthViewState> {
        self.state.subscribe()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> AuthViewState {
        self.state.borrow().clone()
    }

    /// Whether a session is present.
    pub fn is_signed_in(&self) -> bool {
        self.state.borrow().is_signed_in()
    }

    /// Sign in without credentials.
    pub fn sign_in_anonymously(&self) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        self.launch(async move { gateway.sign_in_anonymously().await })
    }

    /// Sign in with email and password.
    pub fn sign_in_with_password(&self, email: impl Into<String>, password: impl Into<String>) -> JoinHandle<()> {
        self.submit(CredentialsForm::sign_in(email, password))
    }

    /// Create an account with email and password.
    pub fn sign_up_with_password(&self, email: impl Into<String>, password: impl Into<String>) -> JoinHandle<()> {
        let password = password.into();
        self.submit(CredentialsForm::sign_up(email, password.clone(), password))
    }

    /// Validate the form, then run the matching sign-in or sign-up call.
    ///
    /// A rejected form publishes its error without reaching the provider.
    pub fn submit(&self, form: CredentialsForm) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        self.launch(async move {
            let (email, password) = form.validate()?;
            match form.mode {
                CredentialsMode::SignIn => gateway.sign_in_with_password(&email, &password).await,
                CredentialsMode::SignUp => gateway.sign_up_with_password(&email, &password).await,
            }
        })
    }

    /// Sign out immediately.
    pub fn sign_out(&self) {
        self.gateway.sign_out();
        self.state.send_modify(|view| view.session = None);
    }

    /// Dismiss the published error.
    pub fn clear_error(&self) {
        self.state.send_modify(|view| view.error = None);
    }

    fn launch<F>(&self, call: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<Session, GatewayError>> + Send + 'static,
    {
        self.state.send_modify(|view| {
            view.in_flight += 1;
            view.error = None;
        });
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let result = call.await;
            state.send_modify(|view| {
                view.in_flight = view.in_flight.saturating_sub(1);
                match result {
                    Ok(session) => {
                        view.session = Some(session);
                        view.error = None;
                    }
                    Err(err) => view.error = Some(err.to_string()),
                }
            });
        })
    }
}

impl<P> Drop for AuthStateHolder<P> {
    fn drop(&mut self) {
        self.mirror.abort();
    }
}
