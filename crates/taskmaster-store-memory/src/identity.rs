//! In-process identity provider with an observable current session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use taskmaster_core::{Session, UserId};
use tokio::sync::watch;
use tracing::info;

use crate::error::AuthError;

/// Shortest password accepted by default.
pub const DEFAULT_MIN_PASSWORD_LEN: usize = 6;

/// Email/password and anonymous accounts plus the signed-in session.
///
/// Cloning is cheap and shares accounts and session state.
#[derive(Clone)]
pub struct MemoryIdentityProvider {
    inner: Arc<IdentityInner>,
}

struct IdentityInner {
    accounts: Mutex<AccountsState>,
    session: watch::Sender<Option<Session>>,
    hash_cost: u32,
    min_password_len: usize,
}

#[derive(Default)]
struct AccountsState {
    by_email: HashMap<String, Account>,
    outage: Option<String>,
}

struct Account {
    user_id: UserId,
    email: String,
    password_hash: String,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    /// Provider with no accounts and no session.
    #[must_use]
    pub fn new() -> Self {
        Self::with_min_password_len(DEFAULT_MIN_PASSWORD_LEN)
    }

    /// Provider with the default bcrypt cost and a custom minimum password length.
    #[must_use]
    pub fn with_min_password_len(min_password_len: usize) -> Self {
        Self::with_settings(bcrypt::DEFAULT_COST, min_password_len)
    }

    /// Provider with an explicit bcrypt cost and minimum password length.
    #[must_use]
    pub fn with_settings(hash_cost: u32, min_password_len: usize) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            inner: Arc::new(IdentityInner {
                accounts: Mutex::new(AccountsState::default()),
                session,
                hash_cost,
                min_password_len,
            }),
        }
    }

    fn accounts(&self) -> MutexGuard<'_, AccountsState> {
        self.inner.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_online(&self) -> Result<(), AuthError> {
        self.accounts()
            .outage
            .as_ref()
            .map_or(Ok(()), |reason| Err(AuthError::Unavailable(reason.clone())))
    }

    fn publish(&self, session: Option<Session>) {
        match &session {
            Some(current) => info!(user = %current.user_id, anonymous = current.is_anonymous, "Session started"),
            None => info!("Session cleared"),
        }
        self.inner.session.send_replace(session);
    }

    /// Resume the current anonymous session or mint a new anonymous user.
    ///
    /// # Errors
    /// Returns an error during a simulated outage.
    pub fn sign_in_anonymously(&self) -> Result<Session, AuthError> {
        self.ensure_online()?;
        if let Some(current) = self.current_session().filter(|session| session.is_anonymous) {
            return Ok(current);
        }
        let session = Session::anonymous(UserId::generate());
        self.publish(Some(session.clone()));
        Ok(session)
    }

    /// Sign in to an existing email account.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidCredentials`] for an unknown email or wrong password.
    pub fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.ensure_online()?;
        let key = normalize_email(email)?;
        let session = {
            let accounts = self.accounts();
            let account = accounts
                .by_email
                .get(&key)
                .ok_or(AuthError::InvalidCredentials)?;
            if !bcrypt::verify(password, &account.password_hash)? {
                return Err(AuthError::InvalidCredentials);
            }
            Session::registered(account.user_id.clone(), account.email.clone())
        };
        self.publish(Some(session.clone()));
        Ok(session)
    }

    /// Create an email account and sign in to it.
    ///
    /// # Errors
    /// Returns an error for malformed emails, short passwords or an email already in use.
    pub fn sign_up_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.ensure_online()?;
        let key = normalize_email(email)?;
        if password.chars().count() < self.inner.min_password_len {
            return Err(AuthError::WeakPassword {
                min: self.inner.min_password_len,
            });
        }
        if self.accounts().by_email.contains_key(&key) {
            return Err(AuthError::EmailInUse);
        }

        let password_hash = bcrypt::hash(password, self.inner.hash_cost)?;
        let account = Account {
            user_id: UserId::generate(),
            email: email.trim().to_owned(),
            password_hash,
        };
        let session = Session::registered(account.user_id.clone(), account.email.clone());
        {
            let mut accounts = self.accounts();
            if accounts.by_email.contains_key(&key) {
                return Err(AuthError::EmailInUse);
            }
            accounts.by_email.insert(key, account);
        }
        info!(user = %session.user_id, "Account created");
        self.publish(Some(session.clone()));
        Ok(session)
    }

    /// Clear the session.
    pub fn sign_out(&self) {
        self.publish(None);
    }

    /// Drop the session from the provider side, as an expired token would.
    pub fn expire_session(&self) {
        if self.current_session().is_some() {
            info!("Session expired");
            self.publish(None);
        }
    }

    /// Authoritative current session.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.inner.session.borrow().clone()
    }

    /// Observe session changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.inner.session.subscribe()
    }

    /// Simulate a provider outage: every sign-in fails until [`Self::restore`].
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.accounts().outage = Some(reason.into());
    }

    /// End a simulated outage.
    pub fn restore(&self) {
        self.accounts().outage = None;
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(trimmed.to_ascii_lowercase())
        }
        _ => Err(AuthError::InvalidEmail),
    }
}
