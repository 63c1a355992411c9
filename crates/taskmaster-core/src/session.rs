use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable user identifier; owner key for tasks.
    pub user_id: UserId,
    /// Account email, absent for anonymous sessions.
    pub email: Option<String>,
    /// Whether the session was created without credentials.
    pub is_anonymous: bool,
}

impl Session {
    /// Session for a registered email account.
    pub fn registered(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: Some(email.into()),
            is_anonymous: false,
        }
    }

    /// Session without credentials.
    #[must_use]
    pub const fn anonymous(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
            is_anonymous: true,
        }
    }

    /// Short description for logs and the shell.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or("Anonymous Account")
    }
}
