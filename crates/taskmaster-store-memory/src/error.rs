//! Error types for the in-memory providers.

use taskmaster_core::TaskId;
use thiserror::Error;

/// Errors that can occur during document store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend is simulating an outage.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A live listener was torn down by the backend.
    #[error("Listener interrupted: {0}")]
    Interrupted(String),

    /// A write targeted a task without an identifier.
    #[error("Task has no identifier")]
    MissingId,

    /// Stored document could not be decoded into a task.
    #[error("Failed to decode document {id}: {source}")]
    Decode {
        /// Document key.
        id: TaskId,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Task could not be encoded into a document.
    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors returned by the identity provider.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The backend is simulating an outage.
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    /// Email address is malformed.
    #[error("The email address is badly formatted.")]
    InvalidEmail,

    /// Sign-up for an email that already has an account.
    #[error("The email address is already in use by another account.")]
    EmailInUse,

    /// Unknown email or wrong password.
    #[error("The email or password is incorrect.")]
    InvalidCredentials,

    /// Password shorter than the configured minimum.
    #[error("The password must be at least {min} characters long.")]
    WeakPassword {
        /// Minimum accepted length.
        min: usize,
    },

    /// The blocking task running a password check did not complete.
    #[error("Identity task failed: {0}")]
    Join(String),

    /// Password hashing failed.
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}
