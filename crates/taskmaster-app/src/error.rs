//! Errors surfaced by the gateways.

use taskmaster_core::FormError;

/// Failure of a gateway call.
///
/// State holders only ever expose the [`Display`](std::fmt::Display) text.
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    /// No active session for an operation that requires one.
    #[error("User not authenticated")]
    NotAuthenticated,
    /// Session present but does not own the target record.
    #[error("Unauthorized")]
    Unauthorized,
    /// Target record is absent.
    #[error("Task not found")]
    NotFound,
    /// Conditional write lost against a concurrent change.
    #[error("Task was changed elsewhere; try again")]
    Conflict,
    /// Form input rejected before any provider call.
    #[error("{0}")]
    Validation(#[from] FormError),
    /// The underlying provider call failed.
    #[error("{0}")]
    Transport(#[from] anyhow::Error),
}

impl GatewayError {
    /// Wrap a provider error.
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Transport(err.into())
    }
}
