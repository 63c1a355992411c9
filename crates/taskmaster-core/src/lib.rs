//! Domain types for taskmaster: tasks, sessions, filters and form validation.

/// List filters and summary counters.
pub mod filter;
/// Entry form validation.
pub mod form;
/// Identifier types.
pub mod id;
/// Authenticated session.
pub mod session;
/// Task entity and its enumerations.
pub mod task;

pub use filter::{TaskFilter, TaskStats, UnknownFilter};
pub use form::{CredentialsForm, CredentialsMode, FormError, TaskForm};
pub use id::{TaskId, UserId};
pub use session::Session;
pub use task::{Category, Priority, Task};
