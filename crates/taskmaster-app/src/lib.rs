//! Application layer for taskmaster.
//!
//! This crate provides the provider traits, the auth and task gateways, the
//! observable state holders and configuration shared by every front end.

pub mod auth_gateway;
pub mod auth_state;
pub mod config;
pub mod error;
pub mod provider;
pub mod task_gateway;
pub mod task_state;
pub mod task_sync;

// Re-exports for convenience
pub use auth_gateway::AuthGateway;
pub use auth_state::{AuthStateHolder, AuthViewState};
pub use config::{AppConfig, AuthConfig, StoreConfig, SyncConfig, user_config_path};
pub use error::GatewayError;
pub use provider::{CompletionWrite, DocumentStore, IdentityProvider, LiveQuery};
pub use task_gateway::{TaskGateway, TaskSubscription};
pub use task_state::{TaskStateHolder, TaskViewState};
pub use task_sync::{ResubscribePolicy, SyncStatus};
