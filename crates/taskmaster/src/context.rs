use std::sync::Arc;

use taskmaster_app::{AppConfig, AuthGateway, AuthStateHolder, TaskGateway, TaskStateHolder};
use taskmaster_store_memory::{MemoryDocumentStore, MemoryIdentityProvider};

/// Both state holders for one client.
pub struct AppContext {
    pub auth: AuthStateHolder<MemoryIdentityProvider>,
    pub tasks: TaskStateHolder<MemoryIdentityProvider, MemoryDocumentStore>,
}

impl AppContext {
    /// Client over a fresh collection named by the configuration.
    pub fn new(config: &AppConfig) -> Self {
        Self::with_store(config, MemoryDocumentStore::new(config.store.collection.clone()))
    }

    /// Client with its own identity provider over a shared collection.
    pub fn with_store(config: &AppConfig, store: MemoryDocumentStore) -> Self {
        let identity = MemoryIdentityProvider::with_min_password_len(config.auth.min_password_len);
        Self::assemble(config, identity, store)
    }

    /// Wire the holders; must run inside a tokio runtime.
    pub fn assemble(config: &AppConfig, identity: MemoryIdentityProvider, store: MemoryDocumentStore) -> Self {
        let auth_gateway = AuthGateway::new(Arc::new(identity));
        let tasks = TaskStateHolder::new(
            TaskGateway::new(auth_gateway.clone(), Arc::new(store)),
            config.sync.policy(),
        );
        Self {
            auth: AuthStateHolder::new(auth_gateway),
            tasks,
        }
    }
}
