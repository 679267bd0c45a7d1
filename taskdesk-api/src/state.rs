//! Shared application state for Axum routers.

use std::sync::Arc;

use taskdesk_storage::{ActionStore, AgentDirectory};

use crate::actions::BatchExecutor;
use crate::config::ApiConfig;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Durable store every batch writes through.
    pub store: Arc<dyn ActionStore>,
    /// Credential lookup for the auth middleware.
    pub directory: Arc<dyn AgentDirectory>,
    pub executor: BatchExecutor,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ActionStore>,
        directory: Arc<dyn AgentDirectory>,
        config: ApiConfig,
    ) -> Self {
        Self {
            executor: BatchExecutor::new(store.clone()),
            store,
            directory,
            config: Arc::new(config),
        }
    }
}

crate::impl_from_ref!(Arc<dyn ActionStore>, store);
crate::impl_from_ref!(Arc<dyn AgentDirectory>, directory);
crate::impl_from_ref!(BatchExecutor, executor);
crate::impl_from_ref!(Arc<ApiConfig>, config);
