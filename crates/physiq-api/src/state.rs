//! Shared application state.

use std::sync::Arc;

use physiq_store::TaskStore;

use crate::service::TaskService;

/// Shared application state.
pub struct AppState {
    /// Submission and query operations over the task store.
    pub tasks: TaskService,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(store: Arc<dyn TaskStore>) -> Arc<Self> {
        Arc::new(Self {
            tasks: TaskService::new(store),
        })
    }
}
