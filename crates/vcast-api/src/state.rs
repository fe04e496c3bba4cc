//! Application state.

use std::sync::Arc;

use vcast_storage::ArtifactStorage;
use vcast_store::JobStore;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: JobStore,
    /// Destination for inline audio uploads
    pub storage: Arc<dyn ArtifactStorage>,
}

impl AppState {
    pub fn new(config: ApiConfig, store: JobStore, storage: Arc<dyn ArtifactStorage>) -> Self {
        Self {
            config,
            store,
            storage,
        }
    }
}
