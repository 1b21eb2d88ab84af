//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::store::Store;
use crate::sync::SyncService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    sync: SyncService,
}

impl AppState {
    /// Create a new application state around an opened store
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        Self::with_service(config, SyncService::new(store))
    }

    pub fn with_service(config: Config, sync: SyncService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, sync }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the sync engine
    pub fn sync(&self) -> &SyncService {
        &self.inner.sync
    }
}
