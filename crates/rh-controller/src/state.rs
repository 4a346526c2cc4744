//! Controller state shared by every connection

use std::sync::Arc;

use rh_core::config::ControllerConfig;

use crate::fleet::WorkerRegistry;
use crate::store::{ControllerStore, MemoryStore};

/// State for the controller daemon
///
/// Constructed once at startup and handed to the method table and the sync
/// watcher; it lives as long as the serving process.
pub struct ControllerState {
    /// Configuration
    pub config: ControllerConfig,
    /// Worker resync bookkeeping
    pub registry: Arc<WorkerRegistry>,
    /// Task queue and result persistence
    pub store: Arc<dyn ControllerStore>,
}

impl ControllerState {
    /// Create state backed by an in-memory store
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Create state with a custom store
    pub fn with_store(config: ControllerConfig, store: Arc<dyn ControllerStore>) -> Self {
        Self {
            config,
            registry: Arc::new(WorkerRegistry::new()),
            store,
        }
    }

    /// Get the fleet registry
    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }
}
