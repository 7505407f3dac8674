use relay_core::{ActionStore, Dispatcher, InMemoryHub, Orchestrator, RelayConfig};
use std::sync::Arc;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> anyhow::Result<Self> {
        let store = if config.db_path == ":memory:" {
            ActionStore::open_in_memory()?
        } else {
            ActionStore::open(std::path::Path::new(&config.db_path))?
        };
        let dispatcher = Dispatcher::new(&config)?;
        let hub = Arc::new(InMemoryHub::new());
        let orchestrator = Orchestrator::new(store, hub, dispatcher, config);
        Ok(Self {
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// Cloneable handle to the action store, for `spawn_blocking` queries.
    pub fn store(&self) -> ActionStore {
        self.orchestrator.store().clone()
    }
}
