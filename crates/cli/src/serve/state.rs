//! Application state shared across request handlers.

use std::sync::Arc;

use pacer_orchestrator::{BroadcastNotifier, Orchestrator};
use pacer_storage::InMemoryStorage;

pub(crate) struct AppState {
    pub(crate) orchestrator: Arc<Orchestrator<InMemoryStorage>>,
    /// Same notifier the orchestrator emits into; handlers subscribe to it.
    pub(crate) events: Arc<BroadcastNotifier>,
    /// Optional API key for authentication. None = no auth required.
    pub(crate) api_key: Option<String>,
}
