//! Shared Application State
//!
//! The single conversation session sits behind an async mutex so only one
//! turn runs at a time. The mock store is held separately: it is a cloneable
//! handle, and operator edits through it never wait for a turn to finish.

use concierge_core::{
    MockStore, SessionController, llm_client::LLMClient, preview::Previewer, prompts::PromptSet,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<SessionController>>,
    pub store: MockStore,
    pub previewer: Previewer,
}

impl AppState {
    pub fn new(llm_client: Arc<dyn LLMClient>, prompts: Arc<PromptSet>, store: MockStore) -> Self {
        let session = SessionController::new(llm_client.clone(), prompts.clone(), store.clone());
        Self {
            session: Arc::new(Mutex::new(session)),
            store,
            previewer: Previewer::new(llm_client, prompts),
        }
    }
}
