use std::sync::Arc;

use crate::config::Config;
use crate::interview::generator::QuestionGenerator;
use crate::store::SessionStore;
use crate::voice::VoiceClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Session persistence. Trait object so tests can swap in an in-memory store.
    pub store: Arc<dyn SessionStore>,
    /// Question generation. Trait object for the same reason.
    pub generator: Arc<dyn QuestionGenerator>,
    pub voice: VoiceClient,
    /// Runtime configuration, kept alongside the clients built from it.
    #[allow(dead_code)]
    pub config: Config,
}
