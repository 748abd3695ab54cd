pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::interview::handlers;
use crate::state::AppState;
use crate::voice::MAX_AUDIO_BYTES;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/interview/start", post(handlers::handle_start))
        .route("/api/interview/answer", post(handlers::handle_answer))
        .route(
            "/api/interview/session/:session_id",
            get(handlers::handle_session_status),
        )
        .route(
            "/api/interview/session/:session_id/transcript",
            get(handlers::handle_transcript),
        )
        .route("/api/interview/voice", post(handlers::handle_voice))
        .route(
            "/api/interview/voice/speech-to-text",
            post(handlers::handle_speech_to_text)
                // Leave headroom over the 10MB audio cap so the handler, not
                // the body limit, produces the oversize error.
                .layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES + 1024 * 1024)),
        )
        .with_state(state)
}
