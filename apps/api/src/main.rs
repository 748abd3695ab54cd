mod config;
mod errors;
mod interview;
mod llm_client;
mod models;
mod routes;
mod state;
mod store;
mod voice;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::interview::generator::DeepseekQuestionGenerator;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::RedisSessionStore;
use crate::voice::VoiceClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (errors on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Module targets use underscores, the package name uses a dash.
            let target = env!("CARGO_PKG_NAME").replace('-', "_");
            EnvFilter::new(format!("{target}={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Interview API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the Redis-backed session store (connection dials lazily)
    let redis_client = redis::Client::open(config.redis_url.clone())?;
    let store = Arc::new(RedisSessionStore::new(redis_client));
    info!("Session store initialized");

    // Initialize the question generator
    let llm = LlmClient::new(
        config.deepseek_api_key.clone(),
        config.deepseek_api_url.clone(),
        config.deepseek_model.clone(),
    );
    info!("LLM client initialized (model: {})", llm.model());
    let generator = Arc::new(DeepseekQuestionGenerator::new(llm));

    // Initialize the optional voice bridge
    let voice = VoiceClient::new(config.lemonfox_api_key.clone());
    if voice.is_configured() {
        info!("Voice client initialized");
    } else {
        info!("Voice client not configured, voice endpoints will answer 501");
    }

    // Build app state
    let state = AppState {
        store,
        generator,
        voice,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
