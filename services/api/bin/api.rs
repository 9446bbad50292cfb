//! Main Entrypoint for the Concierge API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading prompt overrides and the initial mock state.
//! 3. Building the generation backend client for the configured provider.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use concierge_api::{
    config::{Config, Provider},
    router::create_router,
    state::AppState,
};
use concierge_core::{
    MockState, MockStore,
    llm_client::{LLMClient, OpenAICompatibleClient},
    prompts::PromptSet,
};
use std::{collections::HashMap, fs, net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down.");
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompt templates from a directory, keyed by file stem.
fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

/// Reads the initial mock state, validated exactly like an operator edit.
fn load_mocks(mocks_path: &Path) -> anyhow::Result<MockState> {
    let raw = fs::read_to_string(mocks_path)
        .with_context(|| format!("Could not read mocks file {}", mocks_path.display()))?;
    MockState::from_json(&raw)
        .with_context(|| format!("Invalid mocks file {}", mocks_path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Prompts and Mocks ---
    let prompts = match &config.prompts_path {
        Some(path) => PromptSet::with_overrides(load_prompts(path)?),
        None => PromptSet::default(),
    };
    let initial_state = match &config.mocks_path {
        Some(path) => {
            let state = load_mocks(path)?;
            info!(path = %path.display(), "Loaded initial mock state.");
            state
        }
        None => MockState::seed(),
    };

    // --- 4. Initialize the Generation Backend ---
    let api_key = config
        .api_key()
        .context("No API key configured for the selected provider")?;
    match &config.provider {
        Provider::OpenAI => info!("Using OpenAI provider."),
        Provider::Gemini => info!("Using Gemini provider."),
    }
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(config.provider.api_base());
    let llm_client: Arc<dyn LLMClient> = Arc::new(OpenAICompatibleClient::new(
        openai_config,
        config.chat_model.clone(),
        config.chat_temperature,
    ));

    let app_state = Arc::new(AppState::new(
        llm_client,
        Arc::new(prompts),
        MockStore::new(initial_state),
    ));

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
