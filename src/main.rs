use std::sync::Arc;
use tracing::info;

mod api;
mod bus;
mod chat;
mod completion;
mod config;
mod controller;
mod document;
mod history;
mod session;
mod state;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // It's not fatal if .env doesn't exist, but good to know
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Buddi starting...");

    let config = config::Config::from_env()?;

    info!("Initializing store at {}", config.db_path.display());
    let store = store::Store::new(&config.db_path).await?;
    store.init().await?;

    let bus = Arc::new(bus::EventBus::new());
    let completion = Arc::new(completion::OpenRouterClient::new(
        config.api_url.clone(),
        config.api_key.clone(),
        config.model.clone(),
    ));
    info!("Using model {} at {}", config.model, config.api_url);

    let controller = Arc::new(
        controller::Controller::new(
            completion,
            Arc::new(document::PdfExtractor),
            history::HistoryStore::new(Arc::new(store)),
            bus,
            config.max_upload_bytes,
        )
        .await,
    );

    let app = api::ApiServer::new(controller, config.max_upload_bytes).router();

    info!("Starting HTTP server on port {}", config.port);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        })
        .await?;

    Ok(())
}
