use anyhow::{Context, Result};

use fmcg_dashboard::{app, config, logging, services};
use services::{offline, BackendClient, LocalStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        backend_url = %settings.backend_url,
        "Starting FMCG dashboard service"
    );

    // Local store for snapshots and the offline queue
    let store = LocalStore::connect(settings.redis_url.as_deref()).await?;
    tracing::info!(store = store.backend_name(), "Local store initialized");

    // Backend client
    let backend = BackendClient::new(
        &settings.backend_url,
        settings.backend_timeout_seconds,
        settings.backend_retry_max_elapsed_ms,
    )?;

    // Optionally check backend reachability (non-blocking)
    tokio::spawn({
        let backend = backend.clone();
        async move {
            match backend.health_check().await {
                Ok(()) => tracing::info!("Backend is reachable"),
                Err(e) => tracing::warn!(error = %e, "Backend health check failed - writes will be queued"),
            }
        }
    });

    // Create application state
    let state = app::AppState::new(settings.clone(), backend.clone(), store)?;

    // Replay queued writes in the background
    match settings.offline_replay_interval() {
        Some(every) => {
            offline::spawn_replay_loop(state.offline.clone(), backend, every);
            tracing::info!(interval_secs = every.as_secs(), "Offline replay loop started");
        }
        None => tracing::info!("Offline replay loop disabled"),
    }

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server_addr))?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
