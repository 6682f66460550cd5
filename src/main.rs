use anyhow::{Context, Result};
use cost_explorer::api::{cors_layer, create_router, AppState};
use cost_explorer::config::AppConfig;
use cost_explorer::session::{open_store, run_session_cleanup};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cost_explorer=info".into()),
        )
        .init();

    info!("Cost explorer API starting...");

    // Missing or malformed configuration is fatal
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    config.log_summary();

    let sessions = open_store(&config.session_store_url, config.settings.session.ttl())
        .context("Failed to open session store")?;

    tokio::spawn(run_session_cleanup(
        sessions.clone(),
        config.settings.http.session_cleanup_interval_seconds,
    ));

    let cors = cors_layer(&config.frontend_url)?;
    let state = AppState::from_config(&config, sessions)?;
    let app = create_router(state).layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
