//! Amnesia Spread Server
//!
//! HTTP service for two-page spread detection, oracle labeling and split
//! model training.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use amnesia_spread::config::Config;
use amnesia_spread::{db, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "amnesia_spread=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    tracing::info!("Starting Amnesia Spread v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Oracle: {:?} model {} at {}",
        config.oracle.provider,
        config.oracle.model,
        config.oracle.url
    );

    // Initialize database
    let db_pool = db::create_pool(&config.database.url)
        .await
        .with_context(|| format!("Failed to initialize database at {}", config.database.url))?;
    tracing::info!("Database initialized at {}", config.database.url);

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid SERVER_HOST {}", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);

    // Create application state
    let app_state = AppState::new(config, db_pool);

    match app_state.trainer().current_model(app_state.namespace()).await {
        Ok(Some(model)) => tracing::info!(
            "Loaded split model '{}' ({} training examples, trained {})",
            app_state.namespace(),
            model.training_size,
            model.trained_at
        ),
        Ok(None) => tracing::info!(
            "No split model for '{}' yet; predictions unavailable until trained",
            app_state.namespace()
        ),
        Err(e) => tracing::warn!("Failed to load split model: {}", e),
    }

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    // Start server with graceful shutdown
    tracing::info!("Amnesia Spread listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
