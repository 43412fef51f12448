// ============================
// tunepool-backend-bin/src/main.rs
// ============================
//! Tokio / Axum entry point for the room server.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::time::interval;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tunepool_backend::{
    config::Settings, provider::FixtureProvider, routes, storage::FlatFileStorage, telemetry::MetricsTelemetry,
    AppState,
};

#[derive(Parser, Debug)]
#[command(name = "tunepool-server", about = "Shared music room server")]
struct Cli {
    /// Path of the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_from(&cli.config)?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let storage = FlatFileStorage::new(&settings.storage.path)
        .with_context(|| format!("cannot open storage at {}", settings.storage.path.display()))?;
    let provider = FixtureProvider::load_dir(&settings.provider.library_dir, settings.provider.page_size).await?;

    let addr = settings.bind_addr()?;
    let reconcile_every = settings.processing.reconcile_interval();
    let state = Arc::new(AppState::new(
        settings,
        Arc::new(storage),
        Arc::new(provider),
        Arc::new(MetricsTelemetry),
    ));

    // Clean up rooms left in both stores, at startup (first tick) and periodically
    let rooms = state.rooms.clone();
    tokio::spawn(async move {
        let mut interval = interval(reconcile_every);
        loop {
            interval.tick().await;
            if let Err(e) = rooms.reconcile().await {
                error!(error = %e, "reconciliation failed");
            }
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
