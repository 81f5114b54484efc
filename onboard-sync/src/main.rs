//! onboard-sync - merchant onboarding submission service
//!
//! Accepts application submissions, stores them in the record store and fans
//! each committed change out to the CRM mirror, the automation webhook and
//! transactional email.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use onboard_common::events::EventBus;
use onboard_sync::config::{CliOverrides, ServiceConfig};
use onboard_sync::{AppState, Collaborators};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "onboard-sync")]
#[command(about = "Merchant onboarding submission synchronization service")]
#[command(version)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config and ONBOARD_BIND)
    #[arg(long)]
    bind: Option<String>,

    /// SQLite database path (overrides config and ONBOARD_DATABASE_PATH)
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    info!("Starting onboard-sync");
    info!(
        "Version: {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Step 1: configuration (CLI → ENV → TOML → defaults), fail fast
    let overrides = CliOverrides {
        bind: args.bind,
        database: args.database,
    };
    let config = ServiceConfig::load(args.config.as_deref(), &overrides)
        .context("Failed to load configuration")?;

    // Step 2: record store
    let db_path = config.database.resolved_path();
    info!("Database: {}", db_path.display());
    let db_pool = onboard_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    // Step 3: external clients
    let collaborators =
        Collaborators::from_config(&config).context("Failed to build external clients")?;
    info!(
        crm = collaborators.crm.is_some(),
        email = collaborators.email.is_some(),
        webhook = collaborators.webhook.is_some(),
        "External clients ready"
    );

    let event_bus = EventBus::new(256);
    let bind = config.server.bind.clone();
    let (state, _webhook_worker) = AppState::new(config, db_pool, event_bus, collaborators);

    let app = onboard_sync::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("onboard-sync stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
