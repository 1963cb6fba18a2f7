// Registry Radar - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use clap::Parser;
use registry_radar::api::{build_router, AppState};
use registry_radar::{open_database, Config, RegistryService};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "radar-server", version, about = "Registry Radar HTTP API")]
struct Args {
    /// TOML config file
    #[arg(long, env = "RADAR_CONFIG")]
    config: PathBuf,

    /// Overrides bind_addr from the config file
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    info!("Registry Radar - Web Server v{}", registry_radar::VERSION);

    // Open database
    let conn = open_database(&config.database_path)?;
    info!("Database opened: {}", config.database_path.display());

    let service = RegistryService::from_config(&config, Arc::new(Mutex::new(conn)))?;
    for source in service.sources() {
        info!(
            source = %source.id,
            kind = ?source.kind,
            region = source.region.as_deref().unwrap_or("*"),
            "Source configured"
        );
    }

    // Create shared state
    let state = AppState {
        service: Arc::new(service),
    };
    let app = build_router(state);

    // Start server
    let addr = args.bind.unwrap_or_else(|| config.bind_addr.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Server running on http://{}", addr);
    info!("API: POST http://{}/api/companies/new", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
