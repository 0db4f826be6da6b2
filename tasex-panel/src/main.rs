//! tasex-panel - blind triangle taste-test panel service
//!
//! Serves the anonymous tasting wizard and the owner API over one SQLite
//! database.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tasex_common::config::{load_toml_config, resolve_root_folder};
use tasex_common::db::{init_database, load_or_init_owner_secret};
use tasex_panel::wizard::WizardSessions;
use tasex_panel::{build_router, AppState};
use tracing::{error, info};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "tasex-panel", version, about = "Blind triangle taste-test panels")]
struct Args {
    /// Root folder holding the database and tasex.toml
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Explicit configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port, overrides the configuration file
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let root_folder = resolve_root_folder(args.root_folder.as_deref());
    let mut config = load_toml_config(args.config.as_deref(), &root_folder)?;
    if let Some(port) = args.port {
        config.port = port;
    }

    // RUST_LOG wins over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Starting tasex-panel v{} (root folder {})",
        env!("CARGO_PKG_VERSION"),
        root_folder.display()
    );

    let db_path = config.database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = match init_database(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let owner_secret = load_or_init_owner_secret(&pool).await?;
    if owner_secret == 0 {
        info!("Owner authentication disabled (owner_shared_secret = 0)");
    } else {
        info!("Loaded owner shared secret");
    }

    let state = AppState::new(
        pool,
        WizardSessions::in_memory(config.session_idle_timeout()),
        owner_secret,
        config.public_base_url.clone(),
    );
    let app = build_router(state);

    let address = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("tasex-panel listening on http://{}", address);
    info!("Health check: http://{}/health", address);

    axum::serve(listener, app).await?;

    Ok(())
}
