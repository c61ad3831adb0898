use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use virelay_core::cache::{ENCRYPTED_FOLDER, TRANSCODED_FOLDER};
use virelay_server::routes::build_router;
use virelay_server::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "virelay-server", about = "Virelay media service")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long, env = "VIRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut settings = virelay_config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let base = settings.storage.base_path.clone();
    tokio::fs::create_dir_all(base.join(ENCRYPTED_FOLDER))
        .await
        .context("Failed to create encrypted artifact root")?;
    tokio::fs::create_dir_all(base.join(TRANSCODED_FOLDER))
        .await
        .context("Failed to create transcoded source root")?;

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid listen address")?;
    let state = AppState::from_settings(settings);
    let app = build_router(state);

    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind listen address")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to install shutdown handler: {err}");
    }
}
