use anyhow::{Context, Result};
use clap::Parser;
use hb_server::{AppState, ServerConfig, router};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "homeblocks", about = "homeblocks identity and profile server")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "HOMEBLOCKS_CONFIG")]
    config: Option<PathBuf>,
}

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let state = AppState::build(&config).await?;

    let pending_ttl = config.pending_state_ttl()?;
    spawn_sweeper(state.clone(), pending_ttl);

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("homeblocks listening on {}", config.bind_address);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Periodically drops expired sessions and, when a TTL is configured,
/// abandoned login attempts.
fn spawn_sweeper(state: AppState, pending_ttl: Option<chrono::TimeDelta>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let sessions = state.sessions.purge_expired().await;
            let pending = match pending_ttl {
                Some(ttl) => state.orchestrator.purge_pending(ttl).await,
                None => 0,
            };
            if sessions > 0 || pending > 0 {
                debug!(
                    "Swept {} expired sessions and {} stale login attempts",
                    sessions, pending
                );
            }
        }
    });
}
