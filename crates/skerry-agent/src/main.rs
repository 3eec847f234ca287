//! skerry-agent: in-sandbox agent for Skerry.
//!
//! Serves the HTTP surface the sandbox client drives: command execution,
//! file upload, and file download, all confined to a working directory.

mod config;
mod exec;
mod fs;
mod server;

use config::AgentConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("skerry_agent=info".parse()?))
        .init();

    let config = AgentConfig::from_env();
    info!(
        addr = %config.listen_addr,
        workdir = %config.workdir.display(),
        "skerry-agent starting"
    );

    tokio::fs::create_dir_all(&config.workdir).await?;

    server::serve(config, shutdown_signal()).await?;
    info!("skerry-agent stopped");
    Ok(())
}

/// Resolves when the process receives Ctrl-C / SIGINT.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
}
