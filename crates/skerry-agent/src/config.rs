//! Configuration for the in-sandbox agent.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Default port the agent listens on.
pub const DEFAULT_PORT: u16 = 8080;

/// Default working directory for commands and file transfers.
pub const DEFAULT_WORKDIR: &str = "/work";

/// Configuration for the skerry agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Directory commands run in and uploads land in.
    pub workdir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), DEFAULT_PORT),
            workdir: PathBuf::from(DEFAULT_WORKDIR),
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SKERRY_AGENT_HOST` | `0.0.0.0` |
    /// | `SKERRY_AGENT_PORT` | `8080` |
    /// | `SKERRY_AGENT_WORKDIR` | `/work` |
    pub fn from_env() -> Self {
        let default = Self::default();

        let host: IpAddr = std::env::var("SKERRY_AGENT_HOST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let port: u16 = std::env::var("SKERRY_AGENT_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            listen_addr: SocketAddr::new(host, port),
            workdir: std::env::var("SKERRY_AGENT_WORKDIR")
                .map(PathBuf::from)
                .unwrap_or(default.workdir),
        }
    }
}
