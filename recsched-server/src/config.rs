//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use recsched_core::CoreConfig;

/// Command-line and environment configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "recsched-server", version, about = "Serves the recreation schedule data API")]
pub struct ServerConfig {
    /// Listen address
    #[arg(short, long, default_value = "127.0.0.1:8082", env = "RECSCHED_ADDR")]
    pub addr: SocketAddr,

    /// Cache database path (wiped and recreated if outdated)
    #[arg(
        short,
        long,
        default_value = "/tmp/recsched-data.db",
        env = "RECSCHED_CACHE"
    )]
    pub cache: PathBuf,

    /// Data git repo path (read-only mode if unset; initialized as a bare
    /// repo if missing)
    #[arg(short, long, env = "RECSCHED_REPO")]
    pub repo: Option<PathBuf>,

    /// Remote to fetch the data repo from
    #[arg(long, env = "RECSCHED_REPO_REMOTE")]
    pub repo_remote: Option<String>,

    /// Branch to fetch (force-updated in the local repo)
    #[arg(long, default_value = "v1", env = "RECSCHED_REPO_BRANCH")]
    pub repo_branch: String,

    /// Override the rev to scan (debugging only)
    #[arg(long, env = "RECSCHED_REPO_REV")]
    pub repo_rev: Option<String>,

    /// Repo poll interval in seconds (0 = import once at startup)
    #[arg(short = 'i', long, default_value_t = 900, env = "RECSCHED_REPO_INTERVAL")]
    pub repo_interval: u64,

    /// Published JSON schema URL, included in exports
    #[arg(long, env = "RECSCHED_SCHEMA_URL")]
    pub schema_url: Option<String>,

    /// Log filter (tracing env-filter syntax)
    #[arg(short = 'L', long, default_value = "info", env = "RECSCHED_LOG")]
    pub log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "RECSCHED_LOG_JSON")]
    pub log_json: bool,
}

impl ServerConfig {
    /// The core configuration derived from the flags.
    pub fn core(&self) -> CoreConfig {
        let mut config = CoreConfig::new();
        if let Some(url) = &self.schema_url {
            config = config.with_schema_url(url.clone());
        }
        config
    }
}
