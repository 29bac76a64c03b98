//! recsched-server CLI
//!
//! Run with: `cargo run -p recsched-server -- --help`

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use recsched_cache::Cache;
use recsched_server::fetcher::{self, FetcherConfig};
use recsched_server::{routes, AppState, ServerConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = ServerConfig::parse();
    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "failed to run server");
        std::process::exit(1);
    }
}

fn init_logging(config: &ServerConfig) {
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let core = config.core();
    let readonly = config.repo.is_none();
    if readonly {
        warn!("no repo path specified, running in read-only mode");
    }

    info!(path = %config.cache.display(), "opening cache");
    let cache = match Cache::open(&config.cache, false, core.timezone) {
        Ok(cache) => cache,
        Err(e @ recsched_cache::Error::UnsupportedSchema { .. }) if !readonly => {
            warn!(error = %e, "unsupported cache schema version, resetting");
            Cache::open(&config.cache, true, core.timezone)?
        }
        Err(e) => return Err(e.into()),
    };
    let cache = Arc::new(cache);

    if let Some(repo) = &config.repo {
        let fetcher_config = FetcherConfig {
            repo: repo.clone(),
            remote: config.repo_remote.clone(),
            branch: config.repo_branch.clone(),
            rev: config.repo_rev.clone(),
            interval: Duration::from_secs(config.repo_interval),
        };
        fetcher::prepare_repo(&fetcher_config).await?;
        info!(interval = config.repo_interval, "starting repo fetcher");
        tokio::spawn(fetcher::run(Arc::clone(&cache), fetcher_config));
    }

    let state = AppState::new(cache, core);
    let router = routes::router(state);

    info!(addr = %config.addr, "http: listening");
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
