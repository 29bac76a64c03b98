//! Background repo fetcher.
//!
//! One task per process: fetch the data repository, run an import, sleep
//! until the next tick. Missed ticks are absorbed, so a slow import never
//! queues further imports behind it. Failures are logged and the loop keeps
//! going; the cache stays at whatever progress the last import reached.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use recsched_cache::{git, Cache};
use tracing::{error, info, warn};

/// Fetcher settings, straight from the server flags.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub repo: PathBuf,
    pub remote: Option<String>,
    pub branch: String,
    /// Debug override for the rev to scan; defaults to the branch.
    pub rev: Option<String>,
    /// Zero means import once and stop.
    pub interval: Duration,
}

/// Ensure the local repository exists, initializing a bare one if needed.
pub async fn prepare_repo(config: &FetcherConfig) -> Result<(), recsched_cache::Error> {
    if git::git_dir(&config.repo).await.is_ok() {
        return Ok(());
    }
    if config.repo.exists() {
        return Err(recsched_cache::Error::Git(git::GitError::Command(format!(
            "{} exists but is not a git repository",
            config.repo.display()
        ))));
    }
    info!(path = %config.repo.display(), "initializing bare data repo");
    std::fs::create_dir_all(&config.repo).map_err(git::GitError::Io)?;
    git::init_bare(&config.repo).await?;
    Ok(())
}

/// Run the fetch/import loop until the process exits.
pub async fn run(cache: Arc<Cache>, config: FetcherConfig) {
    let rev = config.rev.clone().unwrap_or_else(|| config.branch.clone());
    let mut ticker = if config.interval.is_zero() {
        None
    } else {
        let mut interval = tokio::time::interval(config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        Some(interval)
    };
    info!(interval = ?config.interval, "fetcher: starting");

    loop {
        if let Some(ticker) = ticker.as_mut() {
            ticker.tick().await;
        }
        if let Some(remote) = &config.remote {
            info!("fetcher: fetching repo");
            if let Err(e) = git::fetch(&config.repo, remote, &config.branch).await {
                error!(error = %e, "fetcher: fetch failed");
            }
        }
        info!("fetcher: updating cache");
        if let Err(e) = cache.import(&config.repo, &rev).await {
            error!(error = %e, "fetcher: cache update failed");
        }
        if ticker.is_none() {
            warn!("fetcher: repo polling disabled");
            return;
        }
    }
}
