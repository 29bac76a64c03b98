//! Exporter singleflight memo.
//!
//! One export per version id runs at a time: concurrent callers subscribe to
//! the same entry and wait on its completion signal. Entries are held
//! through weak pointers, so once every response referencing an export has
//! been written the memory can be reclaimed; a log line records the
//! cleanup. Resolution of the `latest` spec is additionally serialized by a
//! mutex so a thundering herd of "what is latest" requests coalesces.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use recsched_cache::{Cache, Resolved};
use recsched_core::CoreConfig;
use recsched_export::{bundle, json, Dataset};
use recsched_index::Indexer;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Result, ServerError};
use crate::negotiate::content_etag;

/// A finished export of one version.
#[derive(Debug)]
pub struct ExportOutput {
    pub json: Vec<u8>,
    pub json_etag: String,
    pub csv_zip: Vec<u8>,
    pub csv_etag: String,
}

/// One memo entry: a version id plus an export that is either in flight or
/// finished.
pub struct ExportEntry {
    id: String,
    ready: watch::Receiver<bool>,
    output: OnceLock<std::result::Result<ExportOutput, String>>,
}

impl ExportEntry {
    /// The canonical version id this export belongs to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait until the export finishes and return it.
    pub async fn wait(&self) -> Result<&ExportOutput> {
        let mut ready = self.ready.clone();
        ready
            .wait_for(|done| *done)
            .await
            .map_err(|_| ServerError::internal("export task vanished"))?;
        match self.output.get() {
            Some(Ok(output)) => Ok(output),
            Some(Err(msg)) => Err(ServerError::internal(msg.clone())),
            None => Err(ServerError::internal("export finished without output")),
        }
    }
}

impl Drop for ExportEntry {
    fn drop(&mut self) {
        info!(id = %self.id, "export: freed unused cache entry");
    }
}

/// Weakly held singleflight cache of exports, keyed by version id.
pub struct ExportMemo {
    cache: Arc<Cache>,
    config: CoreConfig,
    entries: Mutex<HashMap<String, Weak<ExportEntry>>>,
    latest: tokio::sync::Mutex<Option<Arc<ExportEntry>>>,
}

impl ExportMemo {
    pub fn new(cache: Arc<Cache>, config: CoreConfig) -> Self {
        ExportMemo {
            cache,
            config,
            entries: Mutex::new(HashMap::new()),
            latest: tokio::sync::Mutex::new(None),
        }
    }

    /// Resolve a version spec to its export entry. `Ok(None)` means the spec
    /// was valid but matched nothing.
    pub async fn resolve(&self, spec: &str) -> Result<Option<Arc<ExportEntry>>> {
        let spec = if spec.is_empty() { "latest" } else { spec };

        // when the spec is already a prepared id, skip resolution entirely
        if let Some(entry) = self.lookup(spec) {
            debug!(id = %spec, "export: got cached export");
            return Ok(Some(entry));
        }

        // coalesce concurrent latest lookups
        let latest_guard = if spec == "latest" {
            Some(self.latest.lock().await)
        } else {
            None
        };

        debug!(spec, "export: resolving version");
        let cache = Arc::clone(&self.cache);
        let owned = spec.to_string();
        let resolved = tokio::task::spawn_blocking(move || cache.resolve_version(&owned))
            .await
            .map_err(|e| ServerError::internal(format!("resolver task: {e}")))??;

        let id = match resolved {
            Resolved::Invalid => {
                return Err(ServerError::bad_request(format!(
                    "invalid spec format {spec:?}"
                )))
            }
            Resolved::NoMatch => return Ok(None),
            Resolved::Found { id, .. } => id,
        };

        let entry = self.prepare(&id);

        if let Some(mut guard) = latest_guard {
            let old = guard.as_ref().map(|e| e.id.clone());
            if old.as_deref() != Some(id.as_str()) {
                info!(old = old.as_deref().unwrap_or(""), new = %id, "export: got new latest version");
            }
            *guard = Some(Arc::clone(&entry));
        }

        Ok(Some(entry))
    }

    fn lookup(&self, id: &str) -> Option<Arc<ExportEntry>> {
        self.entries
            .lock()
            .expect("memo mutex poisoned")
            .get(id)
            .and_then(Weak::upgrade)
    }

    /// Get or create the entry for `id`, spawning the export task on
    /// creation.
    fn prepare(&self, id: &str) -> Arc<ExportEntry> {
        let mut entries = self.entries.lock().expect("memo mutex poisoned");
        if let Some(entry) = entries.get(id).and_then(Weak::upgrade) {
            debug!(id, "export: got cached export");
            return entry;
        }

        let (tx, rx) = watch::channel(false);
        let entry = Arc::new(ExportEntry {
            id: id.to_string(),
            ready: rx,
            output: OnceLock::new(),
        });
        entries.retain(|_, weak| weak.strong_count() > 0);
        entries.insert(id.to_string(), Arc::downgrade(&entry));
        info!(id, total = entries.len(), "export: preparing new cache entry");
        drop(entries);

        let cache = Arc::clone(&self.cache);
        let config = self.config.clone();
        let task_entry = Arc::clone(&entry);
        tokio::spawn(async move {
            let id = task_entry.id.clone();
            debug!(id = %id, "export: preparing");
            let worker_cache = cache;
            let worker_id = id.clone();
            let result = tokio::task::spawn_blocking(move || {
                build_export(&worker_cache, &config, &worker_id)
            })
            .await
            .unwrap_or_else(|e| Err(format!("export task: {e}")));

            match &result {
                Ok(output) => debug!(
                    id = %id,
                    csv_size = output.csv_zip.len(),
                    json_size = output.json.len(),
                    "export: done"
                ),
                Err(e) => tracing::error!(id = %id, error = %e, "export: failed"),
            }
            let _ = task_entry.output.set(result);
            let _ = tx.send(true);
        });

        entry
    }
}

impl std::fmt::Debug for ExportMemo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock().expect("memo mutex poisoned");
        let live = entries.values().filter(|w| w.strong_count() > 0).count();
        f.debug_struct("ExportMemo").field("live", &live).finish()
    }
}

/// Load the version's canonical payload, index it, and render both export
/// documents. Runs on the blocking pool; the indexer is discarded with the
/// task.
fn build_export(
    cache: &Cache,
    config: &CoreConfig,
    id: &str,
) -> std::result::Result<ExportOutput, String> {
    let hash = cache
        .format_blob(id, "pb")
        .map_err(|e| format!("load data {id:?}: resolve format: {e}"))?
        .ok_or_else(|| format!("load data {id:?}: no pb found"))?;
    let blob = cache
        .read_blob(&hash, false)
        .map_err(|e| format!("load data {id:?}: read pb: {e}"))?
        .ok_or_else(|| format!("load data {id:?}: missing blob"))?;

    let mut indexer = Indexer::new(config.clone());
    let idx = indexer
        .load(&blob.bytes)
        .map_err(|e| format!("load data {id:?}: {e}"))?;
    let dataset = Dataset::build(&idx.data());

    let json = json::write(&dataset, config.schema_url.as_deref());
    let json_etag = content_etag(&json);
    let csv_zip =
        bundle::csv_zip(&dataset).map_err(|e| format!("export data {id:?}: {e}"))?;
    let csv_etag = content_etag(&csv_zip);

    Ok(ExportOutput {
        json,
        json_etag,
        csv_zip,
        csv_etag,
    })
}
