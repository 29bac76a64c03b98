//! The import loop: walk the data repository's history and ingest every
//! commit's snapshot files.
//!
//! Commits are processed oldest-to-newest by commit date (a backdated commit
//! can appear anywhere, so the walk always starts from the beginning), each
//! in its own transaction. Revision numbers are derived from insertion
//! order, which is why the ascending order matters. A commit already in
//! `commits` is free to skip; a commit whose payload duplicates an earlier
//! one, lacks a required file, or carries no scrape dates is logged and
//! skipped; git and storage failures abort the run with progress kept.

use std::path::Path;

use chrono::{DateTime, Utc};
use recsched_core::{ContentHash, Snapshot};
use tracing::{info, warn};

use crate::blob::insert_file;
use crate::error::{Error, Result};
use crate::git;
use crate::store::{to_unix, Cache, FORMATS};

impl Cache {
    /// Import every first-parent ancestor of `rev` from `repo`, skipping
    /// commits already imported.
    pub async fn import(&self, repo: &Path, rev: &str) -> Result<()> {
        info!(repo = %repo.display(), rev, "import: starting");

        let head = git::rev_commit(repo, rev).await?;
        info!(rev, commit = %head, "import: resolved rev");

        if self.has_commit(&head)? {
            info!("import: nothing to do, already up-to-date");
            return Ok(());
        }

        for (commit, date) in git::commits_asc_first_parent(repo, &head).await? {
            match self.import_commit(repo, &commit, date).await {
                Ok(true) => {}
                Ok(false) => {} // seen before
                Err(e) if e.is_skip() => {
                    warn!(commit = %commit, error = %e, "import: skipping commit");
                }
                Err(e) => {
                    tracing::error!(commit = %commit, error = %e, "import: failed");
                    return Err(e);
                }
            }
        }

        info!("import: finished");
        Ok(())
    }

    /// Import one commit. Returns false if it was already imported. Must be
    /// called oldest-to-newest so revision numbering comes out right.
    async fn import_commit(
        &self,
        repo: &Path,
        commit: &str,
        date: DateTime<Utc>,
    ) -> Result<bool> {
        if self.has_commit(commit)? {
            return Ok(false);
        }

        // fetch every wire file up front; the database work is one
        // synchronous transaction afterwards
        let mut contents: Vec<Vec<u8>> = Vec::with_capacity(FORMATS.len());
        for format in FORMATS {
            let name = format!("data.{format}");
            match git::cat_file(repo, commit, &name).await {
                Ok(bytes) => contents.push(bytes),
                Err(git::GitError::NotFound(_)) => {
                    return Err(Error::skip(format!("missing required file {name}")));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let payload = &contents[0];
        let snapshot = Snapshot::decode(payload)?;
        let updated = snapshot
            .updated()
            .ok_or_else(|| Error::skip("no facilities with a source date"))?;
        let (with_date, without_date) = snapshot.source_date_counts();
        if without_date != 0 {
            warn!(commit = %commit, with_date, without_date, "import: facilities missing source dates");
        }

        let primary_id = ContentHash::of(payload);

        self.with_writer(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT OR IGNORE INTO commits (hash, date) VALUES (?1, ?2)",
                rusqlite::params![commit, to_unix(date)],
            )?;
            if tx.changes() == 0 {
                // raced with an earlier import of the same commit
                tx.commit()?;
                return Ok(false);
            }
            info!(commit = %commit, date = %date, updated = %updated, "import: commit");

            let exists = |tx: &rusqlite::Transaction, id: &str| -> Result<bool> {
                Ok(tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM data WHERE id = ?1)",
                    [id],
                    |row| row.get(0),
                )?)
            };

            let mut id = primary_id.to_string();
            if exists(&tx, &id)? {
                // same canonical payload, but companion files may differ:
                // derive a sentinel-prefixed id over everything, and only
                // then call it a true duplicate
                let all = ContentHash::of_concat(contents.iter().map(|c| c.as_slice()));
                let derived = all.collision_variant();
                if exists(&tx, &derived)? {
                    return Err(Error::skip("duplicate snapshot"));
                }
                info!(old_id = %id, new_id = %derived, "import: duplicate canonical payload, derived id from all files");
                id = derived;
            }

            tx.execute(
                "INSERT INTO data (id, hash, updated, revision) VALUES (?1, ?2, ?3, \
                 1 + coalesce((SELECT revision FROM data WHERE updated = ?3 \
                 ORDER BY revision DESC LIMIT 1), 0))",
                rusqlite::params![id, commit, to_unix(updated)],
            )?;
            for (format, content) in FORMATS.iter().zip(&contents) {
                insert_file(&tx, &id, format, content)?;
            }

            tx.commit()?;
            Ok(true)
        })
    }
}
