//! The durable cache: an embedded SQLite database.
//!
//! Four tables: `commits` (seen source commits), `data` (one row per
//! imported snapshot, ordered by `(updated, revision)`), `files` (the wire
//! formats available per snapshot), and `blobs` (content-addressed gzipped
//! payloads). The schema version lives in `PRAGMA user_version`; any
//! mismatch refuses to open unless the caller resets.
//!
//! One connection writes (the importer); readers check connections out of a
//! small pool, relying on WAL mode so reads and the import transaction do
//! not block each other.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rusqlite::{Connection, OpenFlags};

use crate::error::{Error, Result};

/// Increment when the schema, the import semantics, or the set of imported
/// formats change. A mismatch forces a full reset.
pub const SCHEMA_VERSION: i64 = 4;

/// The wire formats stored per snapshot, canonical first. All are required
/// at import time; only the canonical binary payload is ever parsed.
pub const FORMATS: [&str; 4] = ["pb", "textpb", "proto", "json"];

const SCHEMA_DDL: &str = "
PRAGMA encoding = 'UTF-8';

CREATE TABLE commits ( -- commit metadata
    hash TEXT NOT NULL, -- git commit hash
    date REAL NOT NULL, -- unix fractional timestamp
    PRIMARY KEY(hash)
) STRICT, WITHOUT ROWID;

CREATE TABLE data ( -- snapshot metadata
    id TEXT NOT NULL, -- opaque identifier, usually base32-encoded sha1
    hash TEXT NOT NULL, -- git commit hash
    updated REAL NOT NULL, -- unix fractional timestamp
    revision INTEGER NOT NULL, -- positive integer
    PRIMARY KEY(id),
    FOREIGN KEY(hash) REFERENCES commits(hash),
    UNIQUE(updated DESC, revision DESC),
    UNIQUE(hash)
) STRICT, WITHOUT ROWID;

CREATE TABLE files ( -- snapshot file
    id TEXT NOT NULL,
    format TEXT NOT NULL,
    hash TEXT, -- base32-encoded sha1
    PRIMARY KEY(id, format),
    FOREIGN KEY(id) REFERENCES data(id),
    FOREIGN KEY(hash) REFERENCES blobs(hash),
    CHECK(format IN ('pb','textpb','proto','json'))
) STRICT, WITHOUT ROWID;

CREATE TABLE blobs ( -- snapshot file contents
    hash TEXT NOT NULL, -- base32-encoded sha1 of unencoded data
    size INTEGER NOT NULL, -- uncompressed data length
    data BLOB NOT NULL, -- gzipped data
    PRIMARY KEY(hash)
) STRICT;
";

/// Cap on pooled reader connections kept open.
const READER_POOL_SIZE: usize = 4;

/// One row of the `data` table, joined with its commit.
#[derive(Debug, Clone, PartialEq)]
pub struct DataVersion {
    pub id: String,
    pub commit: String,
    pub committed: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub revision: i64,
}

/// The durable snapshot cache.
pub struct Cache {
    path: PathBuf,
    timezone: Tz,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
}

impl Cache {
    /// Open (and initialize if empty) the cache at `path`. With `reset`, the
    /// database is deleted and recreated first. A populated database whose
    /// schema version differs returns [`Error::UnsupportedSchema`].
    pub fn open(path: &Path, reset: bool, timezone: Tz) -> Result<Cache> {
        if reset {
            for suffix in ["", "-wal", "-shm"] {
                let mut name = path.as_os_str().to_owned();
                name.push(suffix);
                match std::fs::remove_file(PathBuf::from(name)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let conn = Connection::open(path)?;
        apply_options(&conn)?;

        let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if current == 0 {
            conn.execute_batch(SCHEMA_DDL)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        } else if current != SCHEMA_VERSION {
            return Err(Error::UnsupportedSchema {
                found: current,
                wanted: SCHEMA_VERSION,
            });
        }

        Ok(Cache {
            path: path.to_path_buf(),
            timezone,
            writer: Mutex::new(conn),
            readers: Mutex::new(Vec::new()),
        })
    }

    /// The zone date-prefix version specs resolve in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Run `f` on the writer connection.
    pub(crate) fn with_writer<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.writer.lock().expect("writer mutex poisoned");
        f(&mut conn)
    }

    /// Run `f` on a pooled read-only connection.
    pub(crate) fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let pooled = self.readers.lock().expect("reader mutex poisoned").pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => {
                let conn = Connection::open_with_flags(
                    &self.path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                conn.pragma_update_and_check(None, "busy_timeout", 10_000, |_row| Ok(()))?;
                conn
            }
        };
        let result = f(&conn);
        let mut pool = self.readers.lock().expect("reader mutex poisoned");
        if pool.len() < READER_POOL_SIZE {
            pool.push(conn);
        }
        result
    }

    /// True if the commit hash has been seen by a completed import.
    pub fn has_commit(&self, hash: &str) -> Result<bool> {
        self.with_reader(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM commits WHERE hash = ?1)",
                [hash],
                |row| row.get(0),
            )?)
        })
    }

    /// All versions, most recently updated first.
    pub fn versions(&self) -> Result<Vec<DataVersion>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT data.id, commits.hash, commits.date, data.updated, data.revision \
                 FROM data LEFT JOIN commits ON commits.hash = data.hash \
                 ORDER BY data.updated DESC, data.revision DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(DataVersion {
                    id: row.get(0)?,
                    commit: row.get(1)?,
                    committed: from_unix(row.get(2)?),
                    updated: from_unix(row.get(3)?),
                    revision: row.get(4)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// The `(blob hash, format)` pairs stored for a version id.
    pub fn formats(&self, id: &str) -> Result<Vec<(String, String)>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT hash, format FROM files WHERE id = ?1")?;
            let rows = stmt.query_map([id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// The blob hash of `format` for a version id.
    pub fn format_blob(&self, id: &str, format: &str) -> Result<Option<String>> {
        Ok(self
            .formats(id)?
            .into_iter()
            .find(|(_, f)| f == format)
            .map(|(hash, _)| hash))
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("path", &self.path).finish()
    }
}

fn apply_options(conn: &Connection) -> Result<()> {
    // WAL so reads and the import transaction don't block each other;
    // generous busy timeout to ride out writer checkpoints. Both pragmas
    // report their new value, hence the check variant.
    conn.pragma_update_and_check(None, "journal_mode", "wal", |_row| Ok(()))?;
    conn.pragma_update_and_check(None, "busy_timeout", 10_000, |_row| Ok(()))?;
    conn.pragma_update(None, "cache_size", 4096)?;
    conn.pragma_update(None, "auto_vacuum", "OFF")?;
    conn.pragma_update(None, "automatic_index", "OFF")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Encode a timestamp as a unix fractional REAL.
pub(crate) fn to_unix(dt: DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9
}

/// Decode a unix fractional REAL.
pub(crate) fn from_unix(v: f64) -> DateTime<Utc> {
    let secs = v.floor() as i64;
    let nanos = ((v - v.floor()) * 1e9).round() as u32;
    Utc.timestamp_opt(secs, nanos.min(999_999_999))
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Toronto;

    fn temp_cache() -> (tempfile::TempDir, Cache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(&dir.path().join("cache.db"), false, Toronto).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_open_initializes_schema() {
        let (_dir, cache) = temp_cache();
        assert!(cache.versions().unwrap().is_empty());
        assert!(!cache.has_commit("0".repeat(40).as_str()).unwrap());
    }

    #[test]
    fn test_open_rejects_unsupported_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", 1).unwrap();
        }
        match Cache::open(&path, false, Toronto) {
            Err(Error::UnsupportedSchema { found: 1, wanted }) => {
                assert_eq!(wanted, SCHEMA_VERSION);
            }
            other => panic!("expected UnsupportedSchema, got {other:?}"),
        }
        // reset wipes and recreates
        let cache = Cache::open(&path, true, Toronto).unwrap();
        assert!(cache.versions().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_keeps_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        drop(Cache::open(&path, false, Toronto).unwrap());
        assert!(Cache::open(&path, false, Toronto).is_ok());
    }

    #[test]
    fn test_unix_roundtrip() {
        let dt = Utc.with_ymd_and_hms(2025, 10, 3, 12, 30, 45).unwrap();
        assert_eq!(from_unix(to_unix(dt)), dt);
        assert_eq!(to_unix(dt).fract(), 0.0);
    }
}
