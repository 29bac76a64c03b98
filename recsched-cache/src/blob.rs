//! Content-addressed blob storage.
//!
//! Blobs are keyed by the digest of the *uncompressed* content and stored
//! gzipped at the highest setting. Identical content across versions is
//! stored once. Reads come in two modes: decompressed bytes, or the raw
//! gzip stream for callers that pass the encoding straight through; both
//! report the uncompressed length so HTTP callers can set `Content-Length`
//! for the identity case.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use recsched_core::ContentHash;
use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::store::Cache;

/// One blob read.
#[derive(Debug, Clone)]
pub struct BlobData {
    /// Decompressed content, or the raw gzip stream in raw mode.
    pub bytes: Vec<u8>,
    /// Length of the uncompressed content, regardless of mode.
    pub uncompressed_len: u64,
}

impl Cache {
    /// Read a blob by hash. `raw` returns the stored gzip stream instead of
    /// decompressing. `None` if no such blob exists.
    pub fn read_blob(&self, hash: &str, raw: bool) -> Result<Option<BlobData>> {
        self.with_reader(|conn| {
            let row: Option<(i64, Vec<u8>)> = conn
                .query_row(
                    "SELECT size, data FROM blobs WHERE hash = ?1",
                    [hash],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((size, compressed)) = row else {
                return Ok(None);
            };
            let uncompressed_len = size as u64;
            if raw {
                return Ok(Some(BlobData {
                    bytes: compressed,
                    uncompressed_len,
                }));
            }
            let mut bytes = Vec::with_capacity(uncompressed_len as usize);
            GzDecoder::new(compressed.as_slice()).read_to_end(&mut bytes)?;
            Ok(Some(BlobData {
                bytes,
                uncompressed_len,
            }))
        })
    }
}

/// Insert a blob (write-once) and its `files` row within the caller's
/// transaction. Returns the blob hash.
pub(crate) fn insert_file(
    conn: &Connection,
    id: &str,
    format: &str,
    content: &[u8],
) -> Result<String> {
    let hash = ContentHash::of(content).to_string();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(content)?;
    let compressed = encoder.finish()?;
    conn.execute(
        "INSERT OR IGNORE INTO blobs (hash, size, data) VALUES (?1, ?2, ?3)",
        rusqlite::params![hash, content.len() as i64, compressed],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO files (id, format, hash) VALUES (?1, ?2, ?3)",
        rusqlite::params![id, format, hash],
    )?;
    Ok(hash)
}
