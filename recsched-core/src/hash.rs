//! Content hashing for snapshot payloads and blobs.
//!
//! Identity throughout the engine is the RFC 4648 base32 encoding of the
//! SHA-1 digest of the raw bytes: a fixed 32-character ASCII string. This is
//! what appears in the `data`/`blobs` tables, URLs, and weak ETags.
//!
//! The base32 alphabet (`A-Z2-7`) deliberately leaves digits like `9` unused:
//! the importer prefixes collision-derived ids with `'9'` so they remain
//! distinguishable while staying the same length.

use data_encoding::BASE32;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Length of the string form: base32 of a 20-byte SHA-1 digest.
pub const HASH_STR_LEN: usize = 32;

/// Sentinel prefix for ids derived from a payload collision. Not part of the
/// base32 alphabet.
pub const COLLISION_SENTINEL: char = '9';

/// Base32-encoded SHA-1 content digest.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash `bytes` with SHA-1 and encode base32.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha1::digest(bytes);
        ContentHash(BASE32.encode(&digest))
    }

    /// Hash the concatenation of several byte slices.
    pub fn of_concat<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = Sha1::new();
        for part in parts {
            hasher.update(part);
        }
        ContentHash(BASE32.encode(&hasher.finalize()))
    }

    /// Derive the collision variant: the sentinel character followed by the
    /// tail of the concatenated-payload digest. Same length as a normal id.
    pub fn collision_variant(&self) -> String {
        let mut id = String::with_capacity(HASH_STR_LEN);
        id.push(COLLISION_SENTINEL);
        id.push_str(&self.0[1..]);
        id
    }

    /// Borrow the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `s` has the exact length of an id string. Collision-variant
    /// ids pass this check too.
    pub fn is_id(s: &str) -> bool {
        s.len() == HASH_STR_LEN
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if !Self::is_id(s) {
            return Err(Error::validation(format!(
                "invalid content hash length {} (wanted {HASH_STR_LEN})",
                s.len()
            )));
        }
        Ok(ContentHash(s.to_string()))
    }
}
