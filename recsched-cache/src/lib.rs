//! Durable snapshot cache.
//!
//! Snapshots live in a git data repository, one set of wire files per
//! commit. [`Cache::import`] walks that history and fills an embedded
//! SQLite database: commit metadata, version rows keyed by content hash,
//! and gzipped content-addressed blobs. Reads resolve version specs
//! ([`Cache::resolve_version`]) and stream blobs back out in either
//! encoding.

pub mod blob;
pub mod error;
pub mod git;
pub mod import;
pub mod resolve;
pub mod store;

pub use blob::BlobData;
pub use error::{Error, Result};
pub use git::GitError;
pub use resolve::Resolved;
pub use store::{Cache, DataVersion, FORMATS, SCHEMA_VERSION};
