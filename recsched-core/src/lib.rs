//! Shared foundation for the recsched workspace: the error taxonomy used
//! across the ingest/index/export engine, content hashing, the scraped
//! snapshot data model, and the explicit process configuration (canonical
//! time zone, schema URL).

pub mod config;
pub mod error;
pub mod hash;
pub mod snapshot;

pub use config::CoreConfig;
pub use error::{Error, Result};
pub use hash::ContentHash;
pub use snapshot::Snapshot;
