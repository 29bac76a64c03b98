//! The recreation-schedule data service.
//!
//! Wires the durable cache, the exporter memo, and the HTTP surface
//! together: `/v1/` lists versions, `/v1/{spec}/{format}` serves raw
//! snapshot files with content negotiation and weak ETags, and
//! `/export/...` serves the rendered JSON/CSV datasets. A background
//! fetcher keeps the cache in sync with the upstream data repository.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod memo;
pub mod negotiate;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use state::AppState;
