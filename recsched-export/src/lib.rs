//! Deterministic exporters for the simplified schedule dataset.
//!
//! [`Dataset::build`] flattens an indexed snapshot (or a filtered view of
//! one) into five tables; [`csv`], [`json`], and [`bundle`] render them.
//! Identical inputs always produce byte-identical output, which the service
//! layer relies on for content-addressed ETags.

pub mod bundle;
pub mod csv;
pub mod dataset;
pub mod error;
pub mod json;
pub mod table;

pub use dataset::{
    ActivityRow, AttributionRow, Dataset, ErrorRow, FacilityRow, HtmlRow,
};
pub use error::{Error, Result};
pub use table::{ColumnKind, ColumnSpec, Row, Table, Value};
