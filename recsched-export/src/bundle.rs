//! The `.csv.zip` bundle.
//!
//! One archive containing `schema.csv` followed by one `<table>.csv` per
//! table in wire order. Entry metadata is fixed (the zip crate's default
//! epoch timestamp), so identical datasets produce byte-identical archives.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;
use crate::Dataset;

/// Assemble the CSV export bundle.
pub fn csv_zip(data: &Dataset) -> Result<Vec<u8>> {
    let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zw.start_file("schema.csv", options)?;
    zw.write_all(&crate::csv::schema())?;

    for (name, bytes) in crate::csv::tables(data)? {
        zw.start_file(format!("{name}.csv"), options)?;
        zw.write_all(&bytes)?;
    }

    Ok(zw.finish()?.into_inner())
}
