//! Delimited-text export of records.
//!
//! - [`write_csv_rows`] writes an explicit header row followed by Serde-serialized rows,
//!   so even an empty export carries its column names.
//! - [`read_csv_vec`] reads a file back into typed rows.
//!
//! Both sides compress or decompress by file extension (`.gz`, `.zst`).

use crate::io::compression::{auto_detect_reader, auto_detect_writer};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::Path;

/// Read a CSV file with a header row into a typed `Vec<T>`.
///
/// # Errors
/// Returns an error if the file cannot be opened or if any row fails to
/// deserialize into `T`.
pub fn read_csv_vec<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = auto_detect_reader(f, path)
        .with_context(|| format!("setup decompression for {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(rdr);
    let mut out = Vec::<T>::new();
    for (i, rec) in rdr.deserialize::<T>().enumerate() {
        let v = rec.with_context(|| format!("parse CSV record #{}", i + 1))?;
        out.push(v);
    }
    Ok(out)
}

/// Write `header` and then every row to a CSV file.
///
/// Parent directories are created as needed.
///
/// # Returns
/// The number of rows written, excluding the header.
///
/// # Errors
/// Returns an error if the file/dirs cannot be created or any row fails to
/// serialize/flush.
pub fn write_csv_rows<T: Serialize>(
    path: impl AsRef<Path>,
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let w = auto_detect_writer(f, path)
        .with_context(|| format!("setup compression for {}", path.display()))?;
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(w);
    wtr.write_record(header)
        .with_context(|| format!("write CSV header to {}", path.display()))?;
    let mut written = 0usize;
    for row in rows {
        written += 1;
        wtr.serialize(row)
            .with_context(|| format!("serialize CSV row #{written}"))?;
    }
    let mut inner = wtr
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flush {}: {}", path.display(), e.error()))?;
    inner
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(written)
}
