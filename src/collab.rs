//! Seams to the world around a run: fetching inputs and summarizing results.

use crate::batch::Column;
use crate::io::compression::{auto_detect_reader, decompressed_file_name};
use crate::merge::FinalDataset;
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Where fetched inputs land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub data_dir: PathBuf,
    /// Keep a compressed download next to its decompressed copy.
    pub keep_compressed: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            keep_compressed: false,
        }
    }
}

/// Makes an input available as a local, uncompressed file.
pub trait Downloader {
    /// Resolve `url` to a readable local path.
    ///
    /// # Errors
    ///
    /// Implementations return an error when the source cannot be retrieved.
    fn fetch(&self, url: &str, config: &FetchConfig) -> Result<PathBuf>;
}

/// Resolves `file://` URLs and plain paths; never touches the network.
///
/// Compressed sources are decompressed into [`FetchConfig::data_dir`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDownloader;

impl LocalDownloader {
    fn local_path(url: &str) -> Result<PathBuf> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        if let Some((scheme, _)) = url.split_once("://") {
            bail!("unsupported scheme {scheme:?} in {url}: only local files can be fetched");
        }
        Ok(PathBuf::from(url))
    }
}

impl Downloader for LocalDownloader {
    fn fetch(&self, url: &str, config: &FetchConfig) -> Result<PathBuf> {
        let source = Self::local_path(url)?;
        if !source.is_file() {
            bail!("input {} does not exist", source.display());
        }
        let Some(name) = decompressed_file_name(&source) else {
            debug!(path = %source.display(), "input is not compressed");
            return Ok(source);
        };

        let data_dir = &config.data_dir;
        fs::create_dir_all(data_dir)
            .with_context(|| format!("mkdir -p {}", data_dir.display()))?;
        let target = data_dir.join(name);

        let file = File::open(&source).with_context(|| format!("open {}", source.display()))?;
        let mut reader = auto_detect_reader(file, &source)
            .with_context(|| format!("setup decompression for {}", source.display()))?;
        let mut tmp = NamedTempFile::new_in(data_dir)
            .with_context(|| format!("create temp file in {}", data_dir.display()))?;
        let bytes = io::copy(&mut reader, &mut tmp)
            .with_context(|| format!("decompress {}", source.display()))?;
        tmp.persist(&target)
            .with_context(|| format!("persist {}", target.display()))?;
        info!(source = %source.display(), target = %target.display(), bytes, "input decompressed");

        if !config.keep_compressed && same_dir(&source, data_dir) {
            fs::remove_file(&source).with_context(|| format!("remove {}", source.display()))?;
            debug!(path = %source.display(), "compressed copy removed");
        }
        Ok(target)
    }
}

fn same_dir(file: &Path, dir: &Path) -> bool {
    let parent = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), dir.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Turns a dataset into a summary.
pub trait Reporter {
    type Output;

    fn summarize(&self, dataset: &FinalDataset) -> Self::Output;
}

/// Total population for one combination of key values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupTotal {
    pub key: Vec<String>,
    pub population: i64,
}

/// Population summed by key columns, groups in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedTotals {
    pub keys: Vec<Column>,
}

impl GroupedTotals {
    pub fn new(keys: impl IntoIterator<Item = Column>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

impl Reporter for GroupedTotals {
    type Output = Vec<GroupTotal>;

    fn summarize(&self, dataset: &FinalDataset) -> Vec<GroupTotal> {
        let batch = dataset.batch();
        let mut index: HashMap<Vec<String>, usize> = HashMap::new();
        let mut totals: Vec<GroupTotal> = Vec::new();
        for (row, &population) in batch.populations().iter().enumerate() {
            let key: Vec<String> = self
                .keys
                .iter()
                .map(|&column| batch.format_cell(column, row))
                .collect();
            let slot = *index.entry(key.clone()).or_insert_with(|| {
                totals.push(GroupTotal { key, population: 0 });
                totals.len() - 1
            });
            totals[slot].population += i64::from(population);
        }
        totals
    }
}
