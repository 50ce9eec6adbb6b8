//! # seer-ingest
//!
//! Streaming ingestion of SEER U.S. county population estimates.
//!
//! SEER distributes its population data as fixed-width text: one record per line, a
//! location token (`YYYY` year, two-letter state, state FIPS, county FIPS) followed by a
//! demographic token (race, origin, sex, age, population). This crate turns such a file
//! into a typed, columnar dataset without ever holding more than one chunk of decoded
//! records in memory.
//!
//! ## Stages
//!
//! ```text
//! lines ─ decode ─ ChunkSource ─ TypedBatch::cast ─ Predicate ─ BatchSink ─ ResultMerger
//! ```
//!
//! - [`decoder::decode`] turns a line into a [`Record`] or a [`SkipReason`]. Bad lines
//!   are counted and skipped, never fatal.
//! - [`ChunkSource`] groups records into chunks of a configurable size, numbered in
//!   input order.
//! - [`TypedBatch`] stores a chunk column by column with dictionary-encoded strings.
//! - [`Predicate`] keeps the rows a caller asked for.
//! - [`BatchSink`] retains batches in memory or spills them to Parquet artifacts under a
//!   staging manifest.
//! - [`ResultMerger`] concatenates everything in chunk order into a [`FinalDataset`].
//!
//! ## Quick start
//!
//! ```no_run
//! use seer_ingest::{Column, Pipeline, PipelineConfig, col};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = PipelineConfig::default()
//!     .with_year_filter(2011)
//!     .with_predicate(col(Column::Age).between(50, 75))
//!     .with_spill_dir("spill");
//! let output = Pipeline::new(config).run_file("data/us.1990_2023.19ages.adjusted.txt.gz")?;
//! println!(
//!     "{} rows ({} lines processed, {} skipped)",
//!     output.dataset.len(),
//!     output.stats.processed(),
//!     output.stats.skipped()
//! );
//! output.dataset.write_csv("seer_2011.csv")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `io-csv` - CSV export via `csv`
//! - `compression-gzip` - `.gz` input and output via `flate2`
//! - `compression-zstd` - `.zst` input and output via `zstd`
//!
//! All three are on by default. Parquet support is always compiled in because spill
//! artifacts use it.
//!
//! ## Logging
//!
//! The library emits [`tracing`] events and never installs a subscriber. The
//! `seer-ingest` binary installs one filtered by `RUST_LOG`.

pub mod batch;
pub mod chunks;
pub mod collab;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod io;
pub mod merge;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod testing;

pub use batch::{Column, ColumnType, DictColumn, SCHEMA, Schema, TypedBatch};
pub use chunks::{Chunk, ChunkSource, ChunkStats, DEFAULT_CHUNK_SIZE};
pub use collab::{Downloader, FetchConfig, GroupTotal, GroupedTotals, LocalDownloader, Reporter};
pub use decoder::{SkipKind, SkipReason, decode};
pub use error::{PipelineError, Stage};
pub use filter::{CmpOp, Predicate, PredicateParseError, Value, YearFilter, col};
pub use merge::{FinalDataset, ResultMerger};
pub use metrics::MetricsCollector;
pub use pipeline::{Pipeline, PipelineConfig, RunFailure, RunOutput, RunStats};
pub use record::{Origin, Race, Record, Sex};
pub use sink::{BatchHandle, BatchSink, SinkOutput, SpillArtifact, StagingArea};
