//! The run driver: lines in, [`FinalDataset`] out.
//!
//! ```text
//! lines ─ ChunkSource ─ TypedBatch::cast ─ filter::apply ─ BatchSink ─ ResultMerger
//! ```
//!
//! Stages run strictly one after another on the calling thread. At most one chunk is
//! being decoded at a time; in spill mode nothing else stays resident until the merge.

use crate::batch::TypedBatch;
use crate::chunks::{ChunkSource, ChunkStats, DEFAULT_CHUNK_SIZE};
use crate::error::{PipelineError, Result, Stage};
use crate::filter::{self, Predicate, YearFilter};
use crate::io::compression::open_lines;
use crate::merge::{FinalDataset, ResultMerger};
use crate::metrics::{MetricsCollector, names};
use crate::sink::BatchSink;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, info_span};

/// Run configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub years: YearFilter,
    pub chunk_size: usize,
    pub predicate: Option<Predicate>,
    /// Spill each filtered chunk here instead of keeping it in memory.
    pub spill_dir: Option<PathBuf>,
    pub metrics: Option<MetricsCollector>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            years: YearFilter::None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            predicate: None,
            spill_dir: None,
            metrics: None,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn with_year_filter(mut self, years: impl Into<YearFilter>) -> Self {
        self.years = years.into();
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the row predicate, replacing any earlier one.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    #[must_use]
    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// End-of-run counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    #[serde(flatten)]
    pub lines: ChunkStats,
    pub chunks_emitted: u64,
    /// Chunks with no rows left after filtering.
    pub chunks_dropped: u64,
    pub artifacts_spilled: u64,
    pub peak_chunk_rows: u64,
    pub rows_output: u64,
}

impl RunStats {
    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.lines.processed
    }

    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.lines.skipped
    }

    #[allow(clippy::cast_precision_loss)]
    fn publish(&self, metrics: &MetricsCollector) {
        let counters = [
            (names::LINES_PROCESSED, self.lines.processed),
            (names::LINES_SKIPPED, self.lines.skipped),
            (names::LINES_MALFORMED, self.lines.malformed),
            (names::LINES_PARSE_ERROR, self.lines.parse_errors),
            (names::LINES_FILTERED_OUT, self.lines.filtered_out),
            (names::CHUNKS_EMITTED, self.chunks_emitted),
            (names::CHUNKS_DROPPED, self.chunks_dropped),
            (names::ARTIFACTS_SPILLED, self.artifacts_spilled),
            (names::ROWS_OUTPUT, self.rows_output),
        ];
        for (name, value) in counters {
            metrics.increment_counter(name, value);
        }
        metrics.max_gauge(names::PEAK_CHUNK_ROWS, self.peak_chunk_rows as f64);
    }
}

/// A successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub dataset: FinalDataset,
    pub stats: RunStats,
}

/// An aborted run, with the counts reached before it stopped.
#[derive(Debug, Error)]
#[error(
    "run aborted after {} processed and {} skipped lines",
    .stats.lines.processed,
    .stats.lines.skipped
)]
pub struct RunFailure {
    #[source]
    pub error: PipelineError,
    pub stats: RunStats,
}

/// Drives one configuration over any number of inputs.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    #[must_use]
    pub const fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.config.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub const fn metrics(&self) -> Option<&MetricsCollector> {
        self.config.metrics.as_ref()
    }

    /// Run over a file; `.gz` and `.zst` inputs are decompressed as they stream.
    ///
    /// # Errors
    ///
    /// Returns a [`RunFailure`] if the input cannot be opened or read, a batch cannot be
    /// spilled or merged, or the configuration is invalid.
    pub fn run_file(&self, path: impl AsRef<Path>) -> Result<RunOutput, RunFailure> {
        let path = path.as_ref();
        match open_lines(path) {
            Ok(lines) => self.execute(lines, path),
            Err(e) => {
                let stats = RunStats::default();
                let error = PipelineError::io(Stage::Read, path, e);
                self.fail(error, stats)
            }
        }
    }

    /// Run over an in-memory line source.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run_file`].
    pub fn run_lines<I, L>(&self, lines: I) -> Result<RunOutput, RunFailure>
    where
        I: IntoIterator<Item = io::Result<L>>,
        L: AsRef<[u8]>,
    {
        self.execute(lines.into_iter(), Path::new("<lines>"))
    }

    fn execute<I, L>(&self, lines: I, origin: &Path) -> Result<RunOutput, RunFailure>
    where
        I: Iterator<Item = io::Result<L>>,
        L: AsRef<[u8]>,
    {
        let span = info_span!(
            "run",
            input = %origin.display(),
            years = %self.config.years,
            chunk_size = self.config.chunk_size,
            spill = self.config.spill_dir.is_some(),
        );
        let _guard = span.enter();
        if let Some(metrics) = &self.config.metrics {
            metrics.record_start();
        }

        let mut stats = RunStats::default();
        match self.drive(lines, origin, &mut stats) {
            Ok(dataset) => {
                stats.rows_output = dataset.len() as u64;
                info!(
                    processed = stats.lines.processed,
                    skipped = stats.lines.skipped,
                    malformed = stats.lines.malformed,
                    parse_errors = stats.lines.parse_errors,
                    filtered_out = stats.lines.filtered_out,
                    chunks = stats.chunks_emitted,
                    rows = stats.rows_output,
                    "run complete"
                );
                if let Some(metrics) = &self.config.metrics {
                    metrics.record_end();
                    stats.publish(metrics);
                }
                Ok(RunOutput { dataset, stats })
            }
            Err(error) => self.fail(error, stats),
        }
    }

    fn drive<I, L>(&self, lines: I, origin: &Path, stats: &mut RunStats) -> Result<FinalDataset>
    where
        I: Iterator<Item = io::Result<L>>,
        L: AsRef<[u8]>,
    {
        let mut source = ChunkSource::new(lines, self.config.years.clone(), self.config.chunk_size)?
            .with_origin(origin);
        let mut sink = match &self.config.spill_dir {
            Some(dir) => BatchSink::spill(dir)?,
            None => BatchSink::in_memory(),
        };

        while let Some(chunk) = source.next() {
            stats.lines = source.stats();
            let chunk = chunk?;
            stats.chunks_emitted += 1;
            stats.peak_chunk_rows = stats.peak_chunk_rows.max(chunk.len() as u64);

            let batch = {
                let _stage = info_span!("stage", name = "filter", seq = chunk.seq).entered();
                filter::apply(TypedBatch::cast(&chunk.records), self.config.predicate.as_ref())
            };
            if batch.is_empty() {
                stats.chunks_dropped += 1;
                debug!(seq = chunk.seq, "chunk dropped, no rows left after filtering");
                continue;
            }

            let _stage = info_span!("stage", name = "sink", seq = chunk.seq).entered();
            if sink.accept(chunk.seq, batch)?.is_spilled() {
                stats.artifacts_spilled += 1;
            }
        }
        stats.lines = source.stats();

        ResultMerger::new().finalize(sink.finish())
    }

    fn fail(&self, error: PipelineError, stats: RunStats) -> Result<RunOutput, RunFailure> {
        error!(
            stage = ?error.stage(),
            path = ?error.path(),
            processed = stats.lines.processed,
            skipped = stats.lines.skipped,
            error = %error,
            "run aborted"
        );
        if let Some(metrics) = &self.config.metrics {
            metrics.record_end();
            stats.publish(metrics);
        }
        Err(RunFailure { error, stats })
    }
}
