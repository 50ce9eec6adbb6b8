//! Ordered concatenation of accepted batches into the final dataset.

use crate::batch::{SCHEMA, Schema, TypedBatch};
use crate::error::{PipelineError, Result, Stage};
use crate::io::parquet::{read_parquet_batch, sha256_file, write_parquet_batch};
use crate::record::Record;
use crate::sink::{BatchHandle, SinkOutput, SpillArtifact, StagingArea};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, info_span, warn};

/// The result of a run: one batch with the dataset schema. Read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalDataset {
    batch: TypedBatch,
}

impl FinalDataset {
    /// Zero rows, declared schema.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    #[must_use]
    pub const fn batch(&self) -> &TypedBatch {
        &self.batch
    }

    pub fn rows(&self) -> impl Iterator<Item = Record> + '_ {
        self.batch.rows()
    }

    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.rows().collect()
    }

    #[must_use]
    pub fn into_batch(self) -> TypedBatch {
        self.batch
    }

    /// Write the dataset as CSV with a header row of schema names.
    ///
    /// A `.gz` or `.zst` suffix compresses the output.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] with [`Stage::Export`] on any write failure.
    #[cfg(feature = "io-csv")]
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        crate::io::csv::write_csv_rows(path, &SCHEMA.names(), self.rows())
            .map_err(|e| PipelineError::io(Stage::Export, path, e))
    }

    /// Write the dataset to a single Parquet file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] with [`Stage::Export`] on any write failure.
    pub fn write_parquet(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        write_parquet_batch(path, &self.batch).map_err(|e| PipelineError::io(Stage::Export, path, e))
    }
}

impl From<TypedBatch> for FinalDataset {
    fn from(batch: TypedBatch) -> Self {
        Self { batch }
    }
}

/// Concatenates batch handles in sequence order.
#[derive(Debug, Clone, Copy)]
pub struct ResultMerger {
    verify_checksums: bool,
}

impl Default for ResultMerger {
    fn default() -> Self {
        Self {
            verify_checksums: true,
        }
    }
}

impl ResultMerger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip comparing artifact digests with the ones recorded at staging time.
    #[must_use]
    pub const fn without_checksums(mut self) -> Self {
        self.verify_checksums = false;
        self
    }

    /// Merge handles into one dataset.
    ///
    /// Spilled artifacts are deleted once every one of them has loaded. Artifacts
    /// already gone at that point are logged and skipped.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Configuration`] if retained and spilled handles are mixed.
    /// - [`PipelineError::Io`] with [`Stage::Merge`] if an artifact cannot be read or
    ///   its digest does not match; nothing is deleted in that case.
    pub fn merge(&self, mut handles: Vec<BatchHandle>) -> Result<FinalDataset> {
        let _span = info_span!("stage", name = "merge").entered();
        if handles.is_empty() {
            info!(stage = "merge", handles = 0, rows = 0, "no batches to merge");
            return Ok(FinalDataset::empty());
        }

        let spilled = handles.iter().filter(|h| h.is_spilled()).count();
        if spilled != 0 && spilled != handles.len() {
            return Err(PipelineError::configuration(format!(
                "cannot merge {} retained batches with {spilled} spilled artifacts",
                handles.len() - spilled
            )));
        }
        handles.sort_by_key(BatchHandle::seq);

        let count = handles.len();
        let mut batches = Vec::with_capacity(count);
        let mut artifacts = Vec::with_capacity(spilled);
        for handle in handles {
            match handle {
                BatchHandle::Retained { batch, .. } => batches.push(batch),
                BatchHandle::Spilled(artifact) => {
                    batches.push(self.load(&artifact)?);
                    artifacts.push(artifact);
                }
            }
        }

        let dataset = FinalDataset::from(TypedBatch::concat(&batches));
        drop(batches);
        for artifact in &artifacts {
            remove_artifact(artifact);
        }
        info!(stage = "merge", handles = count, rows = dataset.len(), "merge complete");
        Ok(dataset)
    }

    /// Merge a sink's output, running the finalize phase of its staging area.
    ///
    /// The manifest is removed only after every artifact has been merged.
    ///
    /// # Errors
    ///
    /// See [`ResultMerger::merge`]; also [`PipelineError::Io`] if the manifest cannot be
    /// updated or removed.
    pub fn finalize(&self, output: SinkOutput) -> Result<FinalDataset> {
        let SinkOutput { handles, staging } = output;
        match staging {
            None => self.merge(handles),
            Some(mut staging) => {
                staging.begin_finalize()?;
                let dataset = self.merge(handles)?;
                staging.close()?;
                Ok(dataset)
            }
        }
    }

    /// Merge whatever an interrupted run staged in `dir`.
    ///
    /// # Errors
    ///
    /// See [`StagingArea::recover`] and [`ResultMerger::finalize`].
    pub fn recover(&self, dir: impl AsRef<Path>) -> Result<FinalDataset> {
        let staging = StagingArea::recover(dir)?;
        let handles = staging
            .artifacts()
            .into_iter()
            .map(BatchHandle::Spilled)
            .collect();
        self.finalize(SinkOutput {
            handles,
            staging: Some(staging),
        })
    }

    fn load(&self, artifact: &SpillArtifact) -> Result<TypedBatch> {
        let path = &artifact.path;
        if self.verify_checksums {
            let actual =
                sha256_file(path).map_err(|e| PipelineError::io(Stage::Merge, path, e))?;
            if actual != artifact.sha256 {
                return Err(PipelineError::io(
                    Stage::Merge,
                    path,
                    format!("checksum mismatch: expected {}, found {actual}", artifact.sha256),
                ));
            }
        }
        let batch =
            read_parquet_batch(path).map_err(|e| PipelineError::io(Stage::Merge, path, e))?;
        if batch.len() != artifact.rows {
            return Err(PipelineError::io(
                Stage::Merge,
                path,
                format!("expected {} rows, found {}", artifact.rows, batch.len()),
            ));
        }
        debug!(stage = "merge", seq = artifact.seq, rows = batch.len(), "artifact loaded");
        Ok(batch)
    }
}

fn remove_artifact(artifact: &SpillArtifact) {
    match fs::remove_file(&artifact.path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(stage = "cleanup", path = %artifact.path.display(), "artifact already missing");
        }
        Err(e) => {
            warn!(stage = "cleanup", path = %artifact.path.display(), error = %e, "could not remove artifact");
        }
    }
}
