//! Where filtered batches go: kept in memory, or spilled to a staging directory.
//!
//! # Staging protocol
//!
//! Spill mode is a two-phase protocol over a directory the run owns exclusively.
//!
//! 1. **Stage.** Each accepted batch is written to `chunk_{seq:06}.parquet` through a
//!    temporary file that is synced and then renamed, so a file under the final name is
//!    always complete. After every artifact the `manifest.json` is rewritten the same
//!    way, listing each artifact with its row count and SHA-256 digest.
//! 2. **Finalize.** The merger marks the manifest `finalizing`, loads the artifacts in
//!    sequence order, deletes them, and removes the manifest last.
//!
//! A crash in either phase leaves the manifest next to the artifacts it describes;
//! [`StagingArea::recover`] reads it back so the staged chunks can still be merged.
//! A crash between an artifact's rename and the manifest rewrite leaves a complete
//! `chunk_*.parquet` the manifest does not list. Recovery reports such files through
//! [`StagingArea::unlisted_artifacts`] and a warning, but never merges or deletes them.

use crate::batch::TypedBatch;
use crate::error::{PipelineError, Result, Stage};
use crate::io::parquet::{sha256_file, write_parquet_to};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info, warn};

/// File name of the staging manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of the artifact holding chunk `seq`.
#[must_use]
pub fn artifact_file_name(seq: u64) -> String {
    format!("chunk_{seq:06}.parquet")
}

/// A batch persisted to the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpillArtifact {
    /// Sequence number of the originating chunk.
    pub seq: u64,
    pub path: PathBuf,
    pub rows: usize,
    /// Hex SHA-256 of the file contents at staging time.
    pub sha256: String,
}

/// Outcome of accepting a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchHandle {
    Retained { seq: u64, batch: TypedBatch },
    Spilled(SpillArtifact),
}

impl BatchHandle {
    #[must_use]
    pub const fn seq(&self) -> u64 {
        match self {
            Self::Retained { seq, .. } => *seq,
            Self::Spilled(artifact) => artifact.seq,
        }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        match self {
            Self::Retained { batch, .. } => batch.len(),
            Self::Spilled(artifact) => artifact.rows,
        }
    }

    #[must_use]
    pub const fn is_spilled(&self) -> bool {
        matches!(self, Self::Spilled(_))
    }
}

/// Phase recorded in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingState {
    Staging,
    Finalizing,
}

/// Manifest entry for one artifact. `file` is relative to the staging directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub seq: u64,
    pub file: String,
    pub rows: usize,
    pub sha256: String,
}

/// On-disk description of a staging directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub state: StagingState,
    pub artifacts: Vec<ManifestEntry>,
}

/// A spill directory owned by one run.
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    manifest: Manifest,
    created_dir: bool,
}

impl StagingArea {
    /// Claim `dir` for a new run, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] if `dir` already holds a manifest, and
    /// [`PipelineError::Io`] if the directory or manifest cannot be written.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let manifest_path = dir.join(MANIFEST_FILE);
        if manifest_path.exists() {
            return Err(PipelineError::configuration(format!(
                "spill directory {} already holds a staged run ({MANIFEST_FILE} present)",
                dir.display()
            )));
        }
        let created_dir = !dir.exists();
        fs::create_dir_all(&dir).map_err(|e| PipelineError::io(Stage::Spill, &dir, e))?;
        let area = Self {
            dir,
            manifest: Manifest {
                state: StagingState::Staging,
                artifacts: Vec::new(),
            },
            created_dir,
        };
        area.persist_manifest()?;
        debug!(stage = "spill", dir = %area.dir.display(), "staging area created");
        Ok(area)
    }

    /// Reopen a staging directory left behind by an interrupted run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the manifest cannot be read or parsed.
    pub fn recover(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let manifest_path = dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&manifest_path)
            .map_err(|e| PipelineError::io(Stage::Merge, &manifest_path, e))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .map_err(|e| PipelineError::io(Stage::Merge, &manifest_path, e))?;
        info!(
            stage = "spill",
            dir = %dir.display(),
            artifacts = manifest.artifacts.len(),
            state = ?manifest.state,
            "staging area recovered"
        );
        let area = Self {
            dir,
            manifest,
            created_dir: false,
        };
        for path in area.unlisted_artifacts()? {
            warn!(stage = "spill", path = %path.display(), "artifact not listed in manifest, ignored");
        }
        Ok(area)
    }

    /// Artifact files in the directory that the manifest does not list, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the directory cannot be listed.
    pub fn unlisted_artifacts(&self) -> Result<Vec<PathBuf>> {
        let list_err = |e: std::io::Error| PipelineError::io(Stage::Merge, &self.dir, e);
        let mut unlisted = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(list_err)? {
            let name = entry.map_err(list_err)?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let is_artifact = name.starts_with("chunk_") && name.ends_with(".parquet");
            if is_artifact && !self.manifest.artifacts.iter().any(|a| a.file == name) {
                unlisted.push(self.dir.join(name));
            }
        }
        unlisted.sort();
        Ok(unlisted)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub const fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Artifacts recorded so far, in staging order.
    #[must_use]
    pub fn artifacts(&self) -> Vec<SpillArtifact> {
        self.manifest
            .artifacts
            .iter()
            .map(|entry| SpillArtifact {
                seq: entry.seq,
                path: self.dir.join(&entry.file),
                rows: entry.rows,
                sha256: entry.sha256.clone(),
            })
            .collect()
    }

    /// Persist `batch` as the artifact for chunk `seq`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] with [`Stage::Spill`] if any part of the write fails;
    /// no file is left under the artifact's final name in that case.
    pub fn stage(&mut self, seq: u64, batch: &TypedBatch) -> Result<SpillArtifact> {
        let file = artifact_file_name(seq);
        let path = self.dir.join(&file);
        let spill_err = |e: anyhow::Error| PipelineError::io(Stage::Spill, &path, e);

        let tmp = Builder::new()
            .prefix(&format!("chunk_{seq:06}."))
            .suffix(".parquet.tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| PipelineError::io(Stage::Spill, &path, e))?;
        let handle = tmp
            .as_file()
            .try_clone()
            .map_err(|e| PipelineError::io(Stage::Spill, &path, e))?;
        let handle = write_parquet_to(handle, batch).map_err(spill_err)?;
        handle
            .sync_all()
            .map_err(|e| PipelineError::io(Stage::Spill, &path, e))?;
        drop(handle);
        tmp.persist(&path)
            .map_err(|e| PipelineError::io(Stage::Spill, &path, e.error))?;

        let sha256 = sha256_file(&path).map_err(spill_err)?;
        self.manifest.artifacts.push(ManifestEntry {
            seq,
            file,
            rows: batch.len(),
            sha256: sha256.clone(),
        });
        self.persist_manifest()?;
        debug!(stage = "spill", seq, rows = batch.len(), path = %path.display(), "artifact staged");
        Ok(SpillArtifact {
            seq,
            path,
            rows: batch.len(),
            sha256,
        })
    }

    /// Enter the finalize phase.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the manifest cannot be rewritten.
    pub fn begin_finalize(&mut self) -> Result<()> {
        self.manifest.state = StagingState::Finalizing;
        self.persist_manifest()
    }

    /// Remove the manifest, and the directory if this run created it and it is empty.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] with [`Stage::Cleanup`] if the manifest exists but
    /// cannot be removed.
    pub fn close(self) -> Result<()> {
        let manifest_path = self.dir.join(MANIFEST_FILE);
        match fs::remove_file(&manifest_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PipelineError::io(Stage::Cleanup, &manifest_path, e)),
        }
        if self.created_dir {
            // Fails when something else was put in the directory; it is then kept.
            if let Err(e) = fs::remove_dir(&self.dir) {
                debug!(stage = "cleanup", dir = %self.dir.display(), error = %e, "staging directory kept");
            }
        }
        Ok(())
    }

    fn persist_manifest(&self) -> Result<()> {
        let path = self.dir.join(MANIFEST_FILE);
        let io_err = |e: std::io::Error| PipelineError::io(Stage::Spill, &path, e);
        let json = serde_json::to_vec_pretty(&self.manifest)
            .map_err(|e| PipelineError::io(Stage::Spill, &path, e))?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Retention mode of a [`BatchSink`].
#[derive(Debug)]
enum SinkMode {
    InMemory,
    Spill(StagingArea),
}

/// Accepts filtered batches in sequence order.
#[derive(Debug)]
pub struct BatchSink {
    mode: SinkMode,
    handles: Vec<BatchHandle>,
}

/// Everything a sink accumulated, ready for the merger.
#[derive(Debug)]
pub struct SinkOutput {
    pub handles: Vec<BatchHandle>,
    /// Present in spill mode.
    pub staging: Option<StagingArea>,
}

impl BatchSink {
    /// Keep every accepted batch in memory.
    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            mode: SinkMode::InMemory,
            handles: Vec::new(),
        }
    }

    /// Spill every accepted batch to a staging area in `dir`.
    ///
    /// # Errors
    ///
    /// See [`StagingArea::create`].
    pub fn spill(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            mode: SinkMode::Spill(StagingArea::create(dir)?),
            handles: Vec::new(),
        })
    }

    #[must_use]
    pub const fn is_spilling(&self) -> bool {
        matches!(self.mode, SinkMode::Spill(_))
    }

    /// Accept the filtered batch of chunk `seq`.
    ///
    /// In spill mode only the artifact handle stays in memory.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the batch cannot be spilled.
    pub fn accept(&mut self, seq: u64, batch: TypedBatch) -> Result<&BatchHandle> {
        let handle = match &mut self.mode {
            SinkMode::InMemory => BatchHandle::Retained { seq, batch },
            SinkMode::Spill(area) => BatchHandle::Spilled(area.stage(seq, &batch)?),
        };
        self.handles.push(handle);
        self.handles
            .last()
            .ok_or_else(|| PipelineError::configuration(format!("no handle recorded for chunk {seq}")))
    }

    #[must_use]
    pub fn handles(&self) -> &[BatchHandle] {
        &self.handles
    }

    /// Hand everything to the merger.
    #[must_use]
    pub fn finish(self) -> SinkOutput {
        let staging = match self.mode {
            SinkMode::InMemory => None,
            SinkMode::Spill(area) => Some(area),
        };
        SinkOutput {
            handles: self.handles,
            staging,
        }
    }
}
