//! Run-level error taxonomy.
//!
//! Per-line problems never surface here; they are [`SkipReason`](crate::decoder::SkipReason)s
//! that the chunk source counts and moves past. A [`PipelineError`] always aborts the run and
//! names the stage and path that failed.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Boxed source error carried by [`PipelineError::Io`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stage a fatal error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Opening or reading the primary input file.
    Read,
    /// Persisting a batch or the staging manifest.
    Spill,
    /// Loading spilled artifacts back for concatenation.
    Merge,
    /// Removing spent artifacts and staging metadata.
    Cleanup,
    /// Writing the final dataset to an export file.
    Export,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Spill => "spill",
            Self::Merge => "merge",
            Self::Cleanup => "cleanup",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal pipeline error.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An input, artifact, or export file could not be read or written.
    #[error("{stage} stage failed on {}", path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    /// The run was configured in a way the pipeline cannot honor.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    /// Wrap any error as an I/O failure of `stage` on `path`.
    pub fn io(stage: Stage, path: impl AsRef<Path>, source: impl Into<BoxError>) -> Self {
        Self::Io {
            stage,
            path: path.as_ref().to_path_buf(),
            source: source.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Stage of an I/O failure; `None` for configuration errors.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Io { stage, .. } => Some(*stage),
            Self::Configuration(_) => None,
        }
    }

    /// Path of an I/O failure; `None` for configuration errors.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::Configuration(_) => None,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
