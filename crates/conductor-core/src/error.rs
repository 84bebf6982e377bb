use std::path::PathBuf;

use thiserror::Error;

/// Core error type for the research conductor.
///
/// Only the fatal classes surface here. Backend, sub-query, curation, and
/// hashing failures are absorbed where they happen and never reach callers.
#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("research planning failed: {0}")]
    Planning(String),
    #[error("document loading failed: {0}")]
    DocumentLoad(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConductorError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub(crate) fn planning(err: anyhow::Error) -> Self {
        Self::Planning(format!("{err:#}"))
    }

    pub(crate) fn document_load(err: anyhow::Error) -> Self {
        Self::DocumentLoad(format!("{err:#}"))
    }

    /// Whether the failure happened before any gathering began.
    pub fn is_planning(&self) -> bool {
        matches!(self, Self::Planning(_))
    }
}
