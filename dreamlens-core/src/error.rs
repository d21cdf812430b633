// src/error.rs
//! Error taxonomy shared by the services.

use std::path::PathBuf;
use thiserror::Error;

/// Persisted embedding store could not be opened or decoded.
///
/// Only the nearest-neighbor breakdown depends on the store, so this error
/// never takes the process down. It is `Clone` so a failed load can be kept
/// and reported on every doughnut request.
#[derive(Debug, Clone, Error)]
pub enum StoreLoadError {
    #[error("vector store file missing: {0}")]
    Missing(PathBuf),
    #[error("vector store unreadable at {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("vector store malformed: {0}")]
    Malformed(String),
    #[error("vector store dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// External classifier failed or answered with an unusable payload.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("classifier exited with status {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("classifier payload malformed: {0}")]
    Malformed(String),
    #[error("classifier payload missing `archetype`")]
    MissingArchetype,
}

/// Internal to resource lookup; always resolved by the fallback chain.
#[derive(Debug, Error)]
pub enum ResourceLookupError {
    #[error("no resource file at {0}")]
    NotFound(PathBuf),
    #[error("resource path escapes resources dir: {0}")]
    Escapes(String),
    #[error("resource file malformed at {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("resource io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to build the reference table at startup.
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reading reference csv {path}: {reason}")]
    Csv { path: PathBuf, reason: String },
    #[error("reference csv {path} has no `{column}` column")]
    MissingColumn { path: PathBuf, column: String },
}

/// Rejected or failed `POST /llm` submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Blank input; not counted as a classification attempt.
    #[error("dream text is empty")]
    EmptyDream,
    #[error(transparent)]
    Classification(#[from] ClassificationError),
}
