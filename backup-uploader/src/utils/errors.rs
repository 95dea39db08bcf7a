//! Custom error types for the uploader.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum UploaderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid exclusion rule {id} ({pattern}): {source}")]
    InvalidRule {
        id: u32,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Traversal of {base} failed: {source}")]
    Traversal {
        base: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to read manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unable to write manifest {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to stat {path} for reprocessing: {source}")]
    ReprocessStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hash failures ({failed}) reached the allowed maximum ({max}), aborting")]
    HashFailureThreshold { failed: usize, max: usize },

    #[error("Unable to create bucket {bucket}: {source}")]
    ContainerCreate {
        bucket: String,
        #[source]
        source: StoreError,
    },

    #[error("Dry-run error: {0}")]
    DryRun(String),

    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, UploaderError>;
