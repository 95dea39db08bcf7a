//! Object store collaborator.
//!
//! The pipelines only talk to [`ObjectStore`]; [`s3::S3Store`] speaks the S3
//! REST protocol and [`memory::MemoryStore`] keeps everything in process.

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

pub use memory::MemoryStore;
pub use s3::S3Store;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Bucket not found: {0}")]
    NoSuchContainer(String),

    #[error("Content digest mismatch for {key}: expected {expected}, got {actual}")]
    DigestMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Content of one object, streamed from an open file
#[derive(Debug)]
pub struct ObjectBody {
    pub file: tokio::fs::File,
    pub len: u64,
}

impl ObjectBody {
    pub fn new(file: tokio::fs::File, len: u64) -> Self {
        Self { file, len }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create a bucket in the given region
    async fn create_container(&self, name: &str, region: &str) -> Result<(), StoreError>;

    /// Names of every bucket visible to the caller
    async fn list_containers(&self) -> Result<Vec<String>, StoreError>;

    /// Store one object. `content_digest` is the base64 MD5 the store verifies against.
    async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: ObjectBody,
        content_digest: &str,
    ) -> Result<(), StoreError>;
}

/// Turn a native path into the key it is stored under, e.g. `E:\data\x.txt` -> `E:/data/x.txt`.
/// Object stores render `/` as folders in their consoles.
pub fn to_storage_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
