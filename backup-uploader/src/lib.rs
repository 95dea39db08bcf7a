//! Backup Uploader Library
//!
//! Walks local directory trees, hashes every eligible file and stores it in an
//! S3-compatible object store, recording whatever could not be stored so a
//! later run can retry just those files.

pub mod config;
pub mod executor;
pub mod fs;
pub mod prompt;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::UploaderError;
pub type Result<T> = std::result::Result<T, UploaderError>;
