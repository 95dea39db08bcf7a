//! Failure manifest: the files a run did not manage to store.
//!
//! Written after every storing phase, even when nothing failed, and read back
//! by a later `--reprocess` run to retry just those files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::fs::FileRecord;
use crate::utils::errors::{Result, UploaderError};

/// Serialized as JSON at the configured manifest path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub bucket: String,
    pub has_failures: bool,
    pub date_created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default)]
    pub failed_paths: Vec<FailedPath>,
}

/// Snapshot of one record that was not stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedPath {
    pub full_name: PathBuf,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default)]
    pub hash_success: bool,
    #[serde(default)]
    pub storage_success: bool,
}

impl Manifest {
    /// Collect every eligible record that was not stored, in inventory order.
    pub fn build(bucket: &str, host: Option<String>, records: &[FileRecord]) -> Self {
        let failed_paths: Vec<FailedPath> = records
            .iter()
            .filter(|record| record.is_failure())
            .map(|record| FailedPath {
                full_name: record.path.clone(),
                size: record.size,
                hash: record.digest.clone(),
                hash_success: record.digest_ok(),
                storage_success: record.transferred,
            })
            .collect();

        Self {
            bucket: bucket.to_string(),
            has_failures: !failed_paths.is_empty(),
            date_created: Utc::now(),
            host,
            failed_paths,
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            UploaderError::ManifestRead {
                path: path.to_path_buf(),
                source,
            }
        })?;
        serde_json::from_str(&content).map_err(|source| UploaderError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| UploaderError::ManifestWrite {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            "Wrote failure manifest {} ({} failed files)",
            path.display(),
            self.failed_paths.len()
        );
        Ok(())
    }

    /// Plain listing of the failed paths, one per line
    pub fn failed_listing(&self) -> String {
        let mut listing = String::from("\nFailed Files Listing\n--------------------\n");
        for failed in &self.failed_paths {
            listing.push_str(&format!("{}\n", failed.full_name.display()));
        }
        listing
    }
}
