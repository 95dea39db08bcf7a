//! Rebuilding a work list from a previous run's failure manifest.

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::info;

use super::manifest::{FailedPath, Manifest};
use crate::fs::FileRecord;
use crate::utils::errors::{Result, UploaderError};

/// What the operator chose when asked about a reprocessing run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    List,
    Cancel,
}

/// What the operator is shown before deciding
#[derive(Debug, Clone)]
pub struct ManifestSummary {
    pub bucket: String,
    pub date_created: DateTime<Utc>,
    pub failed: usize,
}

/// Asks whether a reprocessing run should go ahead
pub trait Confirm {
    fn decide(&mut self, summary: &ManifestSummary) -> Decision;

    /// Show the files that would be reprocessed
    fn list(&mut self, entries: &[FailedPath]);
}

/// Never asks, always proceeds
#[derive(Debug, Default)]
pub struct NoConfirm;

impl Confirm for NoConfirm {
    fn decide(&mut self, _summary: &ManifestSummary) -> Decision {
        Decision::Proceed
    }

    fn list(&mut self, _entries: &[FailedPath]) {}
}

/// Load the manifest and turn its failures into fresh, eligible records.
///
/// An empty result means there is nothing to do: the manifest had no failures
/// or the operator cancelled. Each listed path is stat'ed again for its current
/// size; a path that can no longer be stat'ed is an error.
pub fn load_work_list(
    manifest_path: &Path,
    confirm: Option<&mut dyn Confirm>,
) -> Result<Vec<FileRecord>> {
    let manifest = Manifest::read(manifest_path)?;

    if !manifest.has_failures {
        info!("Manifest {} has no failures to reprocess", manifest_path.display());
        return Ok(Vec::new());
    }

    if let Some(confirm) = confirm {
        let summary = ManifestSummary {
            bucket: manifest.bucket.clone(),
            date_created: manifest.date_created,
            failed: manifest.failed_paths.len(),
        };

        loop {
            match confirm.decide(&summary) {
                Decision::Proceed => break,
                Decision::List => confirm.list(&manifest.failed_paths),
                Decision::Cancel => {
                    info!("Reprocessing cancelled");
                    return Ok(Vec::new());
                }
            }
        }
    }

    let mut records = Vec::with_capacity(manifest.failed_paths.len());
    for failed in &manifest.failed_paths {
        let metadata =
            std::fs::metadata(&failed.full_name).map_err(|source| UploaderError::ReprocessStat {
                path: failed.full_name.clone(),
                source,
            })?;
        records.push(FileRecord::eligible(&failed.full_name, metadata.len()));
    }

    info!(
        "Reprocessing {} files from run of {}",
        records.len(),
        manifest.date_created
    );
    Ok(records)
}
