//! Dry run: check connectivity and report what a real run would do.

use std::fmt;
use tracing::info;

use crate::config::Config;
use crate::fs::FileRecord;
use crate::store::ObjectStore;
use crate::utils::errors::{Result, UploaderError};

/// Eligible paths shown in the report
pub const SAMPLE_SIZE: usize = 25;

#[derive(Debug, Clone)]
pub struct DryRunReport {
    /// Active configuration as TOML, secrets left out
    pub config_dump: String,
    pub containers: Vec<String>,
    pub sentinel: String,
    pub sentinel_found: bool,
    pub sample: Vec<String>,
    pub total_eligible: usize,
}

impl fmt::Display for DryRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Current configuration")?;
        writeln!(f, "---------------------")?;
        writeln!(f, "{}", self.config_dump.trim_end())?;
        writeln!(f)?;

        writeln!(f, "Buckets")?;
        writeln!(f, "-------")?;
        for name in &self.containers {
            writeln!(f, "{}", name)?;
        }
        writeln!(f)?;

        if self.sentinel_found {
            writeln!(f, "Located dry-run bucket: {}", self.sentinel)?;
        } else {
            writeln!(f, "Dry-run bucket not found: {}", self.sentinel)?;
        }
        writeln!(f)?;

        writeln!(f, "Sample of files to process")?;
        writeln!(f, "--------------------------")?;
        for (n, path) in self.sample.iter().enumerate() {
            writeln!(f, "[{} of {}] {}", n + 1, self.total_eligible, path)?;
        }
        Ok(())
    }
}

/// Verify the store is reachable and the sentinel bucket exists, then sample the inventory.
///
/// Nothing is hashed, created or stored, and no record is changed.
pub async fn run_dry(
    store: &dyn ObjectStore,
    config: &Config,
    records: &[FileRecord],
) -> Result<DryRunReport> {
    let config_dump = config.to_toml()?;

    let containers = store
        .list_containers()
        .await
        .map_err(|e| UploaderError::DryRun(format!("unable to list buckets: {}", e)))?;
    info!("Store is reachable, {} buckets visible", containers.len());

    let sentinel = config.store.dryrun_bucket.clone();
    let sentinel_found = containers.iter().any(|name| *name == sentinel);
    if !sentinel_found {
        return Err(UploaderError::DryRun(format!(
            "dry-run bucket {} was not found",
            sentinel
        )));
    }
    info!("Located dry-run bucket {}", sentinel);

    let eligible: Vec<&FileRecord> = records
        .iter()
        .filter(|r| !r.excluded && !r.is_dir)
        .collect();
    let sample = eligible
        .iter()
        .take(SAMPLE_SIZE)
        .map(|r| r.path.display().to_string())
        .collect();

    Ok(DryRunReport {
        config_dump,
        containers,
        sentinel,
        sentinel_found,
        sample,
        total_eligible: eligible.len(),
    })
}
