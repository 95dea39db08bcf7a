//! Backup run executor - sequences the phases of one run.
//!
//! Inventory (traversal, or a previous run's failure manifest), then either a
//! dry-run report or hashing, the hash-failure gate, bucket creation, storing
//! and finally the failure manifest.

pub mod digest;
pub mod dryrun;
pub mod manifest;
pub mod pool;
pub mod reprocess;
pub mod stats;
pub mod upload;

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::{Config, RunOptions};
use crate::fs::{build_inventory, ExclusionRules, FileRecord};
use crate::store::ObjectStore;
use crate::utils::errors::{Result, UploaderError};
use digest::{count_hash_failures, digest_all, DigestReport};
use dryrun::DryRunReport;
use manifest::Manifest;
use reprocess::Confirm;
use stats::{log_phase, InventoryStats, StorageStats};
use upload::{transfer_all, TransferReport, TransferSettings};

/// How a run ended when it did not fail
#[derive(Debug)]
pub enum RunOutcome {
    /// Reprocessing found no work, or the operator cancelled
    NothingToDo,
    DryRun(DryRunReport),
    Completed(RunSummary),
}

/// Result of a run that reached the storing phase
#[derive(Debug)]
pub struct RunSummary {
    pub digest: DigestReport,
    pub transfer: TransferReport,
    pub storage: StorageStats,
    pub manifest: Manifest,
}

pub struct BackupExecutor {
    config: Arc<Config>,
    options: RunOptions,
    store: Arc<dyn ObjectStore>,
    host: Option<String>,
}

impl BackupExecutor {
    pub fn new(config: Arc<Config>, options: RunOptions, store: Arc<dyn ObjectStore>) -> Self {
        let host = hostname::get()
            .ok()
            .map(|name| name.to_string_lossy().into_owned());
        Self {
            config,
            options,
            store,
            host,
        }
    }

    /// Execute one run inside its own tracing span.
    ///
    /// `confirm` is only consulted when reprocessing without `no_confirm`, on a
    /// blocking thread.
    pub async fn execute(&self, confirm: Box<dyn Confirm + Send>) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "run",
            %run_id,
            host = self.host.as_deref().unwrap_or("unknown")
        );
        self.run(confirm).instrument(span).await
    }

    async fn run(&self, confirm: Box<dyn Confirm + Send>) -> Result<RunOutcome> {
        let started = Instant::now();
        info!(
            "Starting backup-uploader v{} (dry run: {}, reprocess: {})",
            env!("CARGO_PKG_VERSION"),
            self.options.dry_run,
            self.options.reprocess
        );

        let records = if self.options.reprocess {
            let path = self.config.manifest.path.clone();
            let no_confirm = self.options.no_confirm;
            let records = tokio::task::spawn_blocking(move || {
                let mut confirm = confirm;
                let confirm: Option<&mut dyn Confirm> = if no_confirm {
                    None
                } else {
                    Some(confirm.as_mut())
                };
                reprocess::load_work_list(&path, confirm)
            })
            .await??;
            if records.is_empty() {
                info!("Nothing to reprocess");
                return Ok(RunOutcome::NothingToDo);
            }
            records
        } else {
            let records = self.traverse().await?;
            log_phase("Traversal", started.elapsed());
            records
        };

        InventoryStats::collect(&records).log();

        let outcome = if self.options.dry_run {
            let report = dryrun::run_dry(self.store.as_ref(), &self.config, &records).await?;
            RunOutcome::DryRun(report)
        } else {
            RunOutcome::Completed(self.process(records).await?)
        };

        log_phase("Total execution", started.elapsed());
        Ok(outcome)
    }

    /// Build the inventory from the configured base paths on a blocking thread.
    pub async fn traverse(&self) -> Result<Vec<FileRecord>> {
        let source = &self.config.source;
        let mut rules = ExclusionRules::compile(&source.exclusions)?;
        if let Some(file) = &source.exclusions_file {
            rules.extend_from_file(file)?;
        }
        info!("Loaded {} exclusion rules", rules.len());

        let base_paths = source.base_paths.clone();
        let capacity = source.file_count_estimate;
        tokio::task::spawn_blocking(move || build_inventory(&base_paths, &rules, capacity)).await?
    }

    /// Hash, gate, create the bucket, store and write the manifest.
    pub async fn process(&self, mut records: Vec<FileRecord>) -> Result<RunSummary> {
        let digest_config = &self.config.digest;
        let phase_started = Instant::now();
        let digest = digest_all(
            &mut records,
            digest_config.workers,
            digest_config.max_worker_errors,
        )
        .await;
        log_phase("Hashing", phase_started.elapsed());

        let failed = count_hash_failures(&records);
        info!("Failed hash count: {}", failed);
        if failed >= digest_config.max_failures {
            error!(
                "Hash failures ({}) reached the allowed maximum ({}), nothing will be stored",
                failed, digest_config.max_failures
            );
            return Err(UploaderError::HashFailureThreshold {
                failed,
                max: digest_config.max_failures,
            });
        }

        let bucket = self.config.store.bucket.clone();
        self.store
            .create_container(&bucket, &self.config.store.region)
            .await
            .map_err(|source| UploaderError::ContainerCreate {
                bucket: bucket.clone(),
                source,
            })?;
        info!("Bucket {} is ready", bucket);

        let settings = TransferSettings {
            bucket: bucket.clone(),
            workers: self.config.transfer.workers,
            max_worker_errors: self.config.transfer.max_worker_errors,
            max_attempts: self.config.transfer.attempts(),
        };
        let phase_started = Instant::now();
        let transfer = transfer_all(&mut records, &settings, Arc::clone(&self.store)).await;
        log_phase("Storing", phase_started.elapsed());

        let manifest = Manifest::build(&bucket, self.host.clone(), &records);
        manifest.write(&self.config.manifest.path)?;

        let storage = StorageStats::collect(&records);
        storage.log();

        Ok(RunSummary {
            digest,
            transfer,
            storage,
            manifest,
        })
    }
}
