//! Configuration management for the uploader.
//!
//! Loads configuration from TOML file with environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::errors::{Result, UploaderError};

/// Overrides `[store] token`.
pub const TOKEN_ENV: &str = "BACKUP_UPLOADER_TOKEN";

/// Overrides `[store] endpoint`.
pub const ENDPOINT_ENV: &str = "BACKUP_UPLOADER_ENDPOINT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Top-level paths walked in order
    #[serde(default)]
    pub base_paths: Vec<PathBuf>,

    /// Exclusion regexes tested against the full path, in rule-id order
    #[serde(default)]
    pub exclusions: Vec<String>,

    /// Flat file with one exclusion regex per line, appended after `exclusions`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusions_file: Option<PathBuf>,

    /// Capacity hint for the inventory
    #[serde(default = "default_file_count_estimate")]
    pub file_count_estimate: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// S3-compatible endpoint (path-style addressing)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Destination bucket
    #[serde(default)]
    pub bucket: String,

    /// Region the bucket is created in
    #[serde(default = "default_region")]
    pub region: String,

    /// Bucket that must already exist for a dry run to pass
    #[serde(default)]
    pub dryrun_bucket: String,

    /// Bearer token, never written back out
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    /// Number of hashing workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Errors a single worker tolerates before it stops pulling work
    #[serde(default = "default_max_worker_errors")]
    pub max_worker_errors: usize,

    /// Run aborts when this many eligible files failed to hash
    #[serde(default = "default_max_failures")]
    pub max_failures: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Number of upload workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Errors a single worker tolerates before it stops pulling work
    #[serde(default = "default_max_worker_errors")]
    pub max_worker_errors: usize,

    /// Total put attempts per file, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Failure manifest written after each run and read when reprocessing
    #[serde(default = "default_manifest_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Flags chosen on the command line for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub dry_run: bool,
    pub reprocess: bool,
    pub no_confirm: bool,
}

// Default values
fn default_file_count_estimate() -> usize {
    10_000
}

fn default_endpoint() -> String {
    "https://s3.amazonaws.com".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_workers() -> usize {
    8
}

fn default_max_worker_errors() -> usize {
    10
}

fn default_max_failures() -> usize {
    25
}

fn default_max_attempts() -> u32 {
    4
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("backup-failures.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_paths: Vec::new(),
            exclusions: Vec::new(),
            exclusions_file: None,
            file_count_estimate: default_file_count_estimate(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            bucket: String::new(),
            region: default_region(),
            dryrun_bucket: String::new(),
            token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_worker_errors: default_max_worker_errors(),
            max_failures: default_max_failures(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_worker_errors: default_max_worker_errors(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: default_manifest_path(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl TransferConfig {
    /// Attempts actually made per file; anything below one still tries once.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Config {
    /// Load configuration from a TOML file and apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UploaderError::Config(format!("unable to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| UploaderError::Config(e.to_string()))
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.store.token = Some(token);
        }
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|e| !e.is_empty()) {
            self.store.endpoint = endpoint;
        }
    }

    /// Reject settings the run cannot work with
    pub fn validate(&self, options: &RunOptions) -> Result<()> {
        if self.digest.workers == 0 {
            return Err(UploaderError::Config("digest.workers must be at least 1".into()));
        }
        if self.transfer.workers == 0 {
            return Err(UploaderError::Config("transfer.workers must be at least 1".into()));
        }
        if !options.reprocess && self.source.base_paths.is_empty() {
            return Err(UploaderError::Config("source.base_paths is empty".into()));
        }
        if options.dry_run {
            if self.store.dryrun_bucket.is_empty() {
                return Err(UploaderError::Config(
                    "store.dryrun_bucket is required for a dry run".into(),
                ));
            }
        } else if self.store.bucket.is_empty() {
            return Err(UploaderError::Config("store.bucket is empty".into()));
        }
        Ok(())
    }

    /// Configuration rendered back to TOML, without secrets
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| UploaderError::Config(e.to_string()))
    }
}
