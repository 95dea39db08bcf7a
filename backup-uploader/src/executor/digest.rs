//! Content digests for every eligible file.
//!
//! The digest is the base64-encoded MD5 of the file content, the same value an
//! S3-compatible store expects in `Content-MD5` to verify an upload.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{error, info};

use super::pool::{self, Outcome, PoolSettings};
use crate::fs::FileRecord;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Base64 MD5 of an in-memory buffer
pub fn digest_bytes(data: &[u8]) -> String {
    STANDARD.encode(Md5::digest(data))
}

/// Stream a reader to the end and return its base64 MD5
pub async fn digest_reader<R>(mut reader: R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(STANDARD.encode(hasher.finalize()))
}

pub async fn digest_file(path: &Path) -> std::io::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    digest_reader(file).await
}

struct DigestJob {
    index: usize,
    path: PathBuf,
    excluded: bool,
}

enum DigestOutcome {
    Skipped,
    Hashed { index: usize, digest: String },
    Failed { index: usize },
}

impl Outcome for DigestOutcome {
    fn is_failure(&self) -> bool {
        matches!(self, DigestOutcome::Failed { .. })
    }
}

/// Summary of a hashing phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigestReport {
    pub hashed: usize,
    pub failed: usize,
    pub workers_gave_up: usize,
}

/// Hash every eligible record in place.
///
/// Every record goes on the queue; excluded ones are skipped by the worker that
/// picks them up. Failures are recorded on the record (digest left unset) and
/// never returned as errors.
pub async fn digest_all(
    records: &mut [FileRecord],
    workers: usize,
    max_worker_errors: usize,
) -> DigestReport {
    info!("Preparing to hash {} objects with {} workers", records.len(), workers);
    let started = Instant::now();

    let jobs: Vec<DigestJob> = records
        .iter()
        .enumerate()
        .map(|(index, record)| DigestJob {
            index,
            path: record.path.clone(),
            excluded: record.excluded,
        })
        .collect();

    let settings = PoolSettings {
        phase: "hash",
        workers,
        error_budget: max_worker_errors,
    };

    let pool_report = pool::run(settings, jobs, |job: DigestJob| async move {
        if job.excluded {
            return DigestOutcome::Skipped;
        }
        match digest_file(&job.path).await {
            Ok(digest) => DigestOutcome::Hashed {
                index: job.index,
                digest,
            },
            Err(e) => {
                error!("Failed to hash file {}: {}", job.path.display(), e);
                DigestOutcome::Failed { index: job.index }
            }
        }
    })
    .await;

    let mut report = DigestReport {
        workers_gave_up: pool_report.gave_up(),
        ..DigestReport::default()
    };

    for outcome in pool_report.into_outcomes() {
        match outcome {
            DigestOutcome::Skipped => {}
            DigestOutcome::Hashed { index, digest } => {
                records[index].digest = Some(digest);
                report.hashed += 1;
            }
            DigestOutcome::Failed { index } => {
                records[index].digest = None;
                report.failed += 1;
            }
        }
    }

    info!(
        "Hashing is complete: {} hashed, {} failed in {:?}",
        report.hashed,
        report.failed,
        started.elapsed()
    );
    report
}

/// Eligible records without a digest, whether hashing failed or never ran
pub fn count_hash_failures(records: &[FileRecord]) -> usize {
    records
        .iter()
        .filter(|r| !r.excluded && !r.digest_ok())
        .count()
}
