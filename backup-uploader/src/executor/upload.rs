//! Storing hashed files in the object store.
//!
//! Only eligible records with a digest are queued. Each put is retried with an
//! exponential backoff of `2^n` seconds after the n-th failure, no jitter and
//! no cap, until it succeeds or the attempt limit is reached.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::pool::{self, Outcome, PoolSettings};
use crate::fs::FileRecord;
use crate::store::{to_storage_key, ObjectBody, ObjectStore, StoreError};

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("failed to open file: {0}")]
    Open(#[source] std::io::Error),

    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

/// Delay before the attempt that follows the `failures`-th failure
pub fn backoff(failures: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(failures))
}

/// Settings for one storing phase
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub bucket: String,
    pub workers: usize,
    pub max_worker_errors: usize,
    pub max_attempts: u32,
}

/// One queued upload
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub index: usize,
    pub path: PathBuf,
    pub size: u64,
    pub digest: String,
}

struct UploadOutcome {
    index: usize,
    stored: bool,
}

impl Outcome for UploadOutcome {
    fn is_failure(&self) -> bool {
        !self.stored
    }
}

/// Summary of a storing phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub queued: usize,
    pub stored: usize,
    pub failed: usize,
    pub workers_gave_up: usize,
}

/// Upload one file, retrying failed puts. Returns the number of attempts used.
///
/// The file is reopened for every retry because the previous body was consumed.
/// Failing to open it at all is not retried.
pub async fn put_with_retry(
    store: &dyn ObjectStore,
    bucket: &str,
    job: &UploadJob,
    max_attempts: u32,
) -> Result<u32, TransferError> {
    let max_attempts = max_attempts.max(1);
    let key = to_storage_key(&job.path);
    let mut body = open_body(job).await.map_err(TransferError::Open)?;
    let mut failures = 0u32;

    loop {
        match store.put_object(bucket, &key, body, &job.digest).await {
            Ok(()) => return Ok(failures + 1),
            Err(e) => {
                failures += 1;
                debug!(
                    "putObject attempt failed for {} (failure {}): {}",
                    job.path.display(),
                    failures,
                    e
                );
                if failures >= max_attempts {
                    return Err(TransferError::Exhausted {
                        attempts: failures,
                        source: e,
                    });
                }
            }
        }

        tokio::time::sleep(backoff(failures)).await;
        body = open_body(job).await.map_err(TransferError::Open)?;
    }
}

/// Open the file with its current length, which may differ from the size seen
/// during traversal.
async fn open_body(job: &UploadJob) -> std::io::Result<ObjectBody> {
    let file = tokio::fs::File::open(&job.path).await?;
    let len = file.metadata().await?.len();
    if len != job.size {
        debug!(
            "{} changed size since traversal ({} -> {} bytes)",
            job.path.display(),
            job.size,
            len
        );
    }
    Ok(ObjectBody::new(file, len))
}

/// Store every eligible, hashed record and set `transferred` in place.
///
/// Records that failed hashing are never attempted and stay not transferred,
/// so they are reported with the storage failures.
pub async fn transfer_all(
    records: &mut [FileRecord],
    settings: &TransferSettings,
    store: Arc<dyn ObjectStore>,
) -> TransferReport {
    let jobs: Vec<UploadJob> = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            if record.excluded {
                return None;
            }
            match &record.digest {
                Some(digest) => Some(UploadJob {
                    index,
                    path: record.path.clone(),
                    size: record.size,
                    digest: digest.clone(),
                }),
                None => {
                    info!("Skipping un-hashed file: {}", record.path.display());
                    None
                }
            }
        })
        .collect();

    info!(
        "Preparing to store {} objects with {} workers",
        jobs.len(),
        settings.workers
    );
    let started = Instant::now();
    let queued = jobs.len();

    let pool_settings = PoolSettings {
        phase: "store",
        workers: settings.workers,
        error_budget: settings.max_worker_errors,
    };
    let bucket: Arc<str> = Arc::from(settings.bucket.as_str());
    let max_attempts = settings.max_attempts;

    let pool_report = pool::run(pool_settings, jobs, move |job: UploadJob| {
        let store = Arc::clone(&store);
        let bucket = Arc::clone(&bucket);
        async move {
            match put_with_retry(store.as_ref(), &bucket, &job, max_attempts).await {
                Ok(attempts) => {
                    debug!("Stored {} after {} attempt(s)", job.path.display(), attempts);
                    UploadOutcome {
                        index: job.index,
                        stored: true,
                    }
                }
                Err(e) => {
                    error!("Failed to store file {}: {}", job.path.display(), e);
                    UploadOutcome {
                        index: job.index,
                        stored: false,
                    }
                }
            }
        }
    })
    .await;

    if pool_report.crashed > 0 {
        warn!("{} storage workers crashed", pool_report.crashed);
    }

    let mut report = TransferReport {
        queued,
        workers_gave_up: pool_report.gave_up(),
        ..TransferReport::default()
    };

    for outcome in pool_report.into_outcomes() {
        records[outcome.index].transferred = outcome.stored;
        if outcome.stored {
            report.stored += 1;
        } else {
            report.failed += 1;
        }
    }

    info!(
        "Storing is complete: {} stored, {} failed in {:?}",
        report.stored,
        report.failed,
        started.elapsed()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::digest::digest_bytes;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::time::Instant as TokioInstant;

    /// Fails the first `failures` puts, then accepts everything
    struct FlakyStore {
        failures: usize,
        attempts: Mutex<Vec<TokioInstant>>,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempt_times(&self) -> Vec<TokioInstant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn create_container(&self, _name: &str, _region: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn list_containers(&self) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }

        async fn put_object(
            &self,
            _container: &str,
            _key: &str,
            _body: ObjectBody,
            _content_digest: &str,
        ) -> Result<(), StoreError> {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(TokioInstant::now());
            if attempts.len() <= self.failures {
                Err(StoreError::Other("simulated outage".into()))
            } else {
                Ok(())
            }
        }
    }

    fn job_for(dir: &TempDir, name: &str, content: &[u8]) -> std::io::Result<UploadJob> {
        let path = dir.path().join(name);
        fs::write(&path, content)?;
        Ok(UploadJob {
            index: 0,
            path,
            size: content.len() as u64,
            digest: digest_bytes(content),
        })
    }

    fn gaps(times: &[TokioInstant]) -> Vec<Duration> {
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(2), Duration::from_secs(4));
        assert_eq!(backoff(5), Duration::from_secs(32));
        assert_eq!(backoff(200), Duration::from_secs(u64::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let job = job_for(&dir, "a.txt", b"abc")?;
        let store = FlakyStore::new(3);

        let attempts = put_with_retry(&store, "bucket", &job, 5).await.unwrap();

        assert_eq!(attempts, 4);
        assert_eq!(
            gaps(&store.attempt_times()),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let job = job_for(&dir, "a.txt", b"abc")?;
        let store = FlakyStore::new(10);

        let err = put_with_retry(&store, "bucket", &job, 3).await.unwrap_err();

        assert!(matches!(err, TransferError::Exhausted { attempts: 3, .. }));
        let times = store.attempt_times();
        assert_eq!(times.len(), 3);
        assert_eq!(
            gaps(&times),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let job = job_for(&dir, "a.txt", b"abc")?;
        let store = FlakyStore::new(10);

        assert!(put_with_retry(&store, "bucket", &job, 0).await.is_err());
        assert_eq!(store.attempt_times().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_open_failure_not_retried() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let job = UploadJob {
            index: 0,
            path: dir.path().join("missing"),
            size: 0,
            digest: digest_bytes(b""),
        };
        let store = FlakyStore::new(0);

        let err = put_with_retry(&store, "bucket", &job, 4).await.unwrap_err();
        assert!(matches!(err, TransferError::Open(_)));
        assert!(store.attempt_times().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_body_length_follows_current_file() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let mut job = job_for(&dir, "grown.txt", b"hello world")?;
        // size recorded before the file grew
        job.size = 5;
        let store = MemoryStore::with_containers(["bucket"]);

        let attempts = put_with_retry(&store, "bucket", &job, 1).await.unwrap();

        assert_eq!(attempts, 1);
        assert_eq!(
            store.object("bucket", &to_storage_key(&job.path)).unwrap(),
            b"hello world"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_transfer_all_marks_records() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let stored = job_for(&dir, "stored.txt", b"payload")?;

        let mut records = vec![
            FileRecord::new(dir.path(), 0, true),
            FileRecord {
                digest: Some(stored.digest.clone()),
                ..FileRecord::eligible(&stored.path, stored.size)
            },
            // hashing failed, must never reach the store
            FileRecord::eligible(dir.path().join("unhashed.txt"), 3),
            FileRecord {
                digest: Some(digest_bytes(b"x")),
                ..FileRecord::new(dir.path().join("excluded.tmp"), 1, false)
            },
        ];

        let store = Arc::new(MemoryStore::with_containers(["bucket"]));
        let settings = TransferSettings {
            bucket: "bucket".to_string(),
            workers: 2,
            max_worker_errors: 5,
            max_attempts: 2,
        };

        let report = transfer_all(&mut records, &settings, store.clone()).await;

        assert_eq!(report.queued, 1);
        assert_eq!(report.stored, 1);
        assert!(records[1].transferred);
        assert!(!records[2].transferred);
        assert!(!records[3].transferred);
        assert_eq!(store.keys("bucket"), vec![to_storage_key(&stored.path)]);
        assert_eq!(
            store.object("bucket", &to_storage_key(&stored.path)).unwrap(),
            b"payload"
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_transfer_all_failure_is_not_fatal() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let job = job_for(&dir, "a.txt", b"abc")?;
        let mut records = vec![FileRecord {
            digest: Some(job.digest.clone()),
            ..FileRecord::eligible(&job.path, job.size)
        }];

        // bucket was never created, every put fails
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let settings = TransferSettings {
            bucket: "bucket".to_string(),
            workers: 1,
            max_worker_errors: 0,
            max_attempts: 2,
        };

        let report = transfer_all(&mut records, &settings, store).await;

        assert_eq!(report.failed, 1);
        assert!(!records[0].transferred);
        Ok(())
    }
}
