//! Run statistics and human-readable formatting.

use std::time::Duration;
use tracing::info;

use super::digest::count_hash_failures;
use crate::fs::FileRecord;

/// Totals over the inventory after traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventoryStats {
    pub eligible_files: usize,
    pub eligible_bytes: u64,
    pub excluded_entries: usize,
    pub excluded_bytes: u64,
}

impl InventoryStats {
    pub fn collect(records: &[FileRecord]) -> Self {
        records.iter().fold(Self::default(), |mut stats, record| {
            if record.excluded {
                stats.excluded_entries += 1;
                stats.excluded_bytes += record.size;
            } else if !record.is_dir {
                stats.eligible_files += 1;
                stats.eligible_bytes += record.size;
            }
            stats
        })
    }

    pub fn log(&self) {
        info!(
            "Files to process: {} ({})",
            self.eligible_files,
            format_bytes(self.eligible_bytes)
        );
        info!(
            "Excluded entries: {} ({})",
            self.excluded_entries,
            format_bytes(self.excluded_bytes)
        );
    }
}

/// Totals after the storing phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub stored_files: usize,
    pub stored_bytes: u64,
    pub hash_failures: usize,
    pub failed_files: usize,
}

impl StorageStats {
    pub fn collect(records: &[FileRecord]) -> Self {
        let mut stats = Self {
            hash_failures: count_hash_failures(records),
            ..Self::default()
        };
        for record in records {
            if record.transferred {
                stats.stored_files += 1;
                stats.stored_bytes += record.size;
            } else if record.is_failure() {
                stats.failed_files += 1;
            }
        }
        stats
    }

    pub fn log(&self) {
        info!(
            "Stored {} files ({})",
            self.stored_files,
            format_bytes(self.stored_bytes)
        );
        info!(
            "Failed files: {} ({} could not be hashed)",
            self.failed_files, self.hash_failures
        );
    }
}

pub fn log_phase(phase: &str, elapsed: Duration) {
    info!("{} took {}", phase, format_duration(elapsed));
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

pub fn format_duration(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    if seconds < 60 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(path: &str, size: u64) -> FileRecord {
        FileRecord {
            digest: Some("x=".into()),
            transferred: true,
            ..FileRecord::eligible(path, size)
        }
    }

    #[test]
    fn test_inventory_totals() {
        let records = vec![
            // directories do not count as files
            FileRecord {
                is_dir: true,
                ..FileRecord::eligible("/data", 0)
            },
            FileRecord::eligible("/data/a", 100),
            FileRecord::eligible("/data/b", 50),
            FileRecord::new("/data/c.tmp", 7, false),
        ];

        let stats = InventoryStats::collect(&records);
        assert_eq!(stats.eligible_files, 2);
        assert_eq!(stats.eligible_bytes, 150);
        assert_eq!(stats.excluded_entries, 1);
        assert_eq!(stats.excluded_bytes, 7);
    }

    #[test]
    fn test_storage_totals() {
        let records = vec![
            stored("/data/a", 10),
            stored("/data/b", 20),
            FileRecord::eligible("/data/unhashed", 5),
            FileRecord {
                digest: Some("y=".into()),
                ..FileRecord::eligible("/data/put-failed", 5)
            },
            FileRecord::new("/data/.git", 0, true),
        ];

        let stats = StorageStats::collect(&records);
        assert_eq!(stats.stored_files, 2);
        assert_eq!(stats.stored_bytes, 30);
        assert_eq!(stats.failed_files, 2);
        assert_eq!(stats.hash_failures, 1);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1_572_864), "1.50 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m");
    }
}
