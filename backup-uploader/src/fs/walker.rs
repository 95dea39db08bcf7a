//! Directory traversal producing the run inventory.
//!
//! Every visited entry becomes a [`FileRecord`]. Excluded directories are
//! recorded but never descended into, so none of their descendants appear in
//! the inventory. Excluded files are recorded and their siblings are unaffected.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::exclusion::ExclusionRules;
use crate::utils::errors::{Result, UploaderError};

/// One filesystem entry visited during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Full path, platform-native separators
    pub path: PathBuf,

    /// Size in bytes
    pub size: u64,

    /// Is this a directory?
    pub is_dir: bool,

    /// Left out of the backup. Starts true and is only cleared for eligible files.
    pub excluded: bool,

    /// Base64 MD5 of the content, set once hashing succeeded
    pub digest: Option<String>,

    /// Confirmed stored in the object store
    pub transferred: bool,
}

impl FileRecord {
    /// A record in its initial state: excluded, not hashed, not stored
    pub fn new(path: impl Into<PathBuf>, size: u64, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            size,
            is_dir,
            excluded: true,
            digest: None,
            transferred: false,
        }
    }

    /// A file that is eligible for transfer with no digest or transfer state yet
    pub fn eligible(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            excluded: false,
            ..Self::new(path, size, false)
        }
    }

    /// True iff the digest was computed without error
    pub fn digest_ok(&self) -> bool {
        self.digest.is_some()
    }

    /// Eligible but not confirmed stored, for whatever reason
    pub fn is_failure(&self) -> bool {
        !self.excluded && !self.transferred
    }
}

/// What to do with an entry once the exclusion rules have been consulted
enum Visit {
    /// Record it and skip the whole subtree
    PruneDir,
    /// Record it as excluded and move on to the next sibling
    SkipFile,
    /// Record it and walk its children
    Descend,
    /// Record it as eligible
    Include,
}

/// Walk each base path in order and build the inventory.
///
/// Any error reported by the filesystem aborts the whole traversal.
pub fn build_inventory(
    base_paths: &[PathBuf],
    rules: &ExclusionRules,
    capacity: usize,
) -> Result<Vec<FileRecord>> {
    let mut records = Vec::with_capacity(capacity);

    for base in base_paths {
        tracing::info!("Beginning examination of top level path: {}", base.display());
        walk_base(base, rules, &mut records)?;
    }

    Ok(records)
}

fn walk_base(base: &Path, rules: &ExclusionRules, records: &mut Vec<FileRecord>) -> Result<()> {
    let mut walker = WalkDir::new(base)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|source| UploaderError::Traversal {
            base: base.to_path_buf(),
            source,
        })?;

        let (mut record, resolvable) =
            record_for(&entry).map_err(|source| UploaderError::Traversal {
                base: base.to_path_buf(),
                source,
            })?;

        // The rule check happens before the file/directory branch: it decides
        // between pruning a subtree and skipping a single file.
        let excluded =
            !resolvable || rules.should_exclude(&record.path, record.is_dir, entry.file_name());
        let visit = match (record.is_dir, excluded) {
            (true, true) => Visit::PruneDir,
            (false, true) => Visit::SkipFile,
            (true, false) => Visit::Descend,
            (false, false) => Visit::Include,
        };

        match visit {
            Visit::PruneDir => {
                records.push(record);
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
            }
            Visit::SkipFile | Visit::Descend => records.push(record),
            Visit::Include => {
                record.excluded = false;
                records.push(record);
            }
        }
    }

    Ok(())
}

/// Build the initial record for an entry. Symlinks are resolved to their target;
/// the flag is false for links that dangle or point at a directory, which are
/// never followed.
fn record_for(entry: &DirEntry) -> std::result::Result<(FileRecord, bool), walkdir::Error> {
    let metadata = entry.metadata()?;

    if !metadata.file_type().is_symlink() {
        return Ok((
            FileRecord::new(entry.path(), metadata.len(), metadata.is_dir()),
            true,
        ));
    }

    match std::fs::metadata(entry.path()) {
        Ok(target) if target.is_dir() => {
            tracing::debug!("Not following directory symlink: {}", entry.path().display());
            Ok((FileRecord::new(entry.path(), metadata.len(), true), false))
        }
        Ok(target) => Ok((FileRecord::new(entry.path(), target.len(), false), true)),
        Err(_) => {
            tracing::debug!("Broken symlink: {}", entry.path().display());
            Ok((FileRecord::new(entry.path(), metadata.len(), false), false))
        }
    }
}
