//! Exclusion rules deciding which files and directories are left out of a backup.
//!
//! Directories whose name starts with `.` are always excluded. Every other
//! decision comes from the configured regexes, which are matched against the
//! full path (not only the file name) in rule-id order.

use regex::Regex;
use std::ffi::OsStr;
use std::path::Path;
use tracing::debug;

use crate::utils::errors::{Result, UploaderError};

/// A single compiled exclusion rule
#[derive(Debug, Clone)]
pub struct ExclusionRule {
    /// Rule id, increasing with the order the rules were declared in
    pub id: u32,

    /// Regex tested against the full path
    pub pattern: Regex,
}

/// Immutable rule set, safe to share between threads
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    rules: Vec<ExclusionRule>,
}

impl ExclusionRules {
    /// Compile patterns into rules numbered from 1 in the given order
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut rules = Self::default();
        for pattern in patterns {
            rules.push(pattern.as_ref())?;
        }
        Ok(rules)
    }

    /// Append rules read from a flat file, one regex per line. Blank lines are skipped.
    pub fn extend_from_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UploaderError::Config(format!(
                "unable to open exclusions file {}: {}",
                path.display(),
                e
            ))
        })?;

        for line in content.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            self.push(line)?;
        }

        Ok(())
    }

    fn push(&mut self, pattern: &str) -> Result<()> {
        let id = self.rules.last().map_or(1, |rule| rule.id + 1);
        let compiled = Regex::new(pattern).map_err(|source| UploaderError::InvalidRule {
            id,
            pattern: pattern.to_string(),
            source,
        })?;
        self.rules.push(ExclusionRule {
            id,
            pattern: compiled,
        });
        Ok(())
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Decide whether an entry is left out. First match wins:
    /// dot-directories, then each rule in id order.
    pub fn should_exclude(&self, path: &Path, is_dir: bool, name: &OsStr) -> bool {
        if is_dir && name.to_string_lossy().starts_with('.') {
            debug!("Hardcoded exclusion, directory begins with dot: {}", path.display());
            return true;
        }

        let full = path.to_string_lossy();
        if let Some(rule) = self.rules.iter().find(|rule| rule.pattern.is_match(&full)) {
            debug!(
                rule_id = rule.id,
                is_dir,
                "Rule exclusion: {}",
                path.display()
            );
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn check(rules: &ExclusionRules, path: &str, is_dir: bool) -> bool {
        let path = Path::new(path);
        let name = path.file_name().unwrap_or(path.as_os_str());
        rules.should_exclude(path, is_dir, name)
    }

    #[test]
    fn test_dot_directories_always_excluded() {
        let rules = ExclusionRules::default();
        assert!(check(&rules, "/data/.git", true));
        assert!(check(&rules, "/data/project/.cache", true));
    }

    #[test]
    fn test_dot_files_not_hardcoded() {
        let rules = ExclusionRules::default();
        assert!(!check(&rules, "/data/.bashrc", false));
        assert!(!check(&rules, "/data/notes.txt", false));
        assert!(!check(&rules, "/data/docs", true));
    }

    #[test]
    fn test_rules_match_full_path() {
        let rules = ExclusionRules::compile(&[r"\.tmp$", r"/build/"]).unwrap();
        assert!(check(&rules, "/data/cache.tmp", false));
        assert!(check(&rules, "/data/build/", true));
        assert!(check(&rules, "/data/build/out.o", false));
        assert!(!check(&rules, "/data/notes.txt", false));
        assert!(!check(&rules, "/data/tmp", true));
    }

    #[test]
    fn test_rule_ids_are_sequential() {
        let rules = ExclusionRules::compile(&["a", "b", "c"]).unwrap();
        let ids: Vec<u32> = rules.rules().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_invalid_rule_reports_id() {
        let err = ExclusionRules::compile(&["ok", "(unclosed"]).unwrap_err();
        match err {
            UploaderError::InvalidRule { id, pattern, .. } => {
                assert_eq!(id, 2);
                assert_eq!(pattern, "(unclosed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extend_from_file() -> std::io::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, r"\.iso$")?;
        writeln!(file)?;
        writeln!(file, r"(?i)thumbs\.db$")?;
        file.flush()?;

        let mut rules = ExclusionRules::compile(&[r"\.tmp$"]).unwrap();
        rules.extend_from_file(file.path()).unwrap();

        assert_eq!(rules.len(), 3);
        assert_eq!(rules.rules()[2].id, 3);
        assert!(check(&rules, r"E:\Misc\Thumbs.db", false));
        assert!(check(&rules, "/data/disk.iso", false));
        Ok(())
    }
}
