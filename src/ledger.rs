//! Completed-transfer ledgers
//!
//! A ledger is a plain text file with one row id per line. Files are only
//! ever appended to; the completed set is the union of every ledger in the
//! state directory whose name matches the configured pattern.

use chrono::{NaiveDate, Utc};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::inventory::RowId;

/// Default ledger filename pattern
pub const DEFAULT_LEDGER_PATTERN: &str = "completed*.txt";

/// Row ids that must never be reattempted or counted as remaining
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedSet {
    ids: BTreeSet<String>,
}

impl CompletedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every matching ledger in `dir`. The directory itself must exist.
    pub fn load<P: AsRef<Path>>(dir: P, pattern: &str) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::LedgerDirMissing(dir.display().to_string()));
        }

        let matcher = glob_to_regex(pattern)?;
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| matcher.is_match(n))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        let mut set = Self::new();
        for file in &files {
            let content = std::fs::read_to_string(file)?;
            let before = set.len();
            set.extend_lines(&content);
            debug!("Ledger {}: {} new ids", file.display(), set.len() - before);
        }

        info!(
            "Loaded {} completed row ids from {} ledger file(s) in {}",
            set.len(),
            files.len(),
            dir.display()
        );
        Ok(set)
    }

    fn extend_lines(&mut self, content: &str) {
        for line in content.lines() {
            let id = line.trim();
            if !id.is_empty() {
                self.ids.insert(id.to_string());
            }
        }
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.ids.contains(&id.to_string())
    }

    pub fn contains_str(&self, id: &str) -> bool {
        self.ids.contains(id.trim())
    }

    pub fn insert(&mut self, id: &RowId) -> bool {
        self.ids.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl FromIterator<RowId> for CompletedSet {
    fn from_iter<I: IntoIterator<Item = RowId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(|id| id.to_string()).collect(),
        }
    }
}

/// Translate a `*`/`?` filename glob into an anchored regex
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| Error::Config(format!("Invalid ledger pattern {}: {}", pattern, e)))
}

/// Appends newly completed row ids to a dated ledger file
pub struct LedgerWriter {
    dir: PathBuf,
}

impl LedgerWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::LedgerDirMissing(dir.display().to_string()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Ledger file for a given day: `completed_YYYYMMDD.txt`
    pub fn ledger_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("completed_{}.txt", date.format("%Y%m%d")))
    }

    /// Append ids not already in `completed`; returns how many were written.
    /// `completed` is updated so repeated calls stay idempotent.
    pub fn append(&self, completed: &mut CompletedSet, ids: &[RowId]) -> Result<usize> {
        self.append_on(Utc::now().date_naive(), completed, ids)
    }

    pub fn append_on(
        &self,
        date: NaiveDate,
        completed: &mut CompletedSet,
        ids: &[RowId],
    ) -> Result<usize> {
        let mut seen = BTreeSet::new();
        let fresh: Vec<&RowId> = ids
            .iter()
            .filter(|id| !completed.contains(id) && seen.insert(id.to_string()))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let path = self.ledger_path(date);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut buf = String::new();
        for id in &fresh {
            buf.push_str(&id.to_string());
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())?;
        file.sync_all()?;

        // Only ids that reached disk count as completed
        for id in &fresh {
            completed.insert(id);
        }

        info!("Appended {} row id(s) to {}", fresh.len(), path.display());
        Ok(fresh.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_union_of_ledgers() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("completed.txt"), "1|USDC|0\n\n  2|ETH|0  \n").unwrap();
        std::fs::write(dir.path().join("completed_20260101.txt"), "2|ETH|0\n3|BTC|0\n").unwrap();
        std::fs::write(dir.path().join("pending.txt"), "9|SOL|0\n").unwrap();
        std::fs::write(dir.path().join("completed.csv"), "8|SOL|0\n").unwrap();

        let set = CompletedSet::load(dir.path(), DEFAULT_LEDGER_PATTERN).unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains(&RowId::new("2", "ETH", "0")));
        assert!(!set.contains_str("9|SOL|0"));
        assert!(!set.contains_str("8|SOL|0"));
    }

    #[test]
    fn test_underscore_pattern() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("completed.txt"), "1|USDC|0\n").unwrap();
        std::fs::write(dir.path().join("completed_a.txt"), "2|USDC|0\n").unwrap();

        let set = CompletedSet::load(dir.path(), "completed_*.txt").unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains_str("2|USDC|0"));
    }

    #[test]
    fn test_empty_dir_is_ok() {
        let dir = tempdir().unwrap();
        let set = CompletedSet::load(dir.path(), DEFAULT_LEDGER_PATTERN).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_missing_dir_is_fatal() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = CompletedSet::load(&missing, DEFAULT_LEDGER_PATTERN).unwrap_err();
        assert!(matches!(err, Error::LedgerDirMissing(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_append_is_idempotent() {
        let dir = tempdir().unwrap();
        let writer = LedgerWriter::new(dir.path()).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let mut completed = CompletedSet::new();

        let ids = vec![RowId::new("1", "USDC", "0"), RowId::new("2", "ETH", "0")];
        assert_eq!(writer.append_on(date, &mut completed, &ids).unwrap(), 2);
        assert_eq!(writer.append_on(date, &mut completed, &ids).unwrap(), 0);

        let path = writer.ledger_path(date);
        assert!(path.ends_with("completed_20261017.txt"));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "1|USDC|0\n2|ETH|0\n");

        let reloaded = CompletedSet::load(dir.path(), DEFAULT_LEDGER_PATTERN).unwrap();
        assert_eq!(reloaded, completed);
    }

    #[test]
    fn test_append_dedupes_within_batch() {
        let dir = tempdir().unwrap();
        let writer = LedgerWriter::new(dir.path()).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let mut completed = CompletedSet::new();

        let ids = vec![RowId::new("1", "USDC", "0"), RowId::new("1", "USDC", "0")];
        assert_eq!(writer.append_on(date, &mut completed, &ids).unwrap(), 1);
        let content = std::fs::read_to_string(writer.ledger_path(date)).unwrap();
        assert_eq!(content, "1|USDC|0\n");
    }

    #[test]
    fn test_failed_append_leaves_set_unchanged() {
        let dir = tempdir().unwrap();
        let writer = LedgerWriter::new(dir.path()).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        // a directory where the ledger file should be makes the open fail
        std::fs::create_dir(writer.ledger_path(date)).unwrap();

        let mut completed = CompletedSet::new();
        let ids = vec![RowId::new("1", "USDC", "0")];
        assert!(writer.append_on(date, &mut completed, &ids).is_err());
        assert!(completed.is_empty());
        assert!(!completed.contains(&ids[0]));
    }
}
