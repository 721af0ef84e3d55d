//! Directory listing and size totals
//!
//! Normalizes remote metadata into [`DirEntry`] records with a deterministic
//! order, and walks subtrees to total their size.

use crate::error::{HostFilesError, Result};
use crate::remote::{join_path, RemoteFs, RemoteStat};
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Normalized entry type
///
/// Only directories and regular files are recognized. Every other mode
/// (symlinks, devices, fifos, sockets) is reported as `Dir`, so callers must
/// treat directory entries conservatively. `Link` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    #[serde(rename = "-")]
    File,
    #[serde(rename = "d")]
    Dir,
    #[serde(rename = "l")]
    Link,
}

impl EntryType {
    /// Classify remote mode bits
    pub fn from_stat(stat: &RemoteStat) -> Self {
        if stat.is_dir() {
            Self::Dir
        } else if stat.is_file() {
            Self::File
        } else {
            Self::Dir
        }
    }

    /// Single-character type code
    pub fn code(&self) -> &'static str {
        match self {
            Self::File => "-",
            Self::Dir => "d",
            Self::Link => "l",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Dir => 0,
            Self::Link => 1,
            Self::File => 2,
        }
    }
}

/// Snapshot of one remote directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name
    pub name: String,
    /// Listed directory path plus name
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Normalized type
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// `ls -l` style mode string
    pub mode: String,
    /// Modification time, `YYYY-MM-DD HH:MM:SS` local time
    pub modified: String,
}

impl DirEntry {
    fn from_stat(name: String, path: String, stat: &RemoteStat) -> Self {
        Self {
            name,
            path,
            size: stat.size,
            entry_type: EntryType::from_stat(stat),
            mode: stat.mode_string(),
            modified: format_mtime(stat.mtime),
        }
    }

    fn sort_key(&self) -> (u8, &str) {
        (self.entry_type.rank(), self.name.as_str())
    }
}

impl Ord for DirEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialOrd for DirEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Format a Unix timestamp as `YYYY-MM-DD HH:MM:SS` in local time
pub fn format_mtime(ts: u64) -> String {
    Local
        .timestamp_opt(ts.min(i64::MAX as u64) as i64, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// List a remote directory.
///
/// Directories sort before files, then entries sort by name, so an unchanged
/// directory always lists identically. The listing is all or nothing.
pub fn list_dir(fs: &dyn RemoteFs, path: &str) -> Result<Vec<DirEntry>> {
    let dir = if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    };

    let mut entries: Vec<DirEntry> = fs
        .read_dir(&dir)?
        .into_iter()
        .map(|(name, stat)| {
            let entry_path = format!("{}{}", dir, name);
            DirEntry::from_stat(name, entry_path, &stat)
        })
        .collect();

    entries.sort();
    Ok(entries)
}

/// Metadata of a single path
pub fn stat(fs: &dyn RemoteFs, path: &str) -> Result<DirEntry> {
    let stat = fs.lstat(path)?;
    let name = crate::remote::file_name(path.trim_end_matches('/')).to_string();
    Ok(DirEntry::from_stat(name, path.to_string(), &stat))
}

/// Total size of regular files (and the links themselves) beneath `path`.
///
/// Symlinks are never followed. Directories that disappear while the walk is
/// in progress are skipped.
pub fn dir_size(fs: &dyn RemoteFs, path: &str) -> Result<u64> {
    let root = fs.lstat(path)?;
    if !root.is_dir() {
        return Ok(root.size);
    }

    let mut total = 0u64;
    let mut pending = vec![path.to_string()];

    while let Some(dir) = pending.pop() {
        let entries = match fs.read_dir(&dir) {
            Ok(entries) => entries,
            Err(HostFilesError::NotFound(_)) if dir != path => {
                tracing::debug!("Skipping {} (removed during size walk)", dir);
                continue;
            }
            Err(e) => return Err(e),
        };

        for (name, stat) in entries {
            if stat.is_dir() {
                pending.push(join_path(&dir, &name));
            } else if stat.is_file() || stat.is_symlink() {
                total += stat.size;
            }
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryFs;

    fn sample_tree() -> MemoryFs {
        let fs = MemoryFs::new();
        fs.add_file("/data/b.txt", vec![0u8; 20]);
        fs.add_file("/data/a.txt", vec![0u8; 10]);
        fs.add_dir("/data/zeta");
        fs.add_dir("/data/alpha");
        fs.add_file("/data/alpha/inner.bin", vec![0u8; 300]);
        fs.add_symlink("/data/link", "/data/a.txt");
        fs
    }

    #[test]
    fn test_list_dir_order_and_paths() {
        let fs = sample_tree();
        let entries = list_dir(&fs, "/data").unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();

        // the symlink falls back to a directory
        assert_eq!(names, vec!["alpha", "link", "zeta", "a.txt", "b.txt"]);
        assert_eq!(entries[0].path, "/data/alpha");
        assert_eq!(entries[3].path, "/data/a.txt");
        assert_eq!(entries[3].entry_type, EntryType::File);
        assert_eq!(entries[1].entry_type, EntryType::Dir);
        assert_eq!(entries[3].mode, "-rw-r--r--");
    }

    #[test]
    fn test_list_dir_is_deterministic() {
        let fs = sample_tree();
        let first = list_dir(&fs, "/data/").unwrap();
        for _ in 0..5 {
            assert_eq!(list_dir(&fs, "/data").unwrap(), first);
        }
    }

    #[test]
    fn test_list_dir_missing_and_not_dir() {
        let fs = sample_tree();
        assert!(list_dir(&fs, "/nope").unwrap_err().is_not_found());
        assert!(list_dir(&fs, "/data/a.txt").is_err());
    }

    #[test]
    fn test_entry_type_never_produces_link() {
        let link = RemoteStat { size: 1, perm: 0o120777, mtime: 0 };
        let device = RemoteStat { size: 0, perm: 0o020644, mtime: 0 };
        assert_eq!(EntryType::from_stat(&link), EntryType::Dir);
        assert_eq!(EntryType::from_stat(&device), EntryType::Dir);
        assert_eq!(EntryType::Dir.code(), "d");
        assert_eq!(serde_json::to_string(&EntryType::File).unwrap(), "\"-\"");
    }

    #[test]
    fn test_dir_size_counts_files_and_links() {
        let fs = sample_tree();
        // 10 + 20 + 300 + len("/data/a.txt")
        assert_eq!(dir_size(&fs, "/data").unwrap(), 330 + 11);
        assert_eq!(dir_size(&fs, "/data/alpha/inner.bin").unwrap(), 300);
    }

    #[test]
    fn test_dir_size_skips_vanished_directories() {
        let fs = sample_tree();
        fs.vanish_after_listing("/data/alpha");
        assert_eq!(dir_size(&fs, "/data").unwrap(), 30 + 11);
        assert!(dir_size(&fs, "/missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_stat_single_path() {
        let fs = sample_tree();
        let entry = stat(&fs, "/data/alpha/inner.bin").unwrap();
        assert_eq!(entry.name, "inner.bin");
        assert_eq!(entry.size, 300);
        assert!(!entry.modified.is_empty());
    }
}
