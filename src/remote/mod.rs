//! Remote session primitives
//!
//! Every operation in this crate runs against a [`RemoteFs`], a thin set of
//! file-transfer primitives exposed by an already established session:
//!
//! | Primitive | Meaning |
//! |-----------|---------|
//! | `open` | open a file for reading |
//! | `stat` / `lstat` | metadata, following / not following symlinks |
//! | `read_dir` | entries of a directory |
//! | `mkdir` | create one directory level |
//! | `create` | create or truncate a file for writing |
//! | `remove_file` / `remove_dir` | unlink a file / an empty directory |
//! | `rename` | rename without overwrite |
//!
//! Two implementations ship with the crate: [`SftpSession`] over libssh2 and
//! [`MemoryFs`], an in-process tree used by tests and benchmarks.
//!
//! Paths are POSIX strings with `/` separators.

mod memory;
mod sftp;

pub use memory::*;
pub use sftp::*;

use crate::error::Result;
use std::io::{Read, Write};

/// File type bits mask
pub const S_IFMT: u32 = 0o170000;
/// Directory
pub const S_IFDIR: u32 = 0o040000;
/// Regular file
pub const S_IFREG: u32 = 0o100000;
/// Symbolic link
pub const S_IFLNK: u32 = 0o120000;

/// Metadata reported by the remote session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteStat {
    /// Size in bytes
    pub size: u64,
    /// Full mode: type bits plus permission bits
    pub perm: u32,
    /// Modification time (Unix timestamp)
    pub mtime: u64,
}

impl RemoteStat {
    /// Directory bit set
    pub fn is_dir(&self) -> bool {
        self.perm & S_IFMT == S_IFDIR
    }

    /// Regular-file bit set
    pub fn is_file(&self) -> bool {
        self.perm & S_IFMT == S_IFREG
    }

    /// Symbolic link
    pub fn is_symlink(&self) -> bool {
        self.perm & S_IFMT == S_IFLNK
    }

    /// `ls -l` style mode string, e.g. `drwxr-xr-x`
    pub fn mode_string(&self) -> String {
        let mode = self.perm;
        let mut s = String::with_capacity(10);

        s.push(match mode & S_IFMT {
            0o040000 => 'd',
            0o120000 => 'l',
            0o010000 => 'p',
            0o140000 => 's',
            0o060000 => 'b',
            0o020000 => 'c',
            _ => '-',
        });

        const BITS: [(u32, char); 9] = [
            (0o400, 'r'),
            (0o200, 'w'),
            (0o100, 'x'),
            (0o040, 'r'),
            (0o020, 'w'),
            (0o010, 'x'),
            (0o004, 'r'),
            (0o002, 'w'),
            (0o001, 'x'),
        ];
        for (bit, c) in BITS {
            s.push(if mode & bit != 0 { c } else { '-' });
        }

        s
    }
}

/// An open remote file. Dropping it releases the remote handle.
pub trait RemoteFile: Read + Send {
    /// Metadata of the open file
    fn stat(&mut self) -> Result<RemoteStat>;
}

/// File-transfer primitives of one remote session.
///
/// Implementations must tolerate concurrent use from several worker threads.
pub trait RemoteFs: Send + Sync {
    /// Open a file for reading
    fn open(&self, path: &str) -> Result<Box<dyn RemoteFile>>;

    /// Metadata, following symlinks
    fn stat(&self, path: &str) -> Result<RemoteStat>;

    /// Metadata of the entry itself
    fn lstat(&self, path: &str) -> Result<RemoteStat>;

    /// Directory entries as `(name, lstat)` pairs, without `.` and `..`
    fn read_dir(&self, path: &str) -> Result<Vec<(String, RemoteStat)>>;

    /// Create a single directory
    fn mkdir(&self, path: &str) -> Result<()>;

    /// Create or truncate a file and open it for writing
    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>>;

    /// Remove a file or symlink
    fn remove_file(&self, path: &str) -> Result<()>;

    /// Remove an empty directory
    fn remove_dir(&self, path: &str) -> Result<()>;

    /// Rename `old` to `new`
    fn rename(&self, old: &str, new: &str) -> Result<()>;
}

/// Join a directory and a name with exactly one separator
pub fn join_path(dir: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        return name.to_string();
    }
    if name.is_empty() {
        return dir.to_string();
    }
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Absolute form of `path` with empty and `.` segments dropped
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
        out.push('/');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Whether `path` is `dir` itself or lies below it
pub fn is_within(path: &str, dir: &str) -> bool {
    let path = normalize_path(path);
    let dir = normalize_path(dir);
    dir == "/" || path == dir || path.starts_with(&format!("{}/", dir))
}

/// Last path segment (`/usr/local/a.txt` -> `a.txt`)
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent directory, or `None` for the root and bare names
pub fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) if trimmed.len() > 1 => Some("/"),
        Some(0) => None,
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}
