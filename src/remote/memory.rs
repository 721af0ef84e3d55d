//! In-memory remote filesystem
//!
//! A [`RemoteFs`] backed by a map of paths. Used by tests, benchmarks and
//! dry runs. Every primitive call is recorded so callers can assert exactly
//! which remote operations happened, and faults can be injected per path.

use super::{normalize_path, parent_dir, RemoteFile, RemoteFs, RemoteStat, S_IFDIR, S_IFLNK, S_IFREG};
use crate::error::{HostFilesError, Result};
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// One recorded primitive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsCall {
    Open(String),
    Stat(String),
    Lstat(String),
    ReadDir(String),
    Mkdir(String),
    Create(String),
    RemoveFile(String),
    RemoveDir(String),
    Rename(String, String),
}

impl FsCall {
    /// Whether this call changes remote state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Mkdir(_) | Self::Create(_) | Self::RemoveFile(_) | Self::RemoveDir(_) | Self::Rename(..)
        )
    }
}

#[derive(Debug, Clone)]
enum Node {
    File { data: Arc<Vec<u8>>, mtime: u64 },
    Dir { mtime: u64 },
    Symlink { target: String, mtime: u64 },
}

impl Node {
    fn stat(&self) -> RemoteStat {
        match self {
            Node::File { data, mtime } => RemoteStat {
                size: data.len() as u64,
                perm: S_IFREG | 0o644,
                mtime: *mtime,
            },
            Node::Dir { mtime } => RemoteStat {
                size: 4096,
                perm: S_IFDIR | 0o755,
                mtime: *mtime,
            },
            Node::Symlink { target, mtime } => RemoteStat {
                size: target.len() as u64,
                perm: S_IFLNK | 0o777,
                mtime: *mtime,
            },
        }
    }
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    calls: Vec<FsCall>,
    failing: HashSet<String>,
    vanishing: HashSet<String>,
}

/// In-memory remote filesystem
#[derive(Debug, Clone)]
pub struct MemoryFs {
    state: Arc<Mutex<State>>,
    mtime: u64,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

fn child_of(dir: &str, candidate: &str) -> bool {
    match parent_dir(candidate) {
        Some(parent) => parent == dir,
        None => false,
    }
}

impl MemoryFs {
    /// Create an empty filesystem containing only `/`
    pub fn new() -> Self {
        let mtime = chrono::Utc::now().timestamp().max(0) as u64;
        let mut state = State::default();
        state.nodes.insert("/".to_string(), Node::Dir { mtime });
        Self {
            state: Arc::new(Mutex::new(state)),
            mtime,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a directory and any missing parents (not recorded)
    pub fn add_dir(&self, path: &str) {
        let path = normalize_path(path);
        let mut state = self.lock();
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            state
                .nodes
                .entry(current.clone())
                .or_insert(Node::Dir { mtime: self.mtime });
        }
    }

    /// Add a file with content, creating parents (not recorded)
    pub fn add_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        let path = normalize_path(path);
        if let Some(parent) = parent_dir(&path) {
            self.add_dir(parent);
        }
        self.lock().nodes.insert(
            path,
            Node::File {
                data: Arc::new(data.into()),
                mtime: self.mtime,
            },
        );
    }

    /// Add a symbolic link, creating parents (not recorded)
    pub fn add_symlink(&self, path: &str, target: &str) {
        let path = normalize_path(path);
        if let Some(parent) = parent_dir(&path) {
            self.add_dir(parent);
        }
        self.lock().nodes.insert(
            path,
            Node::Symlink {
                target: target.to_string(),
                mtime: self.mtime,
            },
        );
    }

    /// Make every primitive touching `path` fail with a remote I/O error
    pub fn fail_path(&self, path: &str) {
        self.lock().failing.insert(normalize_path(path));
    }

    /// Remove `path` right after its parent directory is listed
    pub fn vanish_after_listing(&self, path: &str) {
        self.lock().vanishing.insert(normalize_path(path));
    }

    /// Content of a file, if present
    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().nodes.get(&normalize_path(path)) {
            Some(Node::File { data, .. }) => Some(data.as_ref().clone()),
            _ => None,
        }
    }

    /// Whether any entry exists at `path`
    pub fn exists(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(&normalize_path(path))
    }

    /// Whether `path` is a directory
    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.lock().nodes.get(&normalize_path(path)), Some(Node::Dir { .. }))
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<FsCall> {
        self.lock().calls.clone()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of `mkdir` calls recorded for `path`
    pub fn mkdir_count(&self, path: &str) -> usize {
        let path = normalize_path(path);
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, FsCall::Mkdir(p) if *p == path))
            .count()
    }

    /// Paths passed to `create`, in call order
    pub fn created_files(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                FsCall::Create(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    fn begin(
        &self,
        call: impl FnOnce(String) -> FsCall,
        path: &str,
    ) -> Result<(MutexGuard<'_, State>, String)> {
        let path = normalize_path(path);
        let mut state = self.lock();
        state.calls.push(call(path.clone()));
        if state.failing.contains(&path) {
            return Err(HostFilesError::remote(&path, "injected failure"));
        }
        Ok((state, path))
    }

    fn require_dir(state: &State, path: &str) -> Result<()> {
        match state.nodes.get(path) {
            Some(Node::Dir { .. }) => Ok(()),
            Some(_) => Err(HostFilesError::remote(path, "not a directory")),
            None => Err(HostFilesError::NotFound(path.to_string())),
        }
    }

    fn resolve<'a>(state: &'a State, path: &str) -> Result<&'a Node> {
        let mut node = state
            .nodes
            .get(path)
            .ok_or_else(|| HostFilesError::NotFound(path.to_string()))?;
        let mut hops = 0;
        while let Node::Symlink { target, .. } = node {
            hops += 1;
            if hops > 8 {
                return Err(HostFilesError::remote(path, "too many levels of symbolic links"));
            }
            node = state
                .nodes
                .get(&normalize_path(target))
                .ok_or_else(|| HostFilesError::NotFound(path.to_string()))?;
        }
        Ok(node)
    }
}

/// Reader over a snapshot of a file's content
struct MemoryFile {
    data: Arc<Vec<u8>>,
    pos: usize,
    stat: RemoteStat,
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.data[self.pos.min(self.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl RemoteFile for MemoryFile {
    fn stat(&mut self) -> Result<RemoteStat> {
        Ok(self.stat)
    }
}

/// Writer appending to a file node
struct MemoryWriter {
    fs: MemoryFs,
    path: String,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.fs.lock();
        if state.failing.contains(&self.path) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected failure"));
        }
        match state.nodes.get_mut(&self.path) {
            Some(Node::File { data, .. }) => {
                Arc::make_mut(data).extend_from_slice(buf);
                Ok(buf.len())
            }
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "file removed while writing",
            )),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl RemoteFs for MemoryFs {
    fn open(&self, path: &str) -> Result<Box<dyn RemoteFile>> {
        let (state, path) = self.begin(FsCall::Open, path)?;
        let node = Self::resolve(&state, &path)?;
        match node {
            Node::File { data, .. } => Ok(Box::new(MemoryFile {
                data: Arc::clone(data),
                pos: 0,
                stat: node.stat(),
            })),
            _ => Err(HostFilesError::remote(&path, "not a regular file")),
        }
    }

    fn stat(&self, path: &str) -> Result<RemoteStat> {
        let (state, path) = self.begin(FsCall::Stat, path)?;
        Self::resolve(&state, &path).map(Node::stat)
    }

    fn lstat(&self, path: &str) -> Result<RemoteStat> {
        let (state, path) = self.begin(FsCall::Lstat, path)?;
        state
            .nodes
            .get(&path)
            .map(Node::stat)
            .ok_or(HostFilesError::NotFound(path))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<(String, RemoteStat)>> {
        let (mut state, path) = self.begin(FsCall::ReadDir, path)?;
        Self::require_dir(&state, &path)?;

        let entries: Vec<(String, String, RemoteStat)> = state
            .nodes
            .iter()
            .filter(|(p, _)| child_of(&path, p))
            .map(|(p, node)| (p.clone(), super::file_name(p).to_string(), node.stat()))
            .collect();

        let vanishing: Vec<String> = entries
            .iter()
            .filter(|(p, _, _)| state.vanishing.contains(p))
            .map(|(p, _, _)| p.clone())
            .collect();
        for gone in vanishing {
            state.nodes.retain(|p, _| p != &gone && !p.starts_with(&format!("{}/", gone)));
        }

        Ok(entries.into_iter().map(|(_, name, stat)| (name, stat)).collect())
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let (mut state, path) = self.begin(FsCall::Mkdir, path)?;
        if state.nodes.contains_key(&path) {
            return Err(HostFilesError::remote(&path, "file already exists"));
        }
        let parent = parent_dir(&path).unwrap_or("/");
        Self::require_dir(&state, parent)?;
        state.nodes.insert(path, Node::Dir { mtime: self.mtime });
        Ok(())
    }

    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>> {
        let (mut state, path) = self.begin(FsCall::Create, path)?;
        if let Some(Node::Dir { .. }) = state.nodes.get(&path) {
            return Err(HostFilesError::remote(&path, "is a directory"));
        }
        let parent = parent_dir(&path).unwrap_or("/");
        Self::require_dir(&state, parent)?;
        state.nodes.insert(
            path.clone(),
            Node::File {
                data: Arc::new(Vec::new()),
                mtime: self.mtime,
            },
        );
        Ok(Box::new(MemoryWriter {
            fs: self.clone(),
            path,
        }))
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let (mut state, path) = self.begin(FsCall::RemoveFile, path)?;
        let is_dir = match state.nodes.get(&path) {
            Some(node) => matches!(node, Node::Dir { .. }),
            None => return Err(HostFilesError::NotFound(path)),
        };
        if is_dir {
            return Err(HostFilesError::remote(&path, "is a directory"));
        }
        state.nodes.remove(&path);
        Ok(())
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        let (mut state, path) = self.begin(FsCall::RemoveDir, path)?;
        Self::require_dir(&state, &path)?;
        if path == "/" {
            return Err(HostFilesError::remote(&path, "cannot remove root"));
        }
        if state.nodes.keys().any(|p| child_of(&path, p)) {
            return Err(HostFilesError::remote(&path, "directory not empty"));
        }
        state.nodes.remove(&path);
        Ok(())
    }

    fn rename(&self, old: &str, new: &str) -> Result<()> {
        let (mut state, old) = self.begin(|p| FsCall::Rename(p, normalize_path(new)), old)?;
        let new = normalize_path(new);
        if state.failing.contains(&new) {
            return Err(HostFilesError::remote(&new, "injected failure"));
        }
        if !state.nodes.contains_key(&old) {
            return Err(HostFilesError::NotFound(old));
        }
        if state.nodes.contains_key(&new) {
            return Err(HostFilesError::remote(&new, "file already exists"));
        }
        if new.starts_with(&format!("{}/", old)) {
            return Err(HostFilesError::remote(&new, "cannot move a directory into itself"));
        }
        Self::require_dir(&state, parent_dir(&new).unwrap_or("/"))?;

        let prefix = format!("{}/", old);
        let moved: Vec<String> = state
            .nodes
            .keys()
            .filter(|p| **p == old || p.starts_with(&prefix))
            .cloned()
            .collect();
        for path in moved {
            if let Some(node) = state.nodes.remove(&path) {
                let renamed = format!("{}{}", new, &path[old.len()..]);
                state.nodes.insert(renamed, node);
            }
        }
        Ok(())
    }
}
