//! Upload items, folder plans and chunk partitioning

use crate::config::TransferLimits;
use crate::error::{HostFilesError, IoResultExt, Result, SizeLimit};
use crate::remote::join_path;
use std::collections::HashSet;
use std::fmt;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Where an item's bytes come from
enum ItemContent {
    Reader(Box<dyn Read + Send>),
    Local(PathBuf),
}

/// One file of an upload
pub struct UploadItem {
    /// Directory relative to the plan's base path; empty means the base
    pub relative_dir: String,
    /// File name
    pub filename: String,
    /// Declared size in bytes
    pub size: u64,
    content: ItemContent,
}

impl fmt::Debug for UploadItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadItem")
            .field("relative_dir", &self.relative_dir)
            .field("filename", &self.filename)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Collapse separators and `.` segments: `/a//./b/` -> `a/b`
fn normalize_relative(dir: &str) -> String {
    dir.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

impl UploadItem {
    /// Item streaming from an arbitrary reader
    pub fn new(
        relative_dir: impl AsRef<str>,
        filename: impl Into<String>,
        size: u64,
        content: impl Read + Send + 'static,
    ) -> Self {
        Self {
            relative_dir: normalize_relative(relative_dir.as_ref()),
            filename: filename.into(),
            size,
            content: ItemContent::Reader(Box::new(content)),
        }
    }

    /// Item backed by an in-memory buffer
    pub fn from_bytes(
        relative_dir: impl AsRef<str>,
        filename: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self::new(relative_dir, filename, size, Cursor::new(data))
    }

    /// Item backed by a local file, opened only when it is uploaded
    pub fn from_local(
        relative_dir: impl AsRef<str>,
        filename: impl Into<String>,
        size: u64,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            relative_dir: normalize_relative(relative_dir.as_ref()),
            filename: filename.into(),
            size,
            content: ItemContent::Local(path.into()),
        }
    }

    /// Remote directory this item is written into
    pub fn target_dir(&self, base_path: &str) -> String {
        if self.relative_dir.is_empty() {
            base_path.to_string()
        } else {
            join_path(base_path, &self.relative_dir)
        }
    }

    /// Full remote path of this item
    pub fn target_path(&self, base_path: &str) -> String {
        join_path(&self.target_dir(base_path), &self.filename)
    }

    /// Open the content stream
    pub fn into_reader(self) -> Result<Box<dyn Read + Send>> {
        match self.content {
            ItemContent::Reader(reader) => Ok(reader),
            ItemContent::Local(path) => {
                let file = std::fs::File::open(&path).local_path(path.display().to_string())?;
                Ok(Box::new(file))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.filename.is_empty() || self.filename.contains('/') {
            return Err(HostFilesError::invalid(format!(
                "invalid file name '{}'",
                self.filename
            )));
        }
        if self.relative_dir.split('/').any(|s| s == "..") {
            return Err(HostFilesError::invalid(format!(
                "directory '{}' escapes the base path",
                self.relative_dir
            )));
        }
        Ok(())
    }
}

/// A folder upload: files relative to one remote base path
#[derive(Debug)]
pub struct FolderUploadPlan {
    base_path: String,
    items: Vec<UploadItem>,
}

impl FolderUploadPlan {
    /// Empty plan rooted at `base_path`
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            items: Vec::new(),
        }
    }

    /// Append an item
    pub fn push(&mut self, item: UploadItem) {
        self.items.push(item);
    }

    /// Builder form of [`push`](Self::push)
    pub fn with_item(mut self, item: UploadItem) -> Self {
        self.push(item);
        self
    }

    /// Build a plan from a local directory.
    ///
    /// Files land under `base_path/<dir name>/...`, so the base itself is
    /// never written to directly. Symlinks are not followed.
    pub fn from_local_dir(local_dir: &Path, base_path: impl Into<String>) -> Result<Self> {
        let root_name = local_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                HostFilesError::invalid(format!("'{}' has no directory name", local_dir.display()))
            })?;

        let mut plan = Self::new(base_path);
        for entry in WalkDir::new(local_dir).follow_links(false).sort_by_file_name() {
            let entry = entry
                .map_err(|e| HostFilesError::io(local_dir.display().to_string(), e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(local_dir)
                .map_err(|_| HostFilesError::invalid("walked outside the source directory"))?;
            let parent: Vec<String> = relative
                .parent()
                .map(|p| {
                    p.components()
                        .map(|c| c.as_os_str().to_string_lossy().to_string())
                        .collect()
                })
                .unwrap_or_default();

            let mut relative_dir = root_name.clone();
            for segment in parent {
                relative_dir.push('/');
                relative_dir.push_str(&segment);
            }

            let size = entry
                .metadata()
                .map_err(|e| HostFilesError::io(entry.path().display().to_string(), e.into()))?
                .len();

            plan.push(UploadItem::from_local(
                relative_dir,
                entry.file_name().to_string_lossy().to_string(),
                size,
                entry.path(),
            ));
        }

        tracing::debug!(
            "Planned {} files from {}",
            plan.items.len(),
            local_dir.display()
        );
        Ok(plan)
    }

    /// Remote base path
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Items in plan order
    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the plan has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of declared item sizes
    pub fn total_size(&self) -> u64 {
        self.items.iter().map(|i| i.size).sum()
    }

    /// Name shown in notifications: the first directory of the first item,
    /// or the base path's last segment for flat plans
    pub fn folder_name(&self) -> String {
        self.items
            .first()
            .and_then(|i| i.relative_dir.split('/').next())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                crate::remote::file_name(self.base_path.trim_end_matches('/')).to_string()
            })
    }

    /// Distinct relative directories to create, in plan order, each parent
    /// before its children. The base itself is never included.
    pub fn directories(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();

        for item in &self.items {
            let mut prefix = String::new();
            for segment in item.relative_dir.split('/').filter(|s| !s.is_empty()) {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(segment);
                if seen.insert(prefix.clone()) {
                    ordered.push(prefix.clone());
                }
            }
        }
        ordered
    }

    /// Check the plan without touching the remote side
    pub fn validate(&self, limits: &TransferLimits) -> Result<()> {
        if self.base_path.trim().is_empty() {
            return Err(HostFilesError::invalid("base path must not be empty"));
        }
        if self.items.is_empty() {
            return Err(HostFilesError::invalid("no files to upload"));
        }
        for item in &self.items {
            item.validate()?;
        }

        let total = self.total_size();
        if total > limits.upload_quota {
            return Err(HostFilesError::TooLarge {
                limit: SizeLimit::UploadQuota,
                size: total,
                max: limits.upload_quota,
            });
        }
        Ok(())
    }

    /// Split into base path and items
    pub fn into_parts(self) -> (String, Vec<UploadItem>) {
        (self.base_path, self.items)
    }
}

/// Round-robin split into exactly `chunks` ordered chunks.
///
/// Item `i` lands in chunk `i % chunks`; relative order is kept inside each
/// chunk. Chunks may be empty when there are fewer items than chunks.
pub fn partition<T>(items: Vec<T>, chunks: usize) -> Vec<Vec<T>> {
    let chunks = chunks.max(1);
    let per_chunk = items.len().div_ceil(chunks);
    let mut out: Vec<Vec<T>> = (0..chunks).map(|_| Vec::with_capacity(per_chunk)).collect();

    for (i, item) in items.into_iter().enumerate() {
        out[i % chunks].push(item);
    }
    out
}
