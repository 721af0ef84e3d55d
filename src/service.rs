//! Request facade
//!
//! [`FileService`] resolves a file-target id per call and runs the matching
//! operation. Every successful mutating call (and every download) writes one
//! operation-log line of the form `label[address] -> action: detail`.

use crate::config::{CreateKind, TransferLimits};
use crate::error::Result;
use crate::fs::{self, DirEntry, ReadMode, ReadOutcome};
use crate::notify::NotificationSink;
use crate::remote::join_path;
use crate::target::{FileTarget, SessionResolver};
use crate::upload::{FolderUploadPlan, FolderUploadReport, UploadProgress, Uploader};
use std::fmt::Display;
use std::io::Read;
use std::sync::Arc;

fn log_op(target: &FileTarget, action: &str, detail: impl Display) {
    tracing::info!("{} -> {}: {}", target.describe(), action, detail);
}

fn join_paths<S: AsRef<str>>(paths: &[S]) -> String {
    paths
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// File operations keyed by file-target id
pub struct FileService<R> {
    resolver: R,
    limits: TransferLimits,
    uploader: Uploader,
}

impl<R: SessionResolver> FileService<R> {
    /// Create a service
    pub fn new(resolver: R, limits: TransferLimits, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            resolver,
            limits,
            uploader: Uploader::new(limits, sink),
        }
    }

    /// Session resolver
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Limits in effect
    pub fn limits(&self) -> &TransferLimits {
        &self.limits
    }

    /// Resolve a target id
    pub fn target(&self, target_id: u64) -> Result<FileTarget> {
        self.resolver.resolve(target_id)
    }

    /// List a directory
    pub fn list_dir(&self, target_id: u64, path: &str) -> Result<Vec<DirEntry>> {
        let target = self.target(target_id)?;
        fs::list_dir(target.fs(), path)
    }

    /// Total size beneath a path
    pub fn dir_size(&self, target_id: u64, path: &str) -> Result<u64> {
        let target = self.target(target_id)?;
        fs::dir_size(target.fs(), path)
    }

    /// Metadata of one path
    pub fn stat(&self, target_id: u64, path: &str) -> Result<DirEntry> {
        let target = self.target(target_id)?;
        fs::stat(target.fs(), path)
    }

    /// Read a file inline or as a download
    pub fn read(&self, target_id: u64, path: &str, mode: ReadMode) -> Result<ReadOutcome> {
        let target = self.target(target_id)?;
        let outcome = fs::read_path(target.fs(), path, mode, &self.limits)?;
        if mode == ReadMode::Download {
            log_op(&target, "download file", path);
        }
        Ok(outcome)
    }

    /// Create a file or directory
    pub fn create(&self, target_id: u64, path: &str, kind: CreateKind) -> Result<()> {
        let target = self.target(target_id)?;
        fs::create(target.fs(), path, kind)?;
        let action = match kind {
            CreateKind::File => "create file",
            CreateKind::Dir => "create directory",
        };
        log_op(&target, action, path);
        Ok(())
    }

    /// Replace the content of a file
    pub fn write(&self, target_id: u64, path: &str, content: &[u8]) -> Result<()> {
        let target = self.target(target_id)?;
        fs::write(target.fs(), path, content)?;
        log_op(&target, "modify file content", path);
        Ok(())
    }

    /// Upload one file into `dir_path`
    pub fn upload_file(
        &self,
        target_id: u64,
        dir_path: &str,
        filename: &str,
        size: u64,
        content: &mut dyn Read,
        recipient: &str,
    ) -> Result<u64> {
        let target = self.target(target_id)?;
        let bytes = self
            .uploader
            .upload_single(&target, dir_path, filename, size, content, recipient)?;
        log_op(&target, "upload file", join_path(dir_path, filename));
        Ok(bytes)
    }

    /// Upload a folder plan
    pub fn upload_folder(
        &self,
        target_id: u64,
        plan: FolderUploadPlan,
        recipient: &str,
    ) -> Result<FolderUploadReport> {
        self.upload_folder_with_progress(target_id, plan, recipient, &UploadProgress::new())
    }

    /// Upload a folder plan, reporting live counters to `progress`
    pub fn upload_folder_with_progress(
        &self,
        target_id: u64,
        plan: FolderUploadPlan,
        recipient: &str,
        progress: &UploadProgress,
    ) -> Result<FolderUploadReport> {
        let target = self.target(target_id)?;
        let base_path = plan.base_path().to_string();
        let report = self
            .uploader
            .upload_folder_with_progress(&target, plan, recipient, progress)?;
        log_op(
            &target,
            "upload folder",
            join_path(&base_path, &report.folder_name),
        );
        Ok(report)
    }

    /// Remove files and directories
    pub fn remove<S: AsRef<str>>(&self, target_id: u64, paths: &[S]) -> Result<()> {
        let target = self.target(target_id)?;
        fs::remove(target.fs(), paths)?;
        log_op(&target, "remove", join_paths(paths));
        Ok(())
    }

    /// Copy sources into `to`
    pub fn copy<S: AsRef<str>>(&self, target_id: u64, from: &[S], to: &str) -> Result<()> {
        let target = self.target(target_id)?;
        fs::copy(target.fs(), from, to)?;
        log_op(&target, "copy", format!("{} => {}", join_paths(from), to));
        Ok(())
    }

    /// Move sources into `to`
    pub fn move_paths<S: AsRef<str>>(&self, target_id: u64, from: &[S], to: &str) -> Result<()> {
        let target = self.target(target_id)?;
        fs::move_paths(target.fs(), from, to)?;
        log_op(&target, "move", format!("{} => {}", join_paths(from), to));
        Ok(())
    }

    /// Rename within the same directory; returns the new path
    pub fn rename(&self, target_id: u64, old_path: &str, new_name: &str) -> Result<String> {
        let target = self.target(target_id)?;
        let new_path = fs::rename(target.fs(), old_path, new_name)?;
        log_op(&target, "rename", format!("{} => {}", old_path, new_path));
        Ok(new_path)
    }
}
