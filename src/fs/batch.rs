//! Batch path operations
//!
//! Rename, copy, move and remove over one or more source paths. Sources are
//! processed in order against the same destination and the batch stops at
//! the first failure. Completed steps are not rolled back.

use super::transfer::{copy_stream, ensure_dir};
use crate::error::{HostFilesError, Result};
use crate::remote::{file_name, is_within, join_path, parent_dir, RemoteFs};

fn require_sources<S: AsRef<str>>(sources: &[S]) -> Result<()> {
    if sources.is_empty() {
        return Err(HostFilesError::invalid("at least one source path is required"));
    }
    if let Some(empty) = sources.iter().find(|s| s.as_ref().trim().is_empty()) {
        return Err(HostFilesError::invalid(format!(
            "source path '{}' is empty",
            empty.as_ref()
        )));
    }
    Ok(())
}

fn destination(to: &str, source: &str) -> Result<String> {
    let name = file_name(source.trim_end_matches('/'));
    if name.is_empty() {
        return Err(HostFilesError::invalid(format!(
            "cannot derive a name from '{}'",
            source
        )));
    }
    Ok(join_path(to, name))
}

/// Rename `old_path` to `new_name` inside the same directory
pub fn rename(fs: &dyn RemoteFs, old_path: &str, new_name: &str) -> Result<String> {
    if old_path.trim().is_empty() {
        return Err(HostFilesError::invalid("old name must not be empty"));
    }
    if new_name.is_empty() || new_name == "." || new_name == ".." {
        return Err(HostFilesError::invalid(format!("invalid new name '{}'", new_name)));
    }
    if new_name.contains('/') {
        return Err(HostFilesError::invalid(format!(
            "new name '{}' must not contain '/'",
            new_name
        )));
    }

    let new_path = match parent_dir(old_path) {
        Some(dir) => join_path(dir, new_name),
        None if old_path.starts_with('/') => join_path("/", new_name),
        None => new_name.to_string(),
    };
    fs.rename(old_path, &new_path)?;
    Ok(new_path)
}

/// Copy each source into `to/<basename>`. Directories are copied
/// recursively; symlinks are skipped.
pub fn copy<S: AsRef<str>>(fs: &dyn RemoteFs, from: &[S], to: &str) -> Result<()> {
    require_sources(from)?;

    for source in from {
        let source = source.as_ref();
        let dest = destination(to, source)?;
        // also covers dest == source, where create would truncate the source
        if is_within(&dest, source) {
            return Err(HostFilesError::invalid(format!(
                "cannot copy '{}' onto or into itself",
                source
            )));
        }
        copy_entry(fs, source, &dest)?;
    }
    Ok(())
}

fn copy_entry(fs: &dyn RemoteFs, source: &str, dest: &str) -> Result<()> {
    let stat = fs.lstat(source)?;

    if stat.is_dir() {
        ensure_dir(fs, dest)?;
        for (name, _) in fs.read_dir(source)? {
            copy_entry(fs, &join_path(source, &name), &join_path(dest, &name))?;
        }
    } else if stat.is_file() {
        let mut reader = fs.open(source)?;
        let mut writer = fs.create(dest)?;
        let bytes = copy_stream(&mut reader, &mut writer, dest)?;
        tracing::debug!("Copied {} -> {} ({} bytes)", source, dest, bytes);
    } else {
        tracing::warn!("Skipping {}: not a regular file or directory", source);
    }
    Ok(())
}

/// Move each source into `to/<basename>`
pub fn move_paths<S: AsRef<str>>(fs: &dyn RemoteFs, from: &[S], to: &str) -> Result<()> {
    require_sources(from)?;

    for source in from {
        let source = source.as_ref();
        let dest = destination(to, source)?;
        fs.rename(source, &dest)?;
    }
    Ok(())
}

/// Remove each path; directories are removed with their contents
pub fn remove<S: AsRef<str>>(fs: &dyn RemoteFs, paths: &[S]) -> Result<()> {
    require_sources(paths)?;

    for path in paths {
        let path = path.as_ref();
        if path.trim_end_matches('/').is_empty() {
            return Err(HostFilesError::invalid("refusing to remove '/'"));
        }
        remove_entry(fs, path)?;
    }
    Ok(())
}

fn remove_entry(fs: &dyn RemoteFs, path: &str) -> Result<()> {
    let stat = fs.lstat(path)?;
    if stat.is_dir() {
        for (name, _) in fs.read_dir(path)? {
            remove_entry(fs, &join_path(path, &name))?;
        }
        fs.remove_dir(path)
    } else {
        fs.remove_file(path)
    }
}
