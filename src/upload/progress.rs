//! Upload progress counters shared by worker threads

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Upload progress tracking
#[derive(Debug)]
pub struct UploadProgress {
    /// Bytes written
    bytes: AtomicU64,
    /// Files written
    files: AtomicU64,
    /// Files whose upload failed
    failed: AtomicU64,
    /// Start time
    start: RwLock<Option<Instant>>,
    /// Total bytes planned
    total_bytes: AtomicU64,
    /// Total files planned
    total_files: AtomicU64,
}

impl UploadProgress {
    /// Create new progress tracker
    pub fn new() -> Self {
        Self {
            bytes: AtomicU64::new(0),
            files: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            start: RwLock::new(None),
            total_bytes: AtomicU64::new(0),
            total_files: AtomicU64::new(0),
        }
    }

    /// Reset counters and set the planned totals
    pub fn start(&self, files: u64, bytes: u64) {
        self.bytes.store(0, Ordering::SeqCst);
        self.files.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        self.total_files.store(files, Ordering::SeqCst);
        self.total_bytes.store(bytes, Ordering::SeqCst);
        if let Ok(mut start) = self.start.write() {
            *start = Some(Instant::now());
        }
    }

    /// Record one uploaded file
    pub fn add_file(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
        self.files.fetch_add(1, Ordering::SeqCst);
    }

    /// Record one failed file
    pub fn add_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Get current progress snapshot
    pub fn snapshot(&self) -> ProgressSnapshot {
        let bytes = self.bytes.load(Ordering::SeqCst);
        let total_bytes = self.total_bytes.load(Ordering::SeqCst);

        let elapsed = self
            .start
            .read()
            .ok()
            .and_then(|s| s.map(|s| s.elapsed()))
            .unwrap_or(Duration::ZERO);

        let percent = if total_bytes > 0 {
            (bytes as f64 / total_bytes as f64) * 100.0
        } else {
            0.0
        };

        ProgressSnapshot {
            bytes,
            files: self.files.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            total_bytes,
            total_files: self.total_files.load(Ordering::SeqCst),
            elapsed,
            percent,
        }
    }
}

impl Default for UploadProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Bytes written so far
    pub bytes: u64,
    /// Files written so far
    pub files: u64,
    /// Files that failed
    pub failed: u64,
    /// Planned bytes
    pub total_bytes: u64,
    /// Planned files
    pub total_files: u64,
    /// Time since start
    pub elapsed: Duration,
    /// Percent of planned bytes written
    pub percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracking() {
        let progress = UploadProgress::new();
        progress.start(4, 1000);

        progress.add_file(500);
        progress.add_failed();

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.bytes, 500);
        assert_eq!(snapshot.files, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.total_files, 4);
        assert_eq!(snapshot.percent, 50.0);

        progress.start(1, 10);
        assert_eq!(progress.snapshot().files, 0);
    }
}
