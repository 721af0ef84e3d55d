//! Single-file and folder upload orchestration
//!
//! A folder upload runs in fixed phases: planning (validation only, no
//! remote I/O), directory preparation (one `mkdir` per distinct directory),
//! dispatch (one worker thread per chunk), join, and a final notification.
//! Each worker stops at its first failure, reports it to the recipient and
//! exits; sibling workers are unaffected.

use super::plan::{partition, FolderUploadPlan, UploadItem};
use super::progress::UploadProgress;
use crate::config::TransferLimits;
use crate::error::{HostFilesError, Result, SizeLimit};
use crate::fs::{ensure_dir, write_declared};
use crate::notify::{Notification, NotificationSink};
use crate::remote::{join_path, RemoteFs};
use crate::target::FileTarget;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SUCCESS_TITLE: &str = "Upload succeeded";
const FAILURE_TITLE: &str = "Upload failed";

/// Outcome of a folder upload, available after all workers finished
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderUploadReport {
    /// Folder name used in notifications
    pub folder_name: String,
    /// Files written successfully
    pub files_uploaded: u64,
    /// Files whose upload failed (at most one per chunk)
    pub files_failed: u64,
    /// Files never attempted because their chunk stopped early
    pub files_skipped: u64,
    /// Bytes written
    pub bytes_uploaded: u64,
    /// Chunks that stopped on a failure or panicked
    pub failed_chunks: usize,
    /// Chunks that ran
    pub chunks: usize,
    /// Wall time from planning to join
    pub duration: Duration,
}

impl FolderUploadReport {
    /// Every planned file was written
    pub fn is_complete(&self) -> bool {
        self.failed_chunks == 0
    }

    /// The partial failure, if any chunk failed
    pub fn failure(&self) -> Option<HostFilesError> {
        if self.is_complete() {
            None
        } else {
            Some(HostFilesError::PartialBatchFailure {
                failed: self.failed_chunks,
                total: self.chunks,
            })
        }
    }

    /// Print a summary of the upload
    pub fn print_summary(&self) {
        use humansize::{format_size, BINARY};

        println!("\n=== Folder Upload Summary ===");
        println!("Folder:            {}", self.folder_name);
        println!("Files uploaded:    {}", self.files_uploaded);
        println!("Files failed:      {}", self.files_failed);
        println!("Files skipped:     {}", self.files_skipped);
        println!("Bytes uploaded:    {}", format_size(self.bytes_uploaded, BINARY));
        println!("Worker chunks:     {} ({} failed)", self.chunks, self.failed_chunks);
        println!("Duration:          {:.2}s", self.duration.as_secs_f64());
    }
}

/// What one worker has written so far; survives a worker panic
#[derive(Debug, Default)]
struct ChunkTally {
    uploaded: AtomicU64,
    bytes: AtomicU64,
}

/// Upload orchestrator.
///
/// Holds no per-upload state, so one uploader may serve overlapping uploads.
pub struct Uploader {
    limits: TransferLimits,
    sink: Arc<dyn NotificationSink>,
}

impl Uploader {
    /// Create an uploader reporting to `sink`
    pub fn new(limits: TransferLimits, sink: Arc<dyn NotificationSink>) -> Self {
        Self { limits, sink }
    }

    /// Limits in effect
    pub fn limits(&self) -> &TransferLimits {
        &self.limits
    }

    /// Upload one file to `dir_path/filename`.
    ///
    /// The quota is checked before any remote call and at most `size` bytes
    /// are accepted from `content`. Upload failures are both notified and
    /// returned.
    pub fn upload_single(
        &self,
        target: &FileTarget,
        dir_path: &str,
        filename: &str,
        size: u64,
        content: &mut dyn Read,
        recipient: &str,
    ) -> Result<u64> {
        if filename.is_empty() || filename.contains('/') {
            return Err(HostFilesError::invalid(format!("invalid file name '{}'", filename)));
        }
        if size > self.limits.upload_quota {
            return Err(HostFilesError::TooLarge {
                limit: SizeLimit::UploadQuota,
                size,
                max: self.limits.upload_quota,
            });
        }

        let path = join_path(dir_path, filename);

        match write_declared(target.fs(), &path, content, size) {
            Ok(bytes) => {
                self.sink.send(
                    recipient,
                    Notification::success(
                        SUCCESS_TITLE,
                        format!("[{}] uploaded to {}", filename, target.describe_path(dir_path)),
                    ),
                );
                Ok(bytes)
            }
            Err(e) => {
                tracing::error!("Upload of {} to {} failed: {}", filename, target.describe(), e);
                self.sink.send(
                    recipient,
                    Notification::from_error(FAILURE_TITLE, "File upload", &e),
                );
                Err(e)
            }
        }
    }

    /// Upload a folder plan.
    ///
    /// Returns once every worker has finished. The success notification is
    /// sent whether or not some chunks failed; partial failure is visible in
    /// the returned report and in the per-chunk error notifications.
    pub fn upload_folder(
        &self,
        target: &FileTarget,
        plan: FolderUploadPlan,
        recipient: &str,
    ) -> Result<FolderUploadReport> {
        self.upload_folder_with_progress(target, plan, recipient, &UploadProgress::new())
    }

    /// Upload a folder plan, reporting live counters to `progress`
    pub fn upload_folder_with_progress(
        &self,
        target: &FileTarget,
        plan: FolderUploadPlan,
        recipient: &str,
        progress: &UploadProgress,
    ) -> Result<FolderUploadReport> {
        let start = Instant::now();

        // Planning
        plan.validate(&self.limits)?;
        let folder_name = plan.folder_name();
        let total_files = plan.len() as u64;
        progress.start(total_files, plan.total_size());

        // DirectoryPrep
        let fs = target.fs();
        for dir in plan.directories() {
            let path = join_path(plan.base_path(), &dir);
            tracing::debug!("Creating directory {}", path);
            ensure_dir(fs, &path)?;
        }

        // Dispatch
        let (base_path, items) = plan.into_parts();
        let chunks: Vec<Vec<UploadItem>> = partition(items, self.limits.upload_concurrency)
            .into_iter()
            .filter(|c| !c.is_empty())
            .collect();
        let chunk_count = chunks.len();

        tracing::info!(
            "Uploading {} files to {} with {} workers",
            total_files,
            target.describe_path(&base_path),
            chunk_count
        );

        // Join
        let mut report = FolderUploadReport {
            folder_name,
            chunks: chunk_count,
            ..Default::default()
        };

        let tallies: Vec<ChunkTally> = (0..chunk_count).map(|_| ChunkTally::default()).collect();

        std::thread::scope(|scope| {
            let handles: Vec<_> = chunks
                .into_iter()
                .zip(&tallies)
                .enumerate()
                .map(|(idx, (chunk, tally))| {
                    let base_path = base_path.as_str();
                    scope.spawn(move || {
                        self.run_chunk(idx, fs, base_path, chunk, recipient, tally, progress)
                    })
                })
                .collect();

            for (idx, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(false) => {}
                    Ok(true) => {
                        report.files_failed += 1;
                        report.failed_chunks += 1;
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        tracing::error!("Upload worker {} panicked: {}", idx, message);
                        self.sink.send(
                            recipient,
                            Notification::error(
                                FAILURE_TITLE,
                                format!("File upload failed:\nworker panicked: {}", message),
                            ),
                        );
                        // the item in flight when the worker panicked
                        progress.add_failed();
                        report.files_failed += 1;
                        report.failed_chunks += 1;
                    }
                }
            }
        });

        for tally in &tallies {
            report.files_uploaded += tally.uploaded.load(Ordering::SeqCst);
            report.bytes_uploaded += tally.bytes.load(Ordering::SeqCst);
        }
        report.files_skipped = total_files - report.files_uploaded - report.files_failed;
        report.duration = start.elapsed();

        if let Some(failure) = report.failure() {
            tracing::warn!("{}", failure);
        }

        // Notify
        self.sink.send(
            recipient,
            Notification::success(
                SUCCESS_TITLE,
                format!(
                    "[{}] folder uploaded to {}",
                    report.folder_name,
                    target.describe_path(&base_path)
                ),
            ),
        );

        Ok(report)
    }

    /// Upload one chunk in order, stopping at the first failure.
    /// Returns whether the chunk failed.
    #[allow(clippy::too_many_arguments)]
    fn run_chunk(
        &self,
        idx: usize,
        fs: &dyn RemoteFs,
        base_path: &str,
        chunk: Vec<UploadItem>,
        recipient: &str,
        tally: &ChunkTally,
        progress: &UploadProgress,
    ) -> bool {
        for item in chunk {
            let path = item.target_path(base_path);
            let size = item.size;
            tracing::debug!("Worker {}: uploading {}", idx, path);

            let result = item
                .into_reader()
                .and_then(|mut reader| write_declared(fs, &path, &mut reader, size));

            match result {
                Ok(bytes) => {
                    progress.add_file(bytes);
                    tally.uploaded.fetch_add(1, Ordering::SeqCst);
                    tally.bytes.fetch_add(bytes, Ordering::SeqCst);
                }
                Err(e) => {
                    progress.add_failed();
                    tracing::error!("Worker {}: upload of {} failed: {}", idx, path, e);
                    self.sink.send(
                        recipient,
                        Notification::from_error(FAILURE_TITLE, "File upload", &e),
                    );
                    return true;
                }
            }
        }

        false
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{CollectingSink, Severity};
    use crate::remote::{FsCall, MemoryFs};

    fn setup(concurrency: usize) -> (MemoryFs, FileTarget, Arc<CollectingSink>, Uploader) {
        let fs = MemoryFs::new();
        fs.add_dir("/x");
        let target = FileTarget::new(1, Arc::new(fs.clone()), "web-01", "10.0.0.5");
        let sink = Arc::new(CollectingSink::new());
        let limits = TransferLimits {
            upload_concurrency: concurrency,
            ..TransferLimits::default()
        };
        let uploader = Uploader::new(limits, sink.clone());
        (fs, target, sink, uploader)
    }

    fn item(dir: &str, name: &str, size: usize) -> UploadItem {
        UploadItem::from_bytes(dir, name, vec![b'z'; size])
    }

    /// Reader that panics on first use
    struct Exploding;

    impl Read for Exploding {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            panic!("reader exploded");
        }
    }

    #[test]
    fn test_upload_single_success() {
        let (fs, target, sink, uploader) = setup(10);
        let mut content: &[u8] = b"hello";

        let bytes = uploader
            .upload_single(&target, "/x", "a.txt", 5, &mut content, "alice")
            .unwrap();
        assert_eq!(bytes, 5);
        assert_eq!(fs.read_file("/x/a.txt").unwrap(), b"hello");

        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].recipient, "alice");
        assert_eq!(
            delivered[0].notification.body,
            "[a.txt] uploaded to web-01[10.0.0.5:/x]"
        );
    }

    #[test]
    fn test_upload_single_over_quota_touches_nothing() {
        let (fs, target, sink, uploader) = setup(10);
        let quota = uploader.limits().upload_quota;
        let mut content: &[u8] = b"";

        let err = uploader
            .upload_single(&target, "/x", "big.iso", quota + 1, &mut content, "alice")
            .unwrap_err();
        assert!(matches!(err, HostFilesError::TooLarge { limit: SizeLimit::UploadQuota, .. }));
        assert!(fs.calls().is_empty());
        assert!(sink.delivered().is_empty());
    }

    #[test]
    fn test_upload_single_failure_is_notified_and_returned() {
        let (_fs, target, sink, uploader) = setup(10);
        let mut content: &[u8] = b"data";

        let err = uploader
            .upload_single(&target, "/missing", "a.txt", 4, &mut content, "alice")
            .unwrap_err();
        assert!(err.is_not_found());

        let errors = sink.with_severity(Severity::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].body.contains(&format!("errCode: {}", err.code())));
    }

    #[test]
    fn test_folder_one_mkdir_per_directory() {
        let (fs, target, _sink, uploader) = setup(10);
        let mut plan = FolderUploadPlan::new("/x");
        for i in 0..12 {
            plan.push(item(&format!("d{}", i % 4), &format!("f{}.txt", i), 3));
        }

        let report = uploader.upload_folder(&target, plan, "alice").unwrap();
        assert!(report.is_complete());
        assert_eq!(report.files_uploaded, 12);

        let mkdirs: Vec<FsCall> = fs
            .calls()
            .into_iter()
            .filter(|c| matches!(c, FsCall::Mkdir(_)))
            .collect();
        assert_eq!(mkdirs.len(), 4);
        for d in 0..4 {
            assert_eq!(fs.mkdir_count(&format!("/x/d{}", d)), 1);
        }
    }

    #[test]
    fn test_folder_over_quota_fails_before_remote_io() {
        let (fs, target, sink, _) = setup(10);
        let limits = TransferLimits {
            upload_quota: 50,
            ..TransferLimits::default()
        };
        let uploader = Uploader::new(limits, sink.clone());
        let plan = FolderUploadPlan::new("/x")
            .with_item(item("sub", "a", 30))
            .with_item(item("sub", "b", 30));

        assert!(uploader.upload_folder(&target, plan, "alice").unwrap_err().is_size_limit());
        assert!(fs.calls().is_empty());
        assert!(sink.delivered().is_empty());
    }

    #[test]
    fn test_folder_mkdir_failure_aborts_dispatch() {
        let (fs, target, sink, uploader) = setup(10);
        fs.fail_path("/x/sub");
        let plan = FolderUploadPlan::new("/x").with_item(item("sub", "a", 1));

        assert!(uploader.upload_folder(&target, plan, "alice").is_err());
        assert!(fs.created_files().is_empty());
        assert!(sink.delivered().is_empty());
    }

    #[test]
    fn test_folder_chunk_failure_isolation() {
        let (fs, target, sink, uploader) = setup(2);
        // chunk 0: f0, f2, f4; chunk 1: f1, f3, f5
        let mut plan = FolderUploadPlan::new("/x");
        for i in 0..6 {
            plan.push(item("", &format!("f{}", i), 4));
        }
        fs.fail_path("/x/f2");

        let report = uploader.upload_folder(&target, plan, "alice").unwrap();

        assert!(fs.exists("/x/f0"));
        assert!(!fs.created_files().contains(&"/x/f4".to_string()));
        for sibling in ["/x/f1", "/x/f3", "/x/f5"] {
            assert_eq!(fs.read_file(sibling).unwrap(), b"zzzz");
        }

        assert_eq!(report.files_uploaded, 4);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.failed_chunks, 1);
        assert!(matches!(
            report.failure(),
            Some(HostFilesError::PartialBatchFailure { failed: 1, total: 2 })
        ));

        let delivered = sink.delivered();
        assert_eq!(sink.with_severity(Severity::Error).len(), 1);
        // the success notification always comes last
        assert_eq!(delivered.last().unwrap().notification.severity, Severity::Success);
    }

    #[test]
    fn test_folder_worker_panic_is_contained() {
        let (fs, target, sink, uploader) = setup(2);
        let plan = FolderUploadPlan::new("/x")
            .with_item(UploadItem::new("", "boom", 1, Exploding))
            .with_item(item("", "fine", 2));

        let report = uploader.upload_folder(&target, plan, "alice").unwrap();
        assert_eq!(report.failed_chunks, 1);
        assert_eq!(report.files_uploaded, 1);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.files_skipped, 0);
        assert_eq!(fs.read_file("/x/fine").unwrap(), b"zz");
        assert_eq!(sink.with_severity(Severity::Error).len(), 1);
        assert_eq!(sink.with_severity(Severity::Success).len(), 1);
    }

    #[test]
    fn test_panicked_chunk_keeps_its_written_files() {
        let (fs, target, _sink, uploader) = setup(1);
        // single chunk: first, boom, last
        let plan = FolderUploadPlan::new("/x")
            .with_item(item("", "first", 3))
            .with_item(UploadItem::new("", "boom", 1, Exploding))
            .with_item(item("", "last", 4));

        let report = uploader.upload_folder(&target, plan, "alice").unwrap();
        assert_eq!(fs.read_file("/x/first").unwrap(), b"zzz");
        assert!(!fs.exists("/x/last"));
        assert_eq!(report.files_uploaded, 1);
        assert_eq!(report.bytes_uploaded, 3);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.failed_chunks, 1);
    }

    #[test]
    fn test_progress_reflects_folder_upload() {
        let (_fs, target, _sink, uploader) = setup(3);
        let plan = FolderUploadPlan::new("/x")
            .with_item(item("a", "1", 10))
            .with_item(item("b", "2", 20));
        let progress = UploadProgress::new();

        uploader
            .upload_folder_with_progress(&target, plan, "alice", &progress)
            .unwrap();
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.files, 2);
        assert_eq!(snapshot.bytes, 30);
        assert_eq!(snapshot.total_files, 2);
    }

    #[test]
    fn test_overlapping_uploads_keep_separate_progress() {
        let (_fs, target, _sink, uploader) = setup(2);
        let first = UploadProgress::new();
        let second = UploadProgress::new();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let plan = FolderUploadPlan::new("/x").with_item(item("a", "1", 10));
                uploader.upload_folder_with_progress(&target, plan, "alice", &first)
            });
            scope.spawn(|| {
                let plan = FolderUploadPlan::new("/x")
                    .with_item(item("b", "2", 5))
                    .with_item(item("b", "3", 5));
                uploader.upload_folder_with_progress(&target, plan, "bob", &second)
            });
        });

        assert_eq!(first.snapshot().files, 1);
        assert_eq!(first.snapshot().total_bytes, 10);
        assert_eq!(second.snapshot().files, 2);
        assert_eq!(second.snapshot().total_files, 2);
    }

    #[test]
    fn test_single_upload_longer_than_declared_is_rejected() {
        let (fs, target, sink, uploader) = setup(10);
        let data = vec![1u8; 5000];
        let mut content: &[u8] = &data;

        let err = uploader
            .upload_single(&target, "/x", "liar.bin", 1, &mut content, "alice")
            .unwrap_err();
        assert!(err.is_size_limit());
        assert!(!fs.exists("/x/liar.bin"));
        assert_eq!(sink.with_severity(Severity::Error).len(), 1);
        assert!(sink.with_severity(Severity::Success).is_empty());
    }

    #[test]
    fn test_folder_item_longer_than_declared_fails_its_chunk() {
        let (fs, target, sink, _) = setup(1);
        let limits = TransferLimits {
            upload_quota: 100,
            upload_concurrency: 1,
            ..TransferLimits::default()
        };
        let uploader = Uploader::new(limits, sink.clone());
        let plan = FolderUploadPlan::new("/x")
            .with_item(UploadItem::new("", "liar.bin", 10, std::io::Cursor::new(vec![0u8; 10_000])))
            .with_item(item("", "after", 2));

        let report = uploader.upload_folder(&target, plan, "alice").unwrap();
        assert!(!fs.exists("/x/liar.bin"));
        assert_eq!(report.bytes_uploaded, 0);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.files_skipped, 1);
        assert!(sink.with_severity(Severity::Error)[0].body.contains("errCode: 413"));
    }
}
