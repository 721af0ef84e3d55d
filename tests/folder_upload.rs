//! End-to-end folder upload scenarios against an in-memory session

use crossbeam::channel::Receiver;
use hostfiles::config::TransferLimits;
use hostfiles::notify::{ChannelSink, Delivery, Severity};
use hostfiles::remote::{FsCall, MemoryFs};
use hostfiles::target::{FileTarget, StaticResolver};
use hostfiles::upload::{FolderUploadPlan, UploadItem};
use hostfiles::FileService;
use std::sync::Arc;

fn service_for(fs: &MemoryFs, limits: TransferLimits) -> (FileService<StaticResolver>, Receiver<Delivery>) {
    let resolver = StaticResolver::new().with_target(FileTarget::new(
        5,
        Arc::new(fs.clone()),
        "web-01",
        "10.0.0.5",
    ));
    let (sink, rx) = ChannelSink::new();
    (FileService::new(resolver, limits, Arc::new(sink)), rx)
}

#[test]
fn test_plan_with_flat_and_nested_items() {
    let fs = MemoryFs::new();
    fs.add_dir("/x");
    let (service, rx) = service_for(&fs, TransferLimits::default());

    let plan = FolderUploadPlan::new("/x")
        .with_item(UploadItem::from_bytes("", "a.txt", vec![b'a'; 10]))
        .with_item(UploadItem::from_bytes("sub", "b.txt", vec![b'b'; 20]))
        .with_item(UploadItem::from_bytes("sub", "c.txt", vec![b'c'; 30]));

    let report = service.upload_folder(5, plan, "alice").unwrap();

    let mkdirs: Vec<FsCall> = fs
        .calls()
        .into_iter()
        .filter(|c| matches!(c, FsCall::Mkdir(_)))
        .collect();
    assert_eq!(mkdirs, vec![FsCall::Mkdir("/x/sub".to_string())]);

    let mut created = fs.created_files();
    created.sort();
    assert_eq!(created, vec!["/x/a.txt", "/x/sub/b.txt", "/x/sub/c.txt"]);
    assert_eq!(fs.read_file("/x/sub/c.txt").unwrap(), vec![b'c'; 30]);

    assert!(report.is_complete());
    assert_eq!(report.bytes_uploaded, 60);

    let deliveries: Vec<_> = rx.try_iter().collect();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].recipient, "alice");
    assert_eq!(deliveries[0].notification.severity, Severity::Success);
}

#[test]
fn test_failure_stops_only_its_own_chunk() {
    let fs = MemoryFs::new();
    fs.add_dir("/x");
    let limits = TransferLimits {
        upload_concurrency: 2,
        ..TransferLimits::default()
    };
    let (service, rx) = service_for(&fs, limits);

    // round-robin: chunk 0 = one, three, five; chunk 1 = two, four, six
    let names = ["one", "two", "three", "four", "five", "six"];
    let mut plan = FolderUploadPlan::new("/x");
    for name in names {
        plan.push(UploadItem::from_bytes("", name, name.as_bytes().to_vec()));
    }
    fs.fail_path("/x/three");

    let report = service.upload_folder(5, plan, "alice").unwrap();

    assert_eq!(fs.read_file("/x/one").unwrap(), b"one");
    assert!(!fs.created_files().contains(&"/x/five".to_string()));
    for sibling in ["two", "four", "six"] {
        assert_eq!(fs.read_file(&format!("/x/{}", sibling)).unwrap(), sibling.as_bytes());
    }
    assert_eq!(report.failed_chunks, 1);
    assert_eq!(report.files_skipped, 1);

    let deliveries: Vec<_> = rx.try_iter().collect();
    let errors: Vec<_> = deliveries
        .iter()
        .filter(|d| d.notification.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].notification.body.contains("errCode: 502"));
    assert!(errors[0].notification.body.contains("/x/three"));

    // success is still reported once, after the join
    assert_eq!(deliveries.last().unwrap().notification.severity, Severity::Success);
}

#[test]
fn test_over_quota_plan_has_no_side_effects() {
    let fs = MemoryFs::new();
    fs.add_dir("/x");
    let limits = TransferLimits {
        upload_quota: 1024,
        ..TransferLimits::default()
    };
    let (service, rx) = service_for(&fs, limits);

    let plan = FolderUploadPlan::new("/x")
        .with_item(UploadItem::from_bytes("a", "1.bin", vec![0u8; 1000]))
        .with_item(UploadItem::from_bytes("b", "2.bin", vec![0u8; 25]));

    let err = service.upload_folder(5, plan, "alice").unwrap_err();
    assert!(err.is_size_limit());
    assert_eq!(err.code(), 413);
    assert!(fs.calls().is_empty());
    assert!(rx.try_recv().is_err());
}
