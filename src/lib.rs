//! # HostFiles - Remote File Management over SFTP
//!
//! HostFiles browses and manages files on remote hosts through an already
//! authenticated file-transfer session. It covers directory listing, size
//! totals, gated reads, streamed downloads, batch path operations and
//! parallel folder uploads with per-worker failure isolation.
//!
//! ## Features
//!
//! - **Deterministic Listings**: directories first, then files, by name
//! - **Gated Reads**: inline previews capped at 1 MiB, uncapped streamed downloads
//! - **Batch Operations**: copy, move, rename and remove with stop-at-first-failure
//! - **Folder Uploads**: one `mkdir` per directory, fixed worker fan-out,
//!   failures reported per worker through notifications
//! - **File Targets**: saved hosts resolved by id, one cached session each
//!
//! ## Quick Start
//!
//! ```no_run
//! use hostfiles::config::RemoteConfig;
//! use hostfiles::fs::list_dir;
//! use hostfiles::remote::SftpSession;
//!
//! let config = RemoteConfig::from_spec("admin@10.0.0.5").unwrap();
//! let session = SftpSession::connect(&config).unwrap();
//!
//! for entry in list_dir(&session, "/var/log").unwrap() {
//!     println!("{} {:>10} {}", entry.mode, entry.size, entry.name);
//! }
//! ```
//!
//! ## Folder Uploads
//!
//! ```no_run
//! use hostfiles::config::TransferLimits;
//! use hostfiles::notify::TracingSink;
//! use hostfiles::remote::MemoryFs;
//! use hostfiles::target::FileTarget;
//! use hostfiles::upload::{FolderUploadPlan, UploadItem, Uploader};
//! use std::sync::Arc;
//!
//! let fs = MemoryFs::new();
//! fs.add_dir("/x");
//! let target = FileTarget::new(1, Arc::new(fs), "web-01", "10.0.0.5");
//!
//! let plan = FolderUploadPlan::new("/x")
//!     .with_item(UploadItem::from_bytes("", "a.txt", "hello"))
//!     .with_item(UploadItem::from_bytes("sub", "b.txt", "world"));
//!
//! let uploader = Uploader::new(TransferLimits::default(), Arc::new(TracingSink));
//! let report = uploader.upload_folder(&target, plan, "admin").unwrap();
//! report.print_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fs;
pub mod notify;
pub mod remote;
pub mod service;
pub mod target;
pub mod upload;

// Re-export commonly used types
pub use config::TransferLimits;
pub use error::{HostFilesError, Result};
pub use service::FileService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use hostfiles::prelude::*;
    //! ```

    pub use crate::config::{CreateKind, RemoteConfig, TransferLimits};
    pub use crate::error::{HostFilesError, Result};
    pub use crate::fs::{DirEntry, EntryType, ReadMode, ReadOutcome};
    pub use crate::notify::{Notification, NotificationSink, Severity, TracingSink};
    pub use crate::remote::{MemoryFs, RemoteFs, SftpSession};
    pub use crate::service::FileService;
    pub use crate::target::{FileTarget, RegistryResolver, SessionResolver, StaticResolver, TargetStore};
    pub use crate::upload::{FolderUploadPlan, FolderUploadReport, UploadItem, Uploader};
}
