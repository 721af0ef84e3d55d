//! File and folder uploads
//!
//! - [`UploadItem`] / [`FolderUploadPlan`]: what to upload and where
//! - [`partition`]: round-robin split of a plan into worker chunks
//! - [`Uploader`]: quota checks, directory preparation, parallel dispatch
//!   and notifications
//! - [`UploadProgress`]: counters shared by the workers

mod orchestrator;
mod plan;
mod progress;

pub use orchestrator::{FolderUploadReport, Uploader};
pub use plan::{partition, FolderUploadPlan, UploadItem};
pub use progress::{ProgressSnapshot, UploadProgress};
