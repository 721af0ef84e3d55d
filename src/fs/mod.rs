//! Remote file system operations
//!
//! Stateless operations over an open [`RemoteFs`](crate::remote::RemoteFs):
//! directory listing and size totals, the single-file transfer gate, and
//! batch path operations.

pub mod batch;
mod listing;
pub mod transfer;

pub use batch::{copy, move_paths, remove, rename};
pub use listing::*;
pub use transfer::{
    copy_stream, create, create_file, download_filename, ensure_dir, mkdir, open, read, read_path,
    write, write_declared, Download, ReadMode, ReadOutcome, STREAM_BUFFER_SIZE,
};
