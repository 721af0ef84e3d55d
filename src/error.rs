//! Error types for HostFiles
//!
//! This module defines all error types used throughout the crate. Every
//! variant renders a human-readable message; size-limit violations name the
//! limit that was hit so the user can correct the request.

use humansize::{format_size, BINARY};
use thiserror::Error;

/// Which size policy rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLimit {
    /// File is too large to be returned inline for viewing
    InlineRead,
    /// Upload exceeds the per-request total size quota
    UploadQuota,
    /// Upload content runs past the size it was declared with
    DeclaredSize,
}

impl SizeLimit {
    fn describe(&self, size: u64, max: u64) -> String {
        match self {
            Self::InlineRead => format!(
                "file is too large to preview ({} >= {}), download it instead",
                format_size(size, BINARY),
                format_size(max, BINARY)
            ),
            Self::UploadQuota => format!(
                "upload exceeds the total size quota ({} > {})",
                format_size(size, BINARY),
                format_size(max, BINARY)
            ),
            Self::DeclaredSize => format!(
                "upload content is larger than its declared size ({} > {})",
                format_size(size, BINARY),
                format_size(max, BINARY)
            ),
        }
    }
}

/// Main error type for HostFiles operations
#[derive(Error, Debug)]
pub enum HostFilesError {
    /// Remote path or file target does not exist
    #[error("Path not found: {0}")]
    NotFound(String),

    /// Inline-read threshold or upload quota violated
    #[error("{}", limit.describe(*size, *max))]
    TooLarge {
        limit: SizeLimit,
        size: u64,
        max: u64,
    },

    /// Empty base path, empty item set, malformed rename pair, ...
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport-level failure reported by the remote session
    #[error("Remote I/O error at '{path}': {message}")]
    RemoteIo { path: String, message: String },

    /// One or more workers of a folder upload failed
    #[error("Folder upload partially failed: {failed} of {total} worker chunks failed")]
    PartialBatchFailure { failed: usize, total: usize },

    /// Network/SSH connection error
    #[error("Connection error to '{host}': {message}")]
    Connection { host: String, message: String },

    /// SSH authentication failed
    #[error("SSH authentication failed for '{user}@{host}': {message}")]
    Authentication {
        user: String,
        host: String,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local I/O error (config files, registry, local upload sources)
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Registry or config (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HostFilesError {
    /// Create a remote I/O error for a path
    pub fn remote(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a local I/O error with path context
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid argument error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a connection error
    pub fn connection(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(
        user: impl Into<String>,
        host: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Authentication {
            user: user.into(),
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Stable numeric code carried in failure notifications
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) => 400,
            Self::NotFound(_) => 404,
            Self::TooLarge { .. } => 413,
            Self::RemoteIo { .. } => 502,
            Self::PartialBatchFailure { .. } => 207,
            Self::Connection { .. } => 503,
            Self::Authentication { .. } => 401,
            Self::Config(_) => 422,
            Self::Io { .. } | Self::Json(_) => 500,
        }
    }

    /// Check if this error was caused by a size policy
    pub fn is_size_limit(&self) -> bool {
        matches!(self, Self::TooLarge { .. })
    }

    /// Check if this error is a missing path or target
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type alias for HostFiles operations
pub type Result<T> = std::result::Result<T, HostFilesError>;

/// Extension trait for adding remote path context to std::io::Result
pub trait IoResultExt<T> {
    /// Map an I/O error on a remote stream into [`HostFilesError::RemoteIo`]
    fn remote_path(self, path: &str) -> Result<T>;

    /// Map an I/O error on a local file into [`HostFilesError::Io`]
    fn local_path(self, path: impl Into<String>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn remote_path(self, path: &str) -> Result<T> {
        self.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HostFilesError::NotFound(path.to_string()),
            _ => HostFilesError::remote(path, e.to_string()),
        })
    }

    fn local_path(self, path: impl Into<String>) -> Result<T> {
        self.map_err(|e| HostFilesError::io(path, e))
    }
}
